//! Mailer port, mailer adapters, and the queue handler that feeds them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::NotificationMessage;
use messaging::{HandlerError, MessageHandler};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while sending an email.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailerError {
    /// The transport refused or timed out. Worth retrying.
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// The template could not be rendered. Retrying will not help.
    #[error("Template render error: {0}")]
    Render(String),
}

/// Renders a template with its context and sends the result.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &BTreeMap<String, Value>,
    ) -> Result<(), MailerError>;
}

/// One email accepted by [`InMemoryMailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<SentEmail>,
    attempts: usize,
    failures_remaining: u32,
    fail_always: bool,
}

/// Mailer that records emails instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<Mutex<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryMailerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    /// Makes every send fail until switched off.
    pub fn set_fail_always(&self, fail: bool) {
        self.lock().fail_always = fail;
    }

    /// Emails accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Send calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &BTreeMap<String, Value>,
    ) -> Result<(), MailerError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.fail_always {
            return Err(MailerError::Transport("mailer unavailable".to_string()));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(MailerError::Transport("connection reset".to_string()));
        }

        state.sent.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            template: template.to_string(),
            context: context.clone(),
        });
        Ok(())
    }
}

/// Mailer that only logs what it would send.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &BTreeMap<String, Value>,
    ) -> Result<(), MailerError> {
        let context = serde_json::to_string(context)
            .map_err(|e| MailerError::Render(e.to_string()))?;
        tracing::info!(to, subject, template, %context, "email sent");
        Ok(())
    }
}

/// Queue handler that forwards [`NotificationMessage`]s to a [`Mailer`].
///
/// Transport failures come back as retryable so the worker's retry policy
/// applies; render failures go straight to the dead-letter store. A
/// duplicate delivery simply sends the email again.
#[derive(Clone)]
pub struct NotificationDispatchHandler {
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatchHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

impl std::fmt::Debug for NotificationDispatchHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatchHandler")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageHandler<NotificationMessage> for NotificationDispatchHandler {
    #[tracing::instrument(
        skip_all,
        fields(to = %message.to(), template = message.template())
    )]
    async fn handle(&self, message: NotificationMessage) -> Result<(), HandlerError> {
        self.mailer
            .send_email(
                message.to().as_str(),
                message.subject(),
                message.template(),
                message.context(),
            )
            .await
            .map_err(|err| match err {
                MailerError::Transport(_) => HandlerError::Retryable(err.to_string()),
                MailerError::Render(_) => HandlerError::Permanent(err.to_string()),
            })
    }
}
