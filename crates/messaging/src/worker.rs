//! Queue consumers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{Clock, SystemClock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{HandlerError, HandlerRegistry, MessageId, Result, RetryPolicy, queue::MessageQueue};

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long an idle worker waits before polling again.
    pub poll_interval: Duration,
    /// Retry budget and backoff for retryable handler failures.
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// What happened to the message a worker picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing was available.
    Idle,
    /// The handler succeeded and the message was acknowledged.
    Acked(MessageId),
    /// The handler failed transiently; another attempt is scheduled.
    Retried {
        id: MessageId,
        attempt: u32,
        delay: Duration,
    },
    /// The message was moved to the dead-letter store.
    DeadLettered { id: MessageId, attempt: u32 },
}

/// Pulls messages off a queue and routes them to their handlers.
///
/// Several workers may share one queue; each lease is exclusive, so the
/// only per-message state a handler sees is the message itself.
pub struct Worker {
    name: String,
    queue: Arc<dyn MessageQueue>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    clock: Arc<dyn Clock>,
}

impl Worker {
    /// Creates a worker on the system clock.
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn MessageQueue>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            registry,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses the given clock to schedule retries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the worker's name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leases and settles at most one message.
    ///
    /// Handler failures are not errors of this method: they are turned into
    /// a retry or a dead letter and reported through [`ProcessOutcome`].
    /// Only queue failures are returned as `Err`.
    #[tracing::instrument(skip(self), fields(worker = %self.name))]
    pub async fn process_next(&self) -> Result<ProcessOutcome> {
        let Some(envelope) = self.queue.receive().await? else {
            return Ok(ProcessOutcome::Idle);
        };

        let id = envelope.id;
        let attempt = envelope.attempts;
        let message_type = envelope.message_type.clone();

        let started = Instant::now();
        let result = self.registry.handle(&envelope).await;
        metrics::histogram!("message_handling_duration_seconds", "message_type" => message_type.clone())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.queue.ack(id, attempt).await?;
                metrics::counter!("messages_processed_total", "message_type" => message_type.clone())
                    .increment(1);
                tracing::debug!(message_id = %id, %message_type, attempt, "message handled");
                Ok(ProcessOutcome::Acked(id))
            }
            Err(err) => self.settle_failure(id, &message_type, attempt, err).await,
        }
    }

    async fn settle_failure(
        &self,
        id: MessageId,
        message_type: &str,
        attempt: u32,
        err: HandlerError,
    ) -> Result<ProcessOutcome> {
        let delay = if err.is_retryable() {
            self.config.retry_policy.next_delay(attempt)
        } else {
            None
        };

        match delay {
            Some(delay) => {
                let backoff = chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                self.queue
                    .retry(id, attempt, &err.to_string(), self.clock.now() + backoff)
                    .await?;
                metrics::counter!("messages_retried_total", "message_type" => message_type.to_string())
                    .increment(1);
                tracing::warn!(
                    message_id = %id,
                    message_type,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "message handling failed, retry scheduled"
                );
                Ok(ProcessOutcome::Retried { id, attempt, delay })
            }
            None => {
                self.queue.dead_letter(id, attempt, &err.to_string()).await?;
                metrics::counter!("messages_dead_lettered_total", "message_type" => message_type.to_string())
                    .increment(1);
                tracing::error!(
                    message_id = %id,
                    message_type,
                    attempt,
                    error = %err,
                    "message moved to dead-letter store"
                );
                Ok(ProcessOutcome::DeadLettered { id, attempt })
            }
        }
    }

    /// Processes messages until `shutdown` flips to true (or its sender is
    /// dropped). A message being handled when the signal arrives is
    /// finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = %self.name, "worker started");

        while !*shutdown.borrow() {
            let idle = match self.process_next().await {
                Ok(ProcessOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    tracing::error!(worker = %self.name, error = %e, "queue error");
                    true
                }
            };

            if idle {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = self.queue.wait_for_message(self.config.poll_interval) => {}
                }
            }
        }

        tracing::info!(worker = %self.name, "worker stopped");
    }
}

/// A set of workers running on tokio tasks.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing one queue and registry.
    pub fn spawn(
        size: usize,
        queue: Arc<dyn MessageQueue>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown, receiver) = watch::channel(false);

        let handles = (0..size.max(1))
            .map(|index| {
                let worker = Worker::new(
                    format!("worker-{index}"),
                    Arc::clone(&queue),
                    Arc::clone(&registry),
                    config.clone(),
                )
                .with_clock(Arc::clone(&clock));
                let receiver = receiver.clone();
                tokio::spawn(async move { worker.run(receiver).await })
            })
            .collect();

        Self { shutdown, handles }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signals every worker to stop and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in futures_util::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}
