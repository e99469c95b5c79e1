//! User account use cases.

use std::sync::Arc;

use chrono::Duration;
use common::{Clock, UserId};
use domain::user::validate_password;
use domain::{
    Email, EventDispatcher, HashedPassword, IdGenerator, PasswordHasher, RecordsEvents, User,
    UserError, UserEvent, UserRepository, UserRepositoryExt, Username,
};

use crate::error::{ApplicationError, Result};
use crate::rate_limit::{InMemoryLimiterStore, RateLimitGuard, RateLimitPolicy, RateLimiterFactory};

/// Default failed logins before an account is locked.
pub const DEFAULT_MAX_FAILED_LOGINS: u32 = 5;

/// Load-modify-save rounds a use case gets before giving up on a
/// contended account.
const MAX_SAVE_ATTEMPTS: u32 = 8;

/// Command to create an account.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Command to set a new password with a reset token.
#[derive(Debug, Clone)]
pub struct ResetPassword {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// Default policy for activation emails: 3 per hour per address.
pub fn default_activation_policy() -> RateLimitPolicy {
    RateLimitPolicy::fixed_window("activation_email", 3, Duration::hours(1))
}

/// Default policy for reset requests: 3 per hour per address.
pub fn default_reset_policy() -> RateLimitPolicy {
    RateLimitPolicy::fixed_window("password_reset", 3, Duration::hours(1))
}

/// Application service for user accounts.
///
/// Each mutating use case saves the aggregate, dispatches the events it
/// recorded, then clears them. Rate limits are checked before any state
/// changes or messages are produced. Use cases that modify a stored user
/// reload and reapply themselves when the save hits a version conflict.
pub struct UserService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventDispatcher<UserEvent>>,
    clock: Arc<dyn Clock>,
    guard: RateLimitGuard,
    limiter_store: InMemoryLimiterStore,
    activation_limiter: RateLimiterFactory,
    reset_limiter: RateLimiterFactory,
    max_failed_logins: u32,
}

impl UserService {
    /// Creates a service with default rate-limit policies.
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        ids: Arc<dyn IdGenerator>,
        events: Arc<dyn EventDispatcher<UserEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter_store = InMemoryLimiterStore::new();
        Self {
            guard: RateLimitGuard::new(Arc::clone(&clock)),
            activation_limiter: RateLimiterFactory::new(
                default_activation_policy(),
                limiter_store.clone(),
                Arc::clone(&clock),
            ),
            reset_limiter: RateLimiterFactory::new(
                default_reset_policy(),
                limiter_store.clone(),
                Arc::clone(&clock),
            ),
            limiter_store,
            users,
            hasher,
            ids,
            events,
            clock,
            max_failed_logins: DEFAULT_MAX_FAILED_LOGINS,
        }
    }

    pub fn with_activation_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.activation_limiter =
            RateLimiterFactory::new(policy, self.limiter_store.clone(), Arc::clone(&self.clock));
        self
    }

    pub fn with_reset_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.reset_limiter =
            RateLimiterFactory::new(policy, self.limiter_store.clone(), Arc::clone(&self.clock));
        self
    }

    pub fn with_max_failed_logins(mut self, max: u32) -> Self {
        self.max_failed_logins = max.max(1);
        self
    }

    /// Looks up a user by id.
    pub async fn get_user(&self, id: UserId) -> Result<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::UserNotFound(id.to_string()))
    }

    /// Creates an account pending activation and queues the activation email.
    #[tracing::instrument(skip_all, fields(email = %cmd.email, username = %cmd.username))]
    pub async fn register(&self, cmd: RegisterUser) -> Result<User> {
        let email = Email::parse(&cmd.email)?;
        let username = Username::parse(&cmd.username)?;
        validate_password(&cmd.password)?;

        if self.users.email_exists(&email).await? {
            return Err(UserError::EmailAlreadyUsed.into());
        }
        if self.users.username_exists(&username).await? {
            return Err(UserError::UsernameAlreadyUsed.into());
        }

        let password = self.hasher.hash(&cmd.password)?;
        let mut user = User::register(
            UserId::new(),
            email,
            username,
            password,
            self.ids.generate(),
            self.clock.now(),
        );
        self.save_and_dispatch(&mut user).await?;

        tracing::info!(user_id = %user.id(), "user registered");
        Ok(user)
    }

    /// Sends a fresh activation email. Limited per address.
    #[tracing::instrument(skip(self))]
    pub async fn request_activation_email(&self, email: &str) -> Result<()> {
        let email = Email::parse(email)?;
        self.guard
            .consume_or_throw(
                &self.activation_limiter.create(email.as_str()),
                UserError::ActivationLimitReached.to_string(),
            )
            .map_err(|e| ApplicationError::rate_limited(UserError::ActivationLimitReached, e))?;

        let email = &email;
        self.retry_on_conflict(move || self.try_request_activation_email(email))
            .await
    }

    async fn try_request_activation_email(&self, email: &Email) -> Result<()> {
        let mut user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApplicationError::UserNotFound(email.to_string()))?;

        if user.request_activation_email(self.ids.generate(), self.clock.now())? {
            self.save_and_dispatch(&mut user).await?;
        } else {
            tracing::debug!(user_id = %user.id(), "already active, nothing to send");
        }
        Ok(())
    }

    /// Activates an account with its activation token.
    #[tracing::instrument(skip(self, token))]
    pub async fn activate(&self, user_id: UserId, token: &str) -> Result<User> {
        self.retry_on_conflict(move || self.try_activate(user_id, token))
            .await
    }

    async fn try_activate(&self, user_id: UserId, token: &str) -> Result<User> {
        let mut user = self.get_user(user_id).await?;
        user.activate(token, self.clock.now())?;
        self.save_and_dispatch(&mut user).await?;
        Ok(user)
    }

    /// Queues a password reset email. Limited per address.
    ///
    /// Unknown addresses succeed silently, after consuming the limit, so
    /// callers cannot probe which addresses have accounts.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = Email::parse(email)?;
        self.guard
            .consume_or_throw(
                &self.reset_limiter.create(email.as_str()),
                UserError::ResetPasswordLimitReached.to_string(),
            )
            .map_err(|e| ApplicationError::rate_limited(UserError::ResetPasswordLimitReached, e))?;

        let email = &email;
        self.retry_on_conflict(move || self.try_request_password_reset(email))
            .await
    }

    async fn try_request_password_reset(&self, email: &Email) -> Result<()> {
        let Some(mut user) = self.users.find_by_email(email).await? else {
            tracing::info!("password reset requested for unknown address");
            return Ok(());
        };

        user.request_password_reset(self.ids.generate(), self.clock.now())?;
        self.save_and_dispatch(&mut user).await
    }

    /// Sets a new password using a reset token.
    #[tracing::instrument(skip_all, fields(email = %cmd.email))]
    pub async fn reset_password(&self, cmd: ResetPassword) -> Result<()> {
        validate_password(&cmd.new_password)?;
        let email = Email::parse(&cmd.email)?;

        let password = self.hasher.hash(&cmd.new_password)?;

        let (email, token, password) = (&email, cmd.token.as_str(), &password);
        self.retry_on_conflict(move || self.try_reset_password(email, token, password))
            .await
    }

    async fn try_reset_password(
        &self,
        email: &Email,
        token: &str,
        password: &HashedPassword,
    ) -> Result<()> {
        let mut user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ApplicationError::InvalidToken)?;

        user.reset_password(token, password.clone(), self.clock.now())?;
        self.save_and_dispatch(&mut user).await
    }

    /// Checks credentials.
    ///
    /// Failed attempts are counted; reaching the limit locks the account and
    /// queues a notification.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = Email::parse(email).map_err(|_| ApplicationError::InvalidCredentials)?;
        let email = &email;
        self.retry_on_conflict(move || self.try_authenticate(email, password))
            .await
    }

    async fn try_authenticate(&self, email: &Email, password: &str) -> Result<User> {
        let mut user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ApplicationError::InvalidCredentials)?;

        user.ensure_not_locked()?;

        if !self.hasher.verify(password, user.password()) {
            let locked = user.record_failed_login(self.max_failed_logins, self.clock.now());
            self.save_and_dispatch(&mut user).await?;
            if locked {
                tracing::warn!(user_id = %user.id(), "account locked after failed logins");
                return Err(UserError::UserLocked.into());
            }
            return Err(ApplicationError::InvalidCredentials);
        }

        if !user.is_active() {
            return Err(ApplicationError::NotActivated);
        }

        if user.failed_login_attempts() > 0 {
            user.record_successful_login();
            self.save_and_dispatch(&mut user).await?;
        }
        Ok(user)
    }

    /// Runs `attempt` again while its save loses a version race.
    async fn retry_on_conflict<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut round = 1;
        loop {
            match attempt().await {
                Err(ApplicationError::Conflict) if round < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!(round, "user changed concurrently, reloading");
                    round += 1;
                }
                Err(ApplicationError::Conflict) => {
                    metrics::counter!("user_save_conflicts_exhausted_total").increment(1);
                    tracing::warn!(rounds = round, "giving up on contended user");
                    return Err(ApplicationError::Conflict);
                }
                other => return other,
            }
        }
    }

    async fn save_and_dispatch(&self, user: &mut User) -> Result<()> {
        self.users.save(user).await?;

        let report = self.events.dispatch_all(user.domain_events()).await;
        if !report.is_success() {
            tracing::warn!(
                user_id = %user.id(),
                failures = report.failures.len(),
                "some event subscribers failed"
            );
        }
        user.clear_domain_events();
        Ok(())
    }
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("max_failed_logins", &self.max_failed_logins)
            .finish_non_exhaustive()
    }
}
