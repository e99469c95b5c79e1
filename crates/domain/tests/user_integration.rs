//! Integration tests for the User aggregate.
//!
//! These tests drive full account lifecycles and check the events each step
//! leaves behind for the application layer to dispatch.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::UserId;
use domain::{
    DispatchError, DomainError, DomainEvent, Email, EventDispatcher, HashedPassword,
    NotificationMessage, RecordsEvents, User, UserError, UserEvent, UserStatus, Username,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn register() -> User {
    User::register(
        UserId::new(),
        Email::parse("Bob@Example.org").unwrap(),
        Username::parse("bob").unwrap(),
        HashedPassword::new("hash-1"),
        "activation-1",
        t0(),
    )
}

fn names(user: &User) -> Vec<&'static str> {
    user.domain_events().iter().map(|e| e.event_name()).collect()
}

/// Collects dispatched event names.
#[derive(Default)]
struct Collecting {
    seen: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl EventDispatcher<UserEvent> for Collecting {
    async fn dispatch(&self, event: &UserEvent) -> Result<(), DispatchError> {
        self.seen.lock().unwrap().push(event.event_name());
        Ok(())
    }
}

mod user_lifecycle {
    use super::*;

    #[tokio::test]
    async fn register_activate_reset() {
        let dispatcher = Collecting::default();
        let mut user = register();
        assert_eq!(user.email().as_str(), "bob@example.org");
        assert_eq!(user.status(), UserStatus::PendingActivation);

        // Unit of work 1: registration
        let report = dispatcher.dispatch_all(user.domain_events()).await;
        assert!(report.is_success());
        user.clear_domain_events();

        // Unit of work 2: resend then activate with the newest token
        assert!(user.request_activation_email("activation-2", t0()).unwrap());
        let err = user.activate("activation-1", t0()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidToken));
        user.activate("activation-2", t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(
            names(&user),
            vec!["user.activation_email_requested", "user.activated"]
        );
        dispatcher.dispatch_all(user.domain_events()).await;
        user.clear_domain_events();

        // Unit of work 3: password reset
        user.request_password_reset("reset-1", t0()).unwrap();
        user.reset_password("reset-1", HashedPassword::new("hash-2"), t0())
            .unwrap();
        assert_eq!(user.password().as_str(), "hash-2");
        dispatcher.dispatch_all(user.domain_events()).await;
        user.clear_domain_events();

        assert!(user.domain_events().is_empty());
        assert_eq!(
            *dispatcher.seen.lock().unwrap(),
            vec![
                "user.registered",
                "user.activation_email_requested",
                "user.activated",
                "user.password_reset_requested",
                "user.password_changed",
            ]
        );
    }

    #[test]
    fn lock_after_repeated_failures_blocks_everything() {
        let mut user = register();
        user.activate("activation-1", t0()).unwrap();
        user.clear_domain_events();

        let locked: Vec<bool> = (0..3)
            .map(|_| user.record_failed_login(3, t0()))
            .collect();
        assert_eq!(locked, vec![false, false, true]);
        assert!(user.is_locked());
        assert_eq!(names(&user), vec!["user.locked"]);

        // Further failures do not record a second lock.
        assert!(!user.record_failed_login(3, t0()));
        assert_eq!(user.domain_events().len(), 1);

        assert_eq!(user.ensure_not_locked(), Err(UserError::UserLocked));
        assert_eq!(
            user.request_password_reset("reset", t0()),
            Err(UserError::UserLocked)
        );
    }

    #[test]
    fn events_serialize_with_stable_tags() {
        let user = register();
        let json = serde_json::to_value(&user.domain_events()[0]).unwrap();
        assert_eq!(json["type"], "UserRegistered");
        assert_eq!(json["data"]["email"], "bob@example.org");

        let back: UserEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.user_id(), user.id());
        assert_eq!(back.occurred_on(), t0());
    }
}

mod notifications {
    use super::*;

    #[test]
    fn notification_rejects_bad_recipient_on_deserialize() {
        let json = serde_json::json!({
            "to": "not-an-email",
            "subject": "Hi",
            "template": "welcome",
            "context": {}
        });
        assert!(serde_json::from_value::<NotificationMessage>(json).is_err());
    }

    #[test]
    fn notification_is_structurally_equal() {
        let a = NotificationMessage::new("a@b.com", "Hi", "welcome", [("name", "Ana")]).unwrap();
        let b = NotificationMessage::new("A@B.com", "Hi", "welcome", [("name", "Ana")]).unwrap();
        assert_eq!(a, b);
    }
}
