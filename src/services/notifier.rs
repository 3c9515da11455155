//! Mutation notifications
//!
//! Every mutation ends with a success or error notification. They are
//! returned to the caller and also broadcast to the user's websocket
//! subscribers.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::notification::{MutationOutcome, Notification, NotificationLevel};
use crate::services::error::ServiceError;

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn publish(
        &self,
        user_id: Uuid,
        level: NotificationLevel,
        title: &str,
        description: Option<String>,
    ) -> Notification {
        let notification = Notification {
            user_id,
            level,
            title: title.to_string(),
            description,
            timestamp: Utc::now(),
        };

        // Ignore errors if no subscribers
        let _ = self.tx.send(notification.clone());
        notification
    }

    /// Turn a mutation result into its notification: `success` title on Ok,
    /// `failure` title plus the error message on Err.
    pub fn settle<T>(
        &self,
        user_id: Uuid,
        result: Result<T, ServiceError>,
        success: &str,
        failure: &str,
    ) -> Result<MutationOutcome<T>, ServiceError> {
        match result {
            Ok(data) => {
                info!(user_id = %user_id, "{}", success);
                let notification = self.publish(user_id, NotificationLevel::Success, success, None);
                Ok(MutationOutcome { data, notification })
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "{}", failure);
                self.publish(
                    user_id,
                    NotificationLevel::Error,
                    failure,
                    Some(e.to_string()),
                );
                Err(e)
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_success_broadcasts() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let user = Uuid::new_v4();

        let outcome = notifier
            .settle(user, Ok(42), "Donateur créé avec succès", "Erreur")
            .unwrap();

        assert_eq!(outcome.data, 42);
        assert_eq!(outcome.notification.level, NotificationLevel::Success);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.title, "Donateur créé avec succès");
        assert_eq!(received.user_id, user);
    }

    #[tokio::test]
    async fn test_settle_error_carries_message() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        let result: Result<MutationOutcome<()>, _> = notifier.settle(
            Uuid::new_v4(),
            Err(ServiceError::InvalidState("Article indisponible".to_string())),
            "ok",
            "Erreur lors de la création du prêt",
        );
        assert!(result.is_err());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.level, NotificationLevel::Error);
        assert_eq!(received.description.as_deref(), Some("Article indisponible"));
    }
}
