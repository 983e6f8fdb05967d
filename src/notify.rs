//! Priority-based notification fan-out.
//!
//! Priority 1 ("high") reaches only the first configured phone;
//! priority 2 and above ("emergency") reaches every phone;
//! zero or negative priorities are dropped.

use crate::surface::SmsOutbox;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationEvent {
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub priority: i32,
}

pub struct NotificationRouter {
    phones: Vec<String>,
    outbox: Arc<dyn SmsOutbox>,
}

impl NotificationRouter {
    pub fn new(phones: Vec<String>, outbox: Arc<dyn SmsOutbox>) -> Self {
        Self { phones, outbox }
    }

    /// Dispatch the event; returns how many phones were notified.
    pub async fn route(&self, event: &NotificationEvent) -> usize {
        if event.priority <= 0 {
            debug!("notification '{}' below dispatch priority", event.name);
            return 0;
        }
        let mut dispatched = 0;
        for phone in &self.phones {
            info!("notification '{}' sent to {phone}", event.name);
            self.outbox
                .send(
                    phone,
                    &format!("Domoticz.{}", event.name),
                    &format!("{} {}", event.subject, event.body),
                )
                .await;
            dispatched += 1;
            if event.priority <= 1 {
                break;
            }
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::RecordingOutbox;

    fn router(outbox: Arc<RecordingOutbox>) -> NotificationRouter {
        NotificationRouter::new(
            vec![
                "+33601020304".into(),
                "+44601020304".into(),
                "+33701020304".into(),
            ],
            outbox,
        )
    }

    fn event(priority: i32) -> NotificationEvent {
        NotificationEvent {
            name: "OnBoard_GSM".into(),
            subject: "Front door open".into(),
            body: String::new(),
            priority,
        }
    }

    #[tokio::test]
    async fn high_priority_reaches_first_phone_only() {
        let outbox = Arc::new(RecordingOutbox::default());
        assert_eq!(router(outbox.clone()).route(&event(1)).await, 1);
        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+33601020304");
        assert_eq!(sent[0].1, "Domoticz.OnBoard_GSM");
    }

    #[tokio::test]
    async fn emergency_reaches_everyone() {
        let outbox = Arc::new(RecordingOutbox::default());
        assert_eq!(router(outbox.clone()).route(&event(2)).await, 3);
        assert_eq!(outbox.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn non_positive_priority_is_dropped() {
        let outbox = Arc::new(RecordingOutbox::default());
        assert_eq!(router(outbox.clone()).route(&event(0)).await, 0);
        assert_eq!(router(outbox.clone()).route(&event(-4)).await, 0);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }
}
