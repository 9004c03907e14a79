use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::types::{FireEvent, MedicationId};

/// Notification surface. Delivering twice for the same medication replaces
/// the earlier alert instead of stacking a second one.
pub trait Notifier: Send + Sync {
    fn deliver(&self, event: &FireEvent);

    /// Human-readable name for this channel
    fn channel_name(&self) -> &str;
}

/// A rendered, user-visible reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub medication_id: MedicationId,
    pub title: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub delivered_at: DateTime<Utc>,
}

impl Notification {
    pub fn render(event: &FireEvent, delivered_at: DateTime<Utc>) -> Self {
        Self {
            medication_id: event.medication_id,
            title: format!("{} Reminder", event.name),
            body: format!(
                "Time to take your medication: {}, Dosage: {}",
                event.name, event.dosage
            ),
            scheduled_at: event.scheduled_at,
            delivered_at,
        }
    }
}

/// Active reminders keyed by medication id, served to the UI until dismissed.
#[derive(Default)]
pub struct NotificationBoard {
    active: Mutex<BTreeMap<MedicationId, Notification>>,
}

impl NotificationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Vec<Notification> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, medication_id: MedicationId) -> Option<Notification> {
        self.lock().get(&medication_id).cloned()
    }

    /// Returns false if there was nothing to dismiss
    pub fn dismiss(&self, medication_id: MedicationId) -> bool {
        self.lock().remove(&medication_id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<MedicationId, Notification>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for NotificationBoard {
    fn deliver(&self, event: &FireEvent) {
        let notification = Notification::render(event, Utc::now());
        tracing::info!("{}: {}", notification.title, notification.body);

        if self.lock().insert(event.medication_id, notification).is_some() {
            tracing::debug!("Replaced pending reminder for medication {}", event.medication_id);
        }
    }

    fn channel_name(&self) -> &str {
        "board"
    }
}
