use std::sync::Arc;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use shared::types::FireEvent;
use crate::alarm::notify::Notifier;
use crate::alarm::registry::{AlarmRegistry, FireOutcome};
use crate::alarm::timer::Fire;

/// Turns timer fires, which only carry an id, into reminders the user can read.
pub struct TriggerDispatcher {
    registry: Arc<AlarmRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl TriggerDispatcher {
    pub fn new(registry: Arc<AlarmRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Deliver one fire. Returns `None` when the fire belongs to a schedule
    /// that was edited or deleted after the timer was armed.
    pub async fn dispatch(&self, fire: Fire) -> Option<FireEvent> {
        let medication_id = fire.tag.medication_id;

        let completed = match self.registry.record_fire(&fire).await {
            FireOutcome::Deliver { completed } => completed,
            FireOutcome::Stale => {
                tracing::debug!(
                    "Dropping stale fire for medication {} (generation {})",
                    medication_id,
                    fire.tag.generation
                );
                return None;
            }
        };

        let event = FireEvent {
            medication_id,
            name: fire.tag.payload.name,
            dosage: fire.tag.payload.dosage,
            scheduled_at: fire.scheduled_at,
        };
        self.notifier.deliver(&event);

        tracing::debug!(
            "Delivered reminder for medication {} via {}",
            medication_id,
            self.notifier.channel_name()
        );
        if completed {
            tracing::info!("One-time reminder for medication {} completed", medication_id);
        }

        Some(event)
    }
}

/// Dispatcher event loop - bridges timer fires to the notification surface
pub async fn run(
    dispatcher: Arc<TriggerDispatcher>,
    mut rx: mpsc::Receiver<Fire>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            Some(fire) = rx.recv() => {
                dispatcher.dispatch(fire).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("Dispatcher shutting down");
                break;
            }
        }
    }

    Ok(())
}
