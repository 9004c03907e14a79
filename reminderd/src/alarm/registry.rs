use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use shared::types::{Medication, MedicationId};
use crate::alarm::timer::{AlarmPayload, AlarmTag, Fire, TimerError, TimerFacility};
use crate::schedule::{calculator, RecurrenceInterval};

/// The armed schedule for one medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub medication_id: MedicationId,
    pub next_fire: DateTime<Utc>,
    pub interval: RecurrenceInterval,
    pub payload: AlarmPayload,
    /// Bumped on every registration; fires carrying an older generation are stale
    pub generation: u64,
    pub fire_count: u64,
    pub armed_at: DateTime<Utc>,
}

impl ScheduleEntry {
    pub fn is_periodic(&self) -> bool {
        self.interval.is_recurring()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Deliver the reminder. `completed` is set when a one-shot fired and the
    /// medication is no longer scheduled.
    Deliver { completed: bool },
    /// The entry was cancelled or replaced after the timer was armed
    Stale,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<MedicationId, ScheduleEntry>,
    next_generation: u64,
}

/// Maps medication ids to their armed schedule. Every register and cancel
/// runs under one lock, timer facility calls included, so an edit's
/// cancel-then-register can never interleave with another change to the same id.
pub struct AlarmRegistry {
    timer: Arc<dyn TimerFacility>,
    state: Mutex<RegistryState>,
}

impl AlarmRegistry {
    pub fn new(timer: Arc<dyn TimerFacility>) -> Self {
        Self {
            timer,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Arm `medication` at `first`, replacing any entry it already has.
    /// The previous registration is cancelled before the new one is requested;
    /// if the request fails the id is left unscheduled.
    pub async fn register(
        &self,
        medication: &Medication,
        interval: RecurrenceInterval,
        first: DateTime<Utc>,
    ) -> Result<ScheduleEntry, TimerError> {
        let medication_id = medication.medication_id;
        let mut state = self.state.lock().await;

        if let Some(previous) = state.entries.remove(&medication_id) {
            self.timer.cancel(medication_id);
            tracing::debug!(
                "Cancelled generation {} of medication {} before re-registering",
                previous.generation,
                medication_id
            );
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let payload = AlarmPayload {
            name: medication.name.clone(),
            dosage: medication.dosage.clone(),
        };
        let tag = AlarmTag {
            medication_id,
            generation,
            payload: payload.clone(),
        };

        let result = match interval.period() {
            None => self.timer.register_one_shot(tag, first),
            Some(period) => self.timer.register_periodic(tag, first, period),
        };
        if let Err(e) = result {
            tracing::warn!("Timer rejected alarm for medication {}: {}", medication_id, e);
            return Err(e);
        }

        let entry = ScheduleEntry {
            medication_id,
            next_fire: first,
            interval,
            payload,
            generation,
            fire_count: 0,
            armed_at: Utc::now(),
        };
        state.entries.insert(medication_id, entry.clone());

        tracing::info!(
            "Scheduled {} (medication {}) at {} repeating {}",
            medication.name,
            medication_id,
            first,
            if entry.is_periodic() { interval.to_string() } else { "never".to_string() }
        );

        Ok(entry)
    }

    /// Unregister `medication_id`. Returns false when nothing was armed.
    pub async fn cancel(&self, medication_id: MedicationId) -> bool {
        let mut state = self.state.lock().await;

        match state.entries.remove(&medication_id) {
            Some(_) => {
                self.timer.cancel(medication_id);
                tracing::info!("Cancelled alarm for medication {}", medication_id);
                true
            }
            None => false,
        }
    }

    pub async fn entry(&self, medication_id: MedicationId) -> Option<ScheduleEntry> {
        self.state.lock().await.entries.get(&medication_id).cloned()
    }

    /// All armed entries, soonest first
    pub async fn entries(&self) -> Vec<ScheduleEntry> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state.entries.values().cloned().collect();
        entries.sort_by_key(|e| (e.next_fire, e.medication_id));
        entries
    }

    /// Account for a fire reported by the timer facility.
    pub async fn record_fire(&self, fire: &Fire) -> FireOutcome {
        let mut state = self.state.lock().await;
        let medication_id = fire.tag.medication_id;

        let entry = match state.entries.get_mut(&medication_id) {
            Some(entry) if entry.generation == fire.tag.generation => entry,
            _ => return FireOutcome::Stale,
        };

        entry.fire_count += 1;
        match calculator::next_fire(fire.scheduled_at, entry.interval) {
            Some(next) => {
                entry.next_fire = next;
                FireOutcome::Deliver { completed: false }
            }
            None => {
                state.entries.remove(&medication_id);
                FireOutcome::Deliver { completed: true }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::alarm::testing::{RecordingTimer, TimerCall};

    fn medication(id: MedicationId, dosage: &str) -> Medication {
        Medication {
            medication_id: id,
            name: "Aspirin".to_string(),
            dosage: dosage.to_string(),
            frequency: "00:00:00".to_string(),
            start_date: "25/12/2030".to_string(),
            start_time: "09:00".to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 12, 25, 9, 0, 0).unwrap()
    }

    fn setup() -> (Arc<RecordingTimer>, AlarmRegistry) {
        let timer = Arc::new(RecordingTimer::default());
        let registry = AlarmRegistry::new(timer.clone());
        (timer, registry)
    }

    fn fire(entry: &ScheduleEntry, scheduled_at: DateTime<Utc>) -> Fire {
        Fire {
            tag: AlarmTag {
                medication_id: entry.medication_id,
                generation: entry.generation,
                payload: entry.payload.clone(),
            },
            scheduled_at,
        }
    }

    #[tokio::test]
    async fn test_one_shot_registration() {
        let (timer, registry) = setup();

        let entry = registry.register(&medication(1, "100mg"), RecurrenceInterval::NONE, t0()).await.unwrap();

        assert!(!entry.is_periodic());
        assert_eq!(entry.next_fire, t0());
        assert_eq!(
            timer.calls(),
            vec![TimerCall::OneShot { medication_id: 1, generation: entry.generation, at: t0() }]
        );
        assert_eq!(registry.entry(1).await, Some(entry));
    }

    #[tokio::test]
    async fn test_periodic_registration() {
        let (timer, registry) = setup();

        let entry = registry
            .register(&medication(1, "100mg"), RecurrenceInterval::new(1, 0, 0), t0())
            .await
            .unwrap();

        assert!(entry.is_periodic());
        assert_eq!(
            timer.calls(),
            vec![TimerCall::Periodic {
                medication_id: 1,
                generation: entry.generation,
                first: t0(),
                period: Duration::hours(24),
            }]
        );
    }

    #[tokio::test]
    async fn test_replacement_leaves_one_live_registration() {
        let (timer, registry) = setup();

        let a = registry.register(&medication(7, "100mg"), RecurrenceInterval::NONE, t0()).await.unwrap();
        let later = t0() + Duration::hours(3);
        let b = registry
            .register(&medication(7, "200mg"), RecurrenceInterval::new(0, 8, 0), later)
            .await
            .unwrap();

        assert!(b.generation > a.generation);
        assert_eq!(
            timer.calls(),
            vec![
                TimerCall::OneShot { medication_id: 7, generation: a.generation, at: t0() },
                TimerCall::Cancel { medication_id: 7 },
                TimerCall::Periodic {
                    medication_id: 7,
                    generation: b.generation,
                    first: later,
                    period: Duration::hours(8),
                },
            ]
        );
        assert_eq!(timer.live_count(), 1);
        assert_eq!(timer.live(7).map(|tag| tag.payload.dosage), Some("200mg".to_string()));
        assert_eq!(registry.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (timer, registry) = setup();
        registry.register(&medication(3, "100mg"), RecurrenceInterval::NONE, t0()).await.unwrap();

        assert!(registry.cancel(3).await);
        assert!(!registry.cancel(3).await);
        assert!(!registry.cancel(99).await);

        assert_eq!(timer.live_count(), 0);
        assert_eq!(
            timer.calls().iter().filter(|c| matches!(c, TimerCall::Cancel { .. })).count(),
            1
        );
        assert_eq!(registry.entry(3).await, None);
    }

    #[tokio::test]
    async fn test_failed_replacement_leaves_id_unscheduled() {
        let (timer, registry) = setup();
        registry.register(&medication(5, "100mg"), RecurrenceInterval::NONE, t0()).await.unwrap();

        timer.fail_next(TimerError::QuotaExceeded(1));
        let result = registry
            .register(&medication(5, "200mg"), RecurrenceInterval::NONE, t0())
            .await;

        assert_eq!(result, Err(TimerError::QuotaExceeded(1)));
        assert_eq!(timer.live_count(), 0, "previous registration must stay cancelled");
        assert_eq!(registry.entry(5).await, None);
    }

    #[tokio::test]
    async fn test_one_shot_fire_completes() {
        let (_timer, registry) = setup();
        let entry = registry.register(&medication(1, "100mg"), RecurrenceInterval::NONE, t0()).await.unwrap();

        assert_eq!(registry.record_fire(&fire(&entry, t0())).await, FireOutcome::Deliver { completed: true });
        assert_eq!(registry.entry(1).await, None);

        // A duplicate delivery of the same fire finds nothing armed.
        assert_eq!(registry.record_fire(&fire(&entry, t0())).await, FireOutcome::Stale);
    }

    #[tokio::test]
    async fn test_periodic_fire_advances_from_scheduled_instant() {
        let (_timer, registry) = setup();
        let hourly = RecurrenceInterval::new(0, 1, 0);
        let entry = registry.register(&medication(1, "100mg"), hourly, t0()).await.unwrap();

        for n in 0..3 {
            let scheduled = t0() + Duration::hours(n);
            assert_eq!(
                registry.record_fire(&fire(&entry, scheduled)).await,
                FireOutcome::Deliver { completed: false }
            );
        }

        let entry = registry.entry(1).await.unwrap();
        assert_eq!(entry.fire_count, 3);
        assert_eq!(entry.next_fire, t0() + Duration::hours(3));
    }

    #[tokio::test]
    async fn test_superseded_fire_is_stale() {
        let (_timer, registry) = setup();
        let old = registry.register(&medication(2, "100mg"), RecurrenceInterval::new(1, 0, 0), t0()).await.unwrap();
        registry.register(&medication(2, "200mg"), RecurrenceInterval::new(1, 0, 0), t0()).await.unwrap();

        assert_eq!(registry.record_fire(&fire(&old, t0())).await, FireOutcome::Stale);
        assert_eq!(registry.entry(2).await.unwrap().fire_count, 0);
    }

    #[tokio::test]
    async fn test_entries_sorted_by_next_fire() {
        let (_timer, registry) = setup();
        registry.register(&medication(1, "a"), RecurrenceInterval::NONE, t0() + Duration::hours(2)).await.unwrap();
        registry.register(&medication(2, "b"), RecurrenceInterval::NONE, t0()).await.unwrap();

        let ids: Vec<_> = registry.entries().await.iter().map(|e| e.medication_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
