//! Recording doubles for the timer facility and notification surface.

use std::collections::HashMap;
use std::sync::Mutex;
use chrono::{DateTime, Duration, Utc};
use shared::types::{FireEvent, MedicationId};
use super::notify::Notifier;
use super::timer::{AlarmTag, TimerError, TimerFacility};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCall {
    OneShot { medication_id: MedicationId, generation: u64, at: DateTime<Utc> },
    Periodic { medication_id: MedicationId, generation: u64, first: DateTime<Utc>, period: Duration },
    Cancel { medication_id: MedicationId },
}

#[derive(Default)]
pub struct RecordingTimer {
    calls: Mutex<Vec<TimerCall>>,
    live: Mutex<HashMap<MedicationId, AlarmTag>>,
    fail_next: Mutex<Option<TimerError>>,
}

impl RecordingTimer {
    pub fn calls(&self) -> Vec<TimerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn live(&self, medication_id: MedicationId) -> Option<AlarmTag> {
        self.live.lock().unwrap().get(&medication_id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Make the next registration fail with `err`
    pub fn fail_next(&self, err: TimerError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    fn record(&self, call: TimerCall, tag: AlarmTag) -> Result<(), TimerError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(call);
        self.live.lock().unwrap().insert(tag.medication_id, tag);
        Ok(())
    }
}

impl TimerFacility for RecordingTimer {
    fn register_one_shot(&self, tag: AlarmTag, at: DateTime<Utc>) -> Result<(), TimerError> {
        let call = TimerCall::OneShot {
            medication_id: tag.medication_id,
            generation: tag.generation,
            at,
        };
        self.record(call, tag)
    }

    fn register_periodic(&self, tag: AlarmTag, first: DateTime<Utc>, period: Duration) -> Result<(), TimerError> {
        let call = TimerCall::Periodic {
            medication_id: tag.medication_id,
            generation: tag.generation,
            first,
            period,
        };
        self.record(call, tag)
    }

    fn cancel(&self, medication_id: MedicationId) {
        self.calls.lock().unwrap().push(TimerCall::Cancel { medication_id });
        self.live.lock().unwrap().remove(&medication_id);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<FireEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<FireEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, event: &FireEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}
