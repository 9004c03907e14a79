use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Stable identity of a medication. Assigned once, never reused.
pub type MedicationId = i64;

/// A medication and its schedule intent.
/// This is the canonical record kept by the persistence layer and served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub medication_id: MedicationId,

    pub name: String,

    /// Free-form amount taken each time, e.g. "100mg"
    pub dosage: String,

    /// Recurrence descriptor `DD:HH:MM`; "00:00:00" is a one-time reminder
    pub frequency: String,

    /// Calendar date `D/M/Y`, month 1-based
    pub start_date: String,

    /// 24-hour time of day `HH:MM`
    pub start_time: String,
}

/// What a user submits when creating or editing a medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDraft {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: String,
    pub start_time: String,
}

impl MedicationDraft {
    /// Returns the name of the first blank field, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            ("name", &self.name),
            ("dosage", &self.dosage),
            ("frequency", &self.frequency),
            ("startDate", &self.start_date),
            ("startTime", &self.start_time),
        ];

        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(*field),
            None => Ok(()),
        }
    }

    pub fn into_medication(self, medication_id: MedicationId) -> Medication {
        Medication {
            medication_id,
            name: self.name,
            dosage: self.dosage,
            frequency: self.frequency,
            start_date: self.start_date,
            start_time: self.start_time,
        }
    }
}

/// Emitted when a reminder fires. Consumed by the notification surface,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireEvent {
    pub medication_id: MedicationId,
    pub name: String,
    pub dosage: String,

    /// The instant the timer was asked to fire at, not the observed delivery time
    pub scheduled_at: DateTime<Utc>,
}
