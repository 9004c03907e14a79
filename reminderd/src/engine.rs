use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use shared::types::{Medication, MedicationDraft, MedicationId};
use crate::alarm::{AlarmRegistry, ScheduleEntry, TimerError};
use crate::schedule::frequency::parse_frequency;
use crate::schedule::{calculator, RecurrenceInterval, ScheduleCalculator, ScheduleError};
use crate::store_manager::StoreHandle;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("could not arm reminder: {0}")]
    RegistrationFailure(#[from] TimerError),

    #[error("medication {0} not found")]
    NotFound(MedicationId),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Outcome of re-arming the stored collection at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub armed: usize,
    /// One-time reminders whose instant passed while the daemon was down
    pub expired: usize,
    /// Records whose frequency, date or time no longer parse
    pub invalid: usize,
    pub failed: usize,
}

/// Mints medication ids: wall-clock milliseconds, bumped past anything
/// already minted or ever stored so ids only grow and are never reused.
#[derive(Debug, Default)]
pub struct IdMinter {
    last: AtomicI64,
}

impl IdMinter {
    /// `high_water` is the largest id the store has ever held.
    pub fn mint(&self, high_water: MedicationId) -> MedicationId {
        let floor = high_water.saturating_add(1);
        let now = Utc::now().timestamp_millis();

        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let next = now.max(prev + 1).max(floor);
            match self.last.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Submission, edit, deletion and startup re-arming of medication reminders.
/// Every change is a read-modify-write of the whole stored collection, run
/// one at a time under the writer lock.
pub struct ReminderEngine {
    store: StoreHandle,
    registry: Arc<AlarmRegistry>,
    calculator: ScheduleCalculator,
    ids: IdMinter,
    writer: Mutex<()>,
}

impl ReminderEngine {
    pub fn new(store: StoreHandle, registry: Arc<AlarmRegistry>, calculator: ScheduleCalculator) -> Self {
        Self {
            store,
            registry,
            calculator,
            ids: IdMinter::default(),
            writer: Mutex::new(()),
        }
    }

    /// Add a new medication and arm its first reminder.
    pub async fn submit(&self, draft: MedicationDraft) -> Result<Medication, EngineError> {
        self.apply(None, draft).await
    }

    /// Replace medication `medication_id` wholesale and re-arm it.
    pub async fn edit(&self, medication_id: MedicationId, draft: MedicationDraft) -> Result<Medication, EngineError> {
        self.apply(Some(medication_id), draft).await
    }

    async fn apply(&self, editing: Option<MedicationId>, draft: MedicationDraft) -> Result<Medication, EngineError> {
        draft.validate().map_err(EngineError::MissingField)?;
        let interval = parse_frequency(&draft.frequency)?;
        let first = self
            .calculator
            .first_fire(&draft.start_date, &draft.start_time, Utc::now())?;

        let _writer = self.writer.lock().await;
        let mut medications = self.store.load_all().await?;

        let (medication_id, position) = match editing {
            Some(id) => {
                let position = medications
                    .iter()
                    .position(|m| m.medication_id == id)
                    .ok_or(EngineError::NotFound(id))?;
                (id, Some(position))
            }
            None => {
                let stored = medications.iter().map(|m| m.medication_id).max().unwrap_or(0);
                let high_water = self.store.high_water().await?.max(stored);
                (self.ids.mint(high_water), None)
            }
        };
        let medication = draft.into_medication(medication_id);

        self.registry.register(&medication, interval, first).await?;

        match position {
            Some(i) => medications[i] = medication.clone(),
            None => medications.push(medication.clone()),
        }

        if let Err(e) = self.store.save_all(medications).await {
            self.registry.cancel(medication_id).await;
            tracing::error!("Failed to save medication {}, reminder withdrawn: {:#}", medication_id, e);
            return Err(e.into());
        }

        Ok(medication)
    }

    /// Remove a medication and cancel its reminder.
    pub async fn delete(&self, medication_id: MedicationId) -> Result<Medication, EngineError> {
        let _writer = self.writer.lock().await;
        let mut medications = self.store.load_all().await?;

        let position = medications
            .iter()
            .position(|m| m.medication_id == medication_id)
            .ok_or(EngineError::NotFound(medication_id))?;

        let removed = medications.remove(position);
        self.store.save_all(medications).await?;
        self.registry.cancel(medication_id).await;

        tracing::info!("Deleted medication {} ({})", medication_id, removed.name);
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<Medication>, EngineError> {
        Ok(self.store.load_all().await?)
    }

    pub async fn get(&self, medication_id: MedicationId) -> Result<Medication, EngineError> {
        self.store
            .get(medication_id)
            .await?
            .ok_or(EngineError::NotFound(medication_id))
    }

    pub async fn schedules(&self) -> Vec<ScheduleEntry> {
        self.registry.entries().await
    }

    pub async fn schedule(&self, medication_id: MedicationId) -> Result<ScheduleEntry, EngineError> {
        self.registry
            .entry(medication_id)
            .await
            .ok_or(EngineError::NotFound(medication_id))
    }

    /// Re-derive and arm every stored schedule. Recurring schedules resume on
    /// their original grid; one-time reminders already in the past are skipped.
    pub async fn restore(&self) -> Result<RestoreReport, EngineError> {
        let _writer = self.writer.lock().await;
        let medications = self.store.load_all().await?;
        let now = Utc::now();
        let mut report = RestoreReport::default();

        for medication in &medications {
            let medication_id = medication.medication_id;

            let (interval, first) = match self.plan(medication) {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!("Not re-arming medication {}: {}", medication_id, e);
                    report.invalid += 1;
                    continue;
                }
            };

            let Some(next) = calculator::next_fire_after(first, interval, now) else {
                tracing::debug!("One-time reminder for medication {} already passed", medication_id);
                report.expired += 1;
                continue;
            };

            match self.registry.register(medication, interval, next).await {
                Ok(_) => report.armed += 1,
                Err(e) => {
                    tracing::error!("Failed to re-arm medication {}: {}", medication_id, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Restored reminders: {} armed, {} expired, {} invalid, {} failed",
            report.armed,
            report.expired,
            report.invalid,
            report.failed
        );
        Ok(report)
    }

    fn plan(&self, medication: &Medication) -> Result<(RecurrenceInterval, chrono::DateTime<Utc>), ScheduleError> {
        let interval = parse_frequency(&medication.frequency)?;
        let first = self.calculator.candidate(&medication.start_date, &medication.start_time)?;
        Ok((interval, first))
    }
}
