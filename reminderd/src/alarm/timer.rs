use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use shared::types::MedicationId;

/// Longest single sleep; longer waits are re-armed in steps.
const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(86_400);

/// Human-readable content captured when the alarm is armed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmPayload {
    pub name: String,
    pub dosage: String,
}

/// What the timer facility hands back when a registration fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmTag {
    pub medication_id: MedicationId,
    /// Registry generation of the entry that armed this alarm
    pub generation: u64,
    pub payload: AlarmPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fire {
    pub tag: AlarmTag,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timer facility is shut down")]
    ShutDown,

    #[error("repeat period must be positive")]
    InvalidPeriod,

    #[error("alarm limit of {0} reached")]
    QuotaExceeded(usize),
}

/// Host timer facility. Registrations are keyed by medication id: at most one
/// live registration per id.
pub trait TimerFacility: Send + Sync {
    /// Fire once at or after `at`.
    fn register_one_shot(&self, tag: AlarmTag, at: DateTime<Utc>) -> Result<(), TimerError>;

    /// Fire at `first`, then every `period` after it, until cancelled.
    fn register_periodic(
        &self,
        tag: AlarmTag,
        first: DateTime<Utc>,
        period: Duration,
    ) -> Result<(), TimerError>;

    /// Drop the registration for `medication_id`, if any.
    fn cancel(&self, medication_id: MedicationId);
}

struct Armed {
    seq: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ArmedSet {
    next_seq: u64,
    alarms: HashMap<MedicationId, Armed>,
}

/// In-process timer: one task per registration on the tokio runtime, fires
/// delivered over an mpsc channel. Registrations live as long as the process;
/// the daemon re-arms them from the store at startup.
pub struct TokioTimer {
    runtime: Handle,
    fire_tx: mpsc::Sender<Fire>,
    armed: Arc<Mutex<ArmedSet>>,
    max_alarms: usize,
}

impl TokioTimer {
    pub fn new(runtime: Handle, fire_tx: mpsc::Sender<Fire>, max_alarms: usize) -> Self {
        Self {
            runtime,
            fire_tx,
            armed: Arc::new(Mutex::new(ArmedSet::default())),
            max_alarms,
        }
    }

    /// Number of live registrations
    pub fn armed_count(&self) -> usize {
        lock(&self.armed).alarms.len()
    }

    fn arm(&self, tag: AlarmTag, first: DateTime<Utc>, period: Option<Duration>) -> Result<(), TimerError> {
        if self.fire_tx.is_closed() {
            return Err(TimerError::ShutDown);
        }
        if period.is_some_and(|p| p <= Duration::zero()) {
            return Err(TimerError::InvalidPeriod);
        }

        let medication_id = tag.medication_id;
        let mut armed = lock(&self.armed);

        if !armed.alarms.contains_key(&medication_id) && armed.alarms.len() >= self.max_alarms {
            return Err(TimerError::QuotaExceeded(self.max_alarms));
        }

        if let Some(previous) = armed.alarms.remove(&medication_id) {
            previous.cancel.cancel();
        }

        armed.next_seq += 1;
        let seq = armed.next_seq;
        let cancel = CancellationToken::new();
        armed.alarms.insert(medication_id, Armed { seq, cancel: cancel.clone() });
        drop(armed);

        let task = AlarmTask {
            tag,
            first,
            period,
            origin: Origin::now(),
            cancel,
            fire_tx: self.fire_tx.clone(),
            armed: self.armed.clone(),
            seq,
        };
        self.runtime.spawn(task.run());

        Ok(())
    }
}

impl TimerFacility for TokioTimer {
    fn register_one_shot(&self, tag: AlarmTag, at: DateTime<Utc>) -> Result<(), TimerError> {
        self.arm(tag, at, None)
    }

    fn register_periodic(
        &self,
        tag: AlarmTag,
        first: DateTime<Utc>,
        period: Duration,
    ) -> Result<(), TimerError> {
        self.arm(tag, first, Some(period))
    }

    fn cancel(&self, medication_id: MedicationId) {
        if let Some(armed) = lock(&self.armed).alarms.remove(&medication_id) {
            armed.cancel.cancel();
        }
    }
}

fn lock(armed: &Mutex<ArmedSet>) -> MutexGuard<'_, ArmedSet> {
    armed.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pairs a wall-clock instant with the monotonic clock so every deadline of a
/// registration is measured from the same point. The monotonic clock does not
/// advance while the host is suspended, so a fire can come late but never early.
#[derive(Clone, Copy)]
struct Origin {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl Origin {
    fn now() -> Self {
        Self { instant: Instant::now(), wall: Utc::now() }
    }

    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        let ahead = (at - self.wall).to_std().unwrap_or_default();
        self.instant + ahead
    }
}

struct AlarmTask {
    tag: AlarmTag,
    first: DateTime<Utc>,
    period: Option<Duration>,
    origin: Origin,
    cancel: CancellationToken,
    fire_tx: mpsc::Sender<Fire>,
    armed: Arc<Mutex<ArmedSet>>,
    seq: u64,
}

impl AlarmTask {
    async fn run(self) {
        let medication_id = self.tag.medication_id;
        let mut n: i64 = 0;

        while let Some(scheduled_at) = self.nth(n) {
            let deadline = self.origin.deadline(scheduled_at);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep_until(deadline) => {}
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let fire = Fire { tag: self.tag.clone(), scheduled_at };
            if self.fire_tx.send(fire).await.is_err() {
                tracing::warn!("Fire channel closed, dropping alarm for medication {}", medication_id);
                break;
            }

            if self.period.is_none() {
                break;
            }
            n += 1;
        }

        let mut armed = lock(&self.armed);
        if armed.alarms.get(&medication_id).is_some_and(|a| a.seq == self.seq) {
            armed.alarms.remove(&medication_id);
        }
    }

    /// Deadlines are `first + n * period`, never "last delivery + period".
    fn nth(&self, n: i64) -> Option<DateTime<Utc>> {
        match (n, self.period) {
            (0, _) => Some(self.first),
            (_, None) => None,
            (n, Some(period)) => {
                let offset = period.num_milliseconds().checked_mul(n)?;
                self.first.checked_add_signed(Duration::milliseconds(offset))
            }
        }
    }
}

async fn sleep_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        tokio::time::sleep_until(deadline.min(now + MAX_SLEEP)).await;
    }
}
