pub mod calculator;
pub mod frequency;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use calculator::{Calendar, ScheduleCalculator};
pub use frequency::RecurrenceInterval;

/// Input and semantic validation failures. Never retried: the user has to
/// correct the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("malformed frequency {0:?}, expected D:H:M")]
    MalformedFrequency(String),

    #[error("malformed start date {0:?}, expected D/M/Y")]
    MalformedDate(String),

    #[error("malformed start time {0:?}, expected HH:MM")]
    MalformedTime(String),

    #[error("cannot schedule a reminder in the past ({scheduled} is not after {now})")]
    ScheduleInThePast {
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

/// Splits `input` on `sep` into exactly `N` unsigned integers.
/// Tokens must be non-empty runs of ASCII digits.
pub(crate) fn split_numbers<const N: usize>(input: &str, sep: char) -> Option<[u32; N]> {
    let mut out = [0u32; N];
    let mut tokens = input.split(sep);

    for slot in out.iter_mut() {
        let token = tokens.next()?;
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = token.parse().ok()?;
    }

    if tokens.next().is_some() {
        return None;
    }

    Some(out)
}
