use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use shared::protocol::{DATE_SEPARATOR, TIME_SEPARATOR};
use super::{split_numbers, RecurrenceInterval, ScheduleError};

/// Time zone the user's wall-clock dates and times are interpreted in.
/// Configured as `local`, `utc` or an IANA name such as `Europe/Berlin`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Calendar {
    /// Host time zone
    #[default]
    Local,
    Utc,
    Zone(Tz),
}

impl Calendar {
    fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Calendar::Local => resolve_in(&Local, naive),
            Calendar::Utc => resolve_in(&Utc, naive),
            Calendar::Zone(tz) => resolve_in(tz, naive),
        }
    }
}

impl TryFrom<String> for Calendar {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        match name.as_str() {
            "local" => Ok(Calendar::Local),
            "utc" => Ok(Calendar::Utc),
            _ => name
                .parse::<Tz>()
                .map(Calendar::Zone)
                .map_err(|_| format!("unknown time zone `{}`", name)),
        }
    }
}

/// Resolve a wall-clock time in `zone` to an absolute instant. Times skipped
/// by a DST transition do not exist; repeated ones resolve to the earlier instant.
fn resolve_in<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Parse a `D/M/Y` start date. The month is 1-based, as chrono expects.
pub fn parse_start_date(s: &str) -> Result<NaiveDate, ScheduleError> {
    let malformed = || ScheduleError::MalformedDate(s.to_string());

    let [day, month, year] = split_numbers::<3>(s, DATE_SEPARATOR).ok_or_else(malformed)?;
    let year = i32::try_from(year).map_err(|_| malformed())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)
}

/// Parse a 24-hour `HH:MM` start time. Seconds are always zero.
pub fn parse_start_time(s: &str) -> Result<NaiveTime, ScheduleError> {
    let malformed = || ScheduleError::MalformedTime(s.to_string());

    let [hour, minute] = split_numbers::<2>(s, TIME_SEPARATOR).ok_or_else(malformed)?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(malformed)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleCalculator {
    calendar: Calendar,
}

impl ScheduleCalculator {
    pub fn new(calendar: Calendar) -> Self {
        Self { calendar }
    }

    /// Combine a start date and time into an absolute instant, without
    /// checking it against the current time.
    pub fn candidate(&self, start_date: &str, start_time: &str) -> Result<DateTime<Utc>, ScheduleError> {
        let date = parse_start_date(start_date)?;
        let time = parse_start_time(start_time)?;

        self.calendar
            .resolve(date.and_time(time))
            .ok_or_else(|| ScheduleError::MalformedTime(start_time.to_string()))
    }

    /// First fire instant for a new or edited schedule. Anything not strictly
    /// after `now` is rejected; past times are never moved forward.
    pub fn first_fire(
        &self,
        start_date: &str,
        start_time: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let scheduled = self.candidate(start_date, start_time)?;

        if scheduled <= now {
            return Err(ScheduleError::ScheduleInThePast { scheduled, now });
        }

        Ok(scheduled)
    }
}

/// The instant following `previous`, counted from the scheduled instant rather
/// than from when the fire was observed. `None` for one-shot schedules.
pub fn next_fire(previous: DateTime<Utc>, interval: RecurrenceInterval) -> Option<DateTime<Utc>> {
    nth_fire(previous, interval, 1)
}

/// `first + n * period`. The 0th fire is `first` itself.
pub fn nth_fire(first: DateTime<Utc>, interval: RecurrenceInterval, n: i64) -> Option<DateTime<Utc>> {
    if n == 0 {
        return Some(first);
    }
    let period = interval.period()?;
    let offset = period.num_milliseconds().checked_mul(n)?;
    first.checked_add_signed(Duration::milliseconds(offset))
}

/// Smallest `first + k * period` strictly after `now`, for re-arming a stored
/// schedule at startup. A one-shot whose instant has passed has none.
pub fn next_fire_after(
    first: DateTime<Utc>,
    interval: RecurrenceInterval,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if first > now {
        return Some(first);
    }
    let period_ms = interval.period()?.num_milliseconds();
    let elapsed_ms = (now - first).num_milliseconds();
    nth_fire(first, interval, elapsed_ms / period_ms + 1)
}
