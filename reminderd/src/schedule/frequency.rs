use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use shared::protocol::FREQUENCY_SEPARATOR;
use super::{split_numbers, ScheduleError};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// Parsed form of a `D:H:M` frequency. All zero means "no recurrence".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurrenceInterval {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl RecurrenceInterval {
    pub const NONE: RecurrenceInterval = RecurrenceInterval { days: 0, hours: 0, minutes: 0 };

    pub fn new(days: u32, hours: u32, minutes: u32) -> Self {
        Self { days, hours, minutes }
    }

    pub fn is_recurring(&self) -> bool {
        *self != Self::NONE
    }

    pub fn as_millis(&self) -> i64 {
        self.days as i64 * DAY_MS + self.hours as i64 * HOUR_MS + self.minutes as i64 * MINUTE_MS
    }

    /// Repeat period, or `None` for a one-shot schedule.
    pub fn period(&self) -> Option<chrono::Duration> {
        self.is_recurring()
            .then(|| chrono::Duration::milliseconds(self.as_millis()))
    }
}

impl FromStr for RecurrenceInterval {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [days, hours, minutes] = split_numbers::<3>(s, FREQUENCY_SEPARATOR)
            .ok_or_else(|| ScheduleError::MalformedFrequency(s.to_string()))?;

        Ok(Self::new(days, hours, minutes))
    }
}

impl fmt::Display for RecurrenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.days, self.hours, self.minutes)
    }
}

/// Parse a frequency descriptor such as "01:00:00" (daily).
pub fn parse_frequency(s: &str) -> Result<RecurrenceInterval, ScheduleError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse_frequency("00:00:00").unwrap(), RecurrenceInterval::NONE);
        assert_eq!(parse_frequency("01:00:00").unwrap(), RecurrenceInterval::new(1, 0, 0));
        assert_eq!(parse_frequency("0:1:0").unwrap(), RecurrenceInterval::new(0, 1, 0));
        assert_eq!(parse_frequency("2:36:90").unwrap(), RecurrenceInterval::new(2, 36, 90));
    }

    #[test]
    fn test_parse_malformed() {
        for input in ["", "1:2", "1:2:3:4", "a:0:0", "-1:0:0", "1.5:0:0", "01:00", " 1:0:0", "1:0:0\n"] {
            assert_eq!(
                parse_frequency(input),
                Err(ScheduleError::MalformedFrequency(input.to_string())),
                "input {:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_one_shot_has_no_period() {
        let interval = parse_frequency(shared::protocol::ONE_SHOT_FREQUENCY).unwrap();
        assert!(!interval.is_recurring());
        assert_eq!(interval.period(), None);
    }

    #[test]
    fn test_period_millis() {
        assert_eq!(RecurrenceInterval::new(0, 1, 0).as_millis(), 3_600_000);
        assert_eq!(RecurrenceInterval::new(1, 2, 3).as_millis(), 86_400_000 + 7_200_000 + 180_000);
        assert_eq!(
            RecurrenceInterval::new(1, 0, 0).period(),
            Some(chrono::Duration::hours(24))
        );
    }

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(RecurrenceInterval::new(1, 2, 30).to_string(), "01:02:30");
        assert_eq!(RecurrenceInterval::NONE.to_string(), "00:00:00");
    }
}
