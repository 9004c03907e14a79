/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Frequency literal meaning "fire once, never repeat"
pub const ONE_SHOT_FREQUENCY: &str = "00:00:00";

/// Separators of the textual wire formats kept in persisted records:
/// start date `D/M/Y`, start time `HH:MM`, frequency `D:H:M`.
pub const DATE_SEPARATOR: char = '/';
pub const TIME_SEPARATOR: char = ':';
pub const FREQUENCY_SEPARATOR: char = ':';
