use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use crate::schedule::Calendar;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Zone start dates and times are entered in
    #[serde(default)]
    pub timezone: Calendar,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    /// Registrations beyond this many live alarms are refused
    #[serde(default = "default_max_alarms")]
    pub max_alarms: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/medication-reminder/medications.db")
}

fn default_max_alarms() -> usize {
    500
}

fn default_listen() -> String {
    "127.0.0.1:8077".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_alarms: default_max_alarms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.store.db_path, default_db_path());
        assert_eq!(config.schedule.timezone, Calendar::Local);
        assert_eq!(config.timer.max_alarms, 500);
        assert_eq!(config.api.listen, "127.0.0.1:8077");
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [store]
            db_path = "/tmp/meds.db"

            [schedule]
            timezone = "utc"

            [timer]
            max_alarms = 16

            [api]
            listen = "[::1]:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.db_path, PathBuf::from("/tmp/meds.db"));
        assert_eq!(config.schedule.timezone, Calendar::Utc);
        assert_eq!(config.timer.max_alarms, 16);
        assert_eq!(config.api.listen, "[::1]:9000");
    }

    #[test]
    fn test_named_timezone() {
        let config = Config::parse("[schedule]\ntimezone = \"Europe/Berlin\"").unwrap();
        assert_eq!(config.schedule.timezone, Calendar::Zone(chrono_tz::Europe::Berlin));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        assert!(Config::parse("[schedule]\ntimezone = \"mars\"").is_err());
    }
}
