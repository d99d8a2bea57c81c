use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_DATABASE_URL: &str = "sqlite://tutoring.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub reminder_interval: Duration,
    pub reminders_enabled: bool,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;

        let interval_secs = match lookup("REMINDER_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("REMINDER_INTERVAL_SECS is invalid: {}", e)))?,
            None => DEFAULT_REMINDER_INTERVAL_SECS,
        };
        if interval_secs == 0 {
            return Err(AppError::Config(
                "REMINDER_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        let reminders_enabled = match lookup("REMINDERS_ENABLED").as_deref() {
            None => true,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "REMINDERS_ENABLED must be true or false, got {}",
                    other
                )));
            }
        };

        Ok(Self {
            database_url,
            bind_addr,
            reminder_interval: Duration::from_secs(interval_secs),
            reminders_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.reminder_interval, Duration::from_secs(60));
        assert!(config.reminders_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("REMINDER_INTERVAL_SECS", "5"),
            ("REMINDERS_ENABLED", "false"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.reminder_interval, Duration::from_secs(5));
        assert!(!config.reminders_enabled);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = AppConfig::from_lookup(lookup_from(&[("REMINDER_INTERVAL_SECS", "0")]));
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_flag() {
        let err = AppConfig::from_lookup(lookup_from(&[("REMINDERS_ENABLED", "maybe")]));
        assert!(matches!(err, Err(AppError::Config(_))));
    }
}
