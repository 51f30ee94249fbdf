use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// What the propagator does with orders that embed a rider which was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiderDeletePolicy {
    /// Orders keep the last synchronized snapshot.
    #[default]
    Keep,
    /// Orders drop their rider and fall back to "unassigned".
    Unassign,
}

impl FromStr for RiderDeletePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "unassign" => Ok(Self::Unassign),
            other => Err(format!("unknown policy {other}, expected keep/unassign")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other}, expected compact/json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub change_feed_buffer_size: usize,
    pub change_history_size: usize,
    pub checkpoint_path: Option<PathBuf>,
    pub resubscribe_delay: Duration,
    pub rider_delete_policy: RiderDeletePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or_default("LOG_FORMAT", LogFormat::Compact)?,
            change_feed_buffer_size: parse_or_default("CHANGE_FEED_BUFFER_SIZE", 1024)?,
            change_history_size: parse_or_default("CHANGE_HISTORY_SIZE", 4096)?,
            checkpoint_path: env::var("CHECKPOINT_PATH")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from),
            resubscribe_delay: Duration::from_millis(parse_or_default(
                "RESUBSCRIBE_DELAY_MS",
                250u64,
            )?),
            rider_delete_policy: parse_or_default(
                "RIDER_DELETE_POLICY",
                RiderDeletePolicy::Keep,
            )?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{LogFormat, RiderDeletePolicy};

    #[test]
    fn delete_policy_parses_case_insensitively() {
        assert_eq!("KEEP".parse::<RiderDeletePolicy>(), Ok(RiderDeletePolicy::Keep));
        assert_eq!(
            " unassign ".parse::<RiderDeletePolicy>(),
            Ok(RiderDeletePolicy::Unassign)
        );
        assert!("reassign".parse::<RiderDeletePolicy>().is_err());
    }

    #[test]
    fn log_format_rejects_unknown_values() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
