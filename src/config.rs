use std::path::PathBuf;

use chrono::NaiveTime;

use crate::errors::AppError;

/// Scoring and attendance thresholds, read once at startup.
///
/// All comparisons happen in UTC. Deployments in other timezones shift the
/// thresholds via env vars instead of converting clocks per request.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// First login at or before this time counts as on time.
    pub late_login_threshold: NaiveTime,
    /// First login after this time marks the day as half_day.
    pub half_day_threshold: NaiveTime,
    pub task_completion_points: i64,
    pub late_login_penalty: i64,
}

impl ScoringConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let late_login_threshold = parse_time_var("LATE_LOGIN_THRESHOLD", "09:30")?;
        let half_day_threshold = parse_time_var("HALF_DAY_THRESHOLD", "13:00")?;

        Ok(Self {
            late_login_threshold,
            half_day_threshold,
            task_completion_points: 10,
            late_login_penalty: -5,
        })
    }
}

fn parse_time_var(name: &str, default: &str) -> Result<NaiveTime, AppError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|_| AppError::configuration(format!("{name} must be HH:MM, got {raw}")))
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .map(|val| val.parse::<usize>())
            .unwrap_or(Ok(10 * 1024 * 1024))
            .map_err(|_| AppError::configuration("MAX_UPLOAD_BYTES must be a valid integer"))?;

        Ok(Self {
            upload_dir: PathBuf::from(upload_dir),
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_parse() {
        let parsed = parse_time_var("STAFFHUB_UNSET_TIME_VAR", "09:30").unwrap();
        assert_eq!(parsed, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }
}
