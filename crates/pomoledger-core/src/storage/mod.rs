mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, StorageConfig, TimerConfig};
pub use database::{week_bounds, Database};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DatabaseError};
use crate::timer::StepType;

/// Returns the data directory, creating it if needed.
///
/// `POMOLEDGER_HOME` wins when set. Otherwise `~/.config/pomoledger`, or
/// `~/.config/pomoledger-dev` with `POMOLEDGER_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("POMOLEDGER_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("POMOLEDGER_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("pomoledger-dev")
            } else {
                base_dir.join("pomoledger")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// A finished interval waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub project_id: i64,
    pub project_name: String,
    pub step_type: StepType,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Accrued, non-paused seconds. May be less than `ended_at - started_at`.
    pub duration_secs: u64,
}

/// A committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub step_type: StepType,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: u64,
}

/// Focus time per active project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTotals {
    pub id: i64,
    pub name: String,
    pub total_secs: u64,
    pub week_secs: u64,
}

/// Durable project/session ledger used by the session controller.
pub trait ProjectStore: Send {
    /// Id of the project called `name`, creating it when missing.
    fn resolve_or_create_project(&self, name: &str) -> Result<i64, DatabaseError>;

    /// Returns `true` when the project was newly created.
    fn add_project(&self, name: &str) -> Result<bool, DatabaseError>;

    /// Append one session. Returns the new record id.
    fn record_session(&self, session: &NewSession) -> Result<i64, DatabaseError>;

    /// Active projects ordered by name, with all-time and this-week focus
    /// totals. The week runs from local Monday 00:00 to the next Monday
    /// 00:00 around the current time.
    fn active_project_totals(&self) -> Result<Vec<ProjectTotals>, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_honors_home_override() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("ledger");
        std::env::set_var("POMOLEDGER_HOME", &target);
        let dir = data_dir().unwrap();
        std::env::remove_var("POMOLEDGER_HOME");
        assert_eq!(dir, target);
        assert!(target.is_dir());
    }
}
