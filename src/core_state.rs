//! Service-wide state shared by the HTTP handlers and the sweep scheduler.
//!
//! Holds configuration only. Each request and each sweep run opens its own
//! SQLite connection, so no connection or lock is shared between threads.

use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveDateTime;

use crate::config::{EscalationConfig, ServiceConfig};
use crate::db;
use crate::escalation::EscalationEngine;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: ServiceConfig,
    started_at: Instant,
}

impl CoreState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
        }
    }

    /// Create the data directory if needed and bring the schema up to date.
    /// Called once at startup, before any request is served.
    pub fn initialize(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DataDir {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let conn = self.open_db()?;
        let tables = db::count_tables(&conn)?;
        tracing::info!(db = %self.config.db_path.display(), tables, "Database ready");
        Ok(())
    }

    /// Open a fresh connection (WAL, foreign keys, busy timeout, migrations applied).
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.config.db_path).map_err(CoreError::Database)
    }

    /// Current patient-local wall clock.
    pub fn local_now(&self) -> NaiveDateTime {
        self.config.local_now()
    }

    pub fn escalation_config(&self) -> EscalationConfig {
        self.config.escalation
    }

    /// Engine over a connection the caller opened.
    pub fn engine<'c>(&self, conn: &'c rusqlite::Connection) -> EscalationEngine<'c> {
        EscalationEngine::new(conn, self.config.escalation)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Cannot create data directory {path}: {reason}")]
    DataDir { path: PathBuf, reason: String },
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error(transparent)]
    Engine(#[from] crate::error::EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_in(dir: &tempfile::TempDir) -> CoreState {
        CoreState::new(ServiceConfig {
            db_path: dir.path().join("nested").join("sidiya.db"),
            ..ServiceConfig::default()
        })
    }

    #[test]
    fn initialize_creates_data_dir_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state.initialize().unwrap();
        assert!(dir.path().join("nested").join("sidiya.db").exists());

        let conn = state.open_db().unwrap();
        assert_eq!(db::count_tables(&conn).unwrap(), 11);
    }

    #[test]
    fn connections_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state.initialize().unwrap();

        let writer = state.open_db().unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let patient = crate::db::repository::test_support::make_patient(&writer, "+919800000001", day);

        let reader = state.open_db().unwrap();
        assert!(db::get_patient(&reader, &patient.id).unwrap().is_some());
    }

    #[test]
    fn engine_uses_configured_tunables() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig {
            db_path: dir.path().join("sidiya.db"),
            ..ServiceConfig::default()
        };
        config.escalation.medication_grace = chrono::Duration::minutes(15);
        let state = CoreState::new(config);
        let conn = state.open_db().unwrap();
        assert_eq!(state.engine(&conn).config().medication_grace, chrono::Duration::minutes(15));
    }
}
