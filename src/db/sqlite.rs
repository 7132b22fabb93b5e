use std::path::Path;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing;

use super::DatabaseError;

/// Writers wait this long for the SQLite lock before failing with SQLITE_BUSY.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn, true)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn, false)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection, wal: bool) -> Result<(), DatabaseError> {
    if wal {
        // journal_mode returns a row, so it cannot go through execute_batch.
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "SQLite journal mode");
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout={BUSY_TIMEOUT_MS};"
    ))?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
        (2, include_str!("../../resources/migrations/002_escalation_observations.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, Option<i64>>(0),
    )
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Start a write transaction that takes the database lock up front, so a
/// check followed by a write cannot interleave with another writer.
pub fn immediate_transaction(conn: &Connection) -> Result<Transaction<'_>, DatabaseError> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 10 entity tables + schema_version
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 11, "Expected 11 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(&dir.path().join("sidiya.db")).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn only_one_open_escalation_per_trigger() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "INSERT INTO patients (id, full_name, phone, enrolled_on, status, registered_at)
             VALUES ('p1', 'A', '+911234567', '2025-01-01', 'active', '2025-01-01 09:00:00');",
        )
        .unwrap();
        let insert = "INSERT INTO escalations (id, patient_id, trigger_type, level, status, detail,
                      created_at, last_observed_at, observation_count)
                      VALUES (?1, 'p1', 'missed_weight', 1, ?2, '', '2025-01-02 00:00:00',
                      '2025-01-02 00:00:00', 1)";
        conn.execute(insert, ["e1", "open"]).unwrap();
        assert!(conn.execute(insert, ["e2", "open"]).is_err());
        conn.execute(insert, ["e3", "resolved"]).unwrap();
    }
}
