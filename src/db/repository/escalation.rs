use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::*;
use crate::db::DatabaseError;
use crate::models::{Escalation, EscalationObservation, EscalationStatus, Resolution, TriggerType};

const ESCALATION_COLUMNS: &str = "id, patient_id, trigger_type, level, status, detail, created_at,
     last_observed_at, observation_count, acknowledged_at, resolution_type, action_taken,
     resolution_note, resolved_at";

/// Insert a new open escalation unless one is already open for the same
/// (patient, trigger). Returns `false` when the partial unique index rejected it.
pub fn insert_escalation_if_none_open(
    conn: &Connection,
    esc: &Escalation,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO escalations (id, patient_id, trigger_type, level, status, detail,
         created_at, last_observed_at, observation_count)
         VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?6, ?7, ?8)",
        params![
            esc.id.to_string(),
            esc.patient_id.to_string(),
            esc.trigger_type.as_str(),
            esc.level,
            esc.detail,
            fmt_datetime(&esc.created_at),
            fmt_datetime(&esc.last_observed_at),
            esc.observation_count,
        ],
    )?;
    Ok(inserted == 1)
}

pub fn get_open_escalation(
    conn: &Connection,
    patient_id: &Uuid,
    trigger_type: TriggerType,
) -> Result<Option<Escalation>, DatabaseError> {
    let esc = conn
        .query_row(
            &format!(
                "SELECT {ESCALATION_COLUMNS} FROM escalations
                 WHERE patient_id = ?1 AND trigger_type = ?2 AND status = 'open'"
            ),
            params![patient_id.to_string(), trigger_type.as_str()],
            row_to_escalation,
        )
        .optional()?;
    Ok(esc)
}

/// Fold another observation into an open escalation. Level only ever rises.
pub fn absorb_observation(
    conn: &Connection,
    escalation_id: &Uuid,
    detail: &str,
    level: u8,
    observed_at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE escalations
         SET last_observed_at = ?1, observation_count = observation_count + 1,
             detail = ?2, level = MAX(level, ?3)
         WHERE id = ?4 AND status = 'open'",
        params![
            fmt_datetime(observed_at),
            detail,
            level,
            escalation_id.to_string()
        ],
    )?;
    Ok(affected)
}

pub fn get_escalation(conn: &Connection, id: &Uuid) -> Result<Option<Escalation>, DatabaseError> {
    let esc = conn
        .query_row(
            &format!("SELECT {ESCALATION_COLUMNS} FROM escalations WHERE id = ?1"),
            params![id.to_string()],
            row_to_escalation,
        )
        .optional()?;
    Ok(esc)
}

/// Open and acknowledged escalations across all patients, most urgent first.
pub fn list_active_escalations(conn: &Connection) -> Result<Vec<Escalation>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ESCALATION_COLUMNS} FROM escalations
         WHERE status IN ('open', 'acknowledged')
         ORDER BY level DESC, last_observed_at DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map([], row_to_escalation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// All escalations for one patient, newest first.
pub fn list_patient_escalations(
    conn: &Connection,
    patient_id: &Uuid,
    active_only: bool,
) -> Result<Vec<Escalation>, DatabaseError> {
    let filter = if active_only {
        "AND status IN ('open', 'acknowledged')"
    } else {
        ""
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {ESCALATION_COLUMNS} FROM escalations
         WHERE patient_id = ?1 {filter}
         ORDER BY created_at DESC, level DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_escalation)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Unresolved escalations for the patient.
pub fn count_active_escalations(conn: &Connection, patient_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM escalations
         WHERE patient_id = ?1 AND status IN ('open', 'acknowledged')",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// open -> acknowledged. Returns rows changed (0 if the status had moved on).
pub fn mark_acknowledged(
    conn: &Connection,
    id: &Uuid,
    at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE escalations SET status = 'acknowledged', acknowledged_at = ?1
         WHERE id = ?2 AND status = 'open'",
        params![fmt_datetime(at), id.to_string()],
    )?;
    Ok(affected)
}

/// open | acknowledged -> resolved. Returns rows changed.
pub fn mark_resolved(
    conn: &Connection,
    id: &Uuid,
    resolution: &Resolution,
    at: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let affected = conn.execute(
        "UPDATE escalations
         SET status = 'resolved', resolution_type = ?1, action_taken = ?2,
             resolution_note = ?3, resolved_at = ?4
         WHERE id = ?5 AND status IN ('open', 'acknowledged')",
        params![
            resolution.resolution_type,
            Some(resolution.action_taken.as_str()).filter(|a| !a.is_empty()),
            resolution.note,
            fmt_datetime(at),
            id.to_string(),
        ],
    )?;
    Ok(affected)
}

/// Record an observation. Returns `false` if one already exists for the same
/// (patient, trigger, day, key).
pub fn insert_observation(
    conn: &Connection,
    obs: &EscalationObservation,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO escalation_observations (id, escalation_id, patient_id,
         trigger_type, observed_on, observation_key, detail, observed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            obs.id.to_string(),
            obs.escalation_id.to_string(),
            obs.patient_id.to_string(),
            obs.trigger_type.as_str(),
            fmt_date(&obs.observed_on),
            obs.observation_key,
            obs.detail,
            fmt_datetime(&obs.observed_at),
        ],
    )?;
    Ok(inserted == 1)
}

pub fn observation_recorded(
    conn: &Connection,
    patient_id: &Uuid,
    trigger_type: TriggerType,
    observed_on: NaiveDate,
    observation_key: &str,
) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM escalation_observations
             WHERE patient_id = ?1 AND trigger_type = ?2 AND observed_on = ?3
               AND observation_key = ?4",
            params![
                patient_id.to_string(),
                trigger_type.as_str(),
                fmt_date(&observed_on),
                observation_key
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_observations(
    conn: &Connection,
    escalation_id: &Uuid,
) -> Result<Vec<EscalationObservation>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, escalation_id, patient_id, trigger_type, observed_on, observation_key,
                detail, observed_at
         FROM escalation_observations WHERE escalation_id = ?1
         ORDER BY observed_at ASC, observed_on ASC",
    )?;
    let rows = stmt.query_map(params![escalation_id.to_string()], |row| {
        Ok(EscalationObservation {
            id: uuid_column(row, 0)?,
            escalation_id: uuid_column(row, 1)?,
            patient_id: uuid_column(row, 2)?,
            trigger_type: enum_column(row, 3)?,
            observed_on: date_column(row, 4)?,
            observation_key: row.get(5)?,
            detail: row.get(6)?,
            observed_at: datetime_column(row, 7)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

fn row_to_escalation(row: &rusqlite::Row) -> Result<Escalation, rusqlite::Error> {
    let status: EscalationStatus = enum_column(row, 4)?;
    Ok(Escalation {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        trigger_type: enum_column(row, 2)?,
        level: row.get(3)?,
        status,
        detail: row.get(5)?,
        created_at: datetime_column(row, 6)?,
        last_observed_at: datetime_column(row, 7)?,
        observation_count: row.get(8)?,
        acknowledged_at: opt_datetime_column(row, 9)?,
        resolution_type: row.get(10)?,
        action_taken: row.get(11)?,
        resolution_note: row.get(12)?,
        resolved_at: opt_datetime_column(row, 13)?,
    })
}
