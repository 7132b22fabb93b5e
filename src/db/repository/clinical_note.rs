use rusqlite::{params, Connection};
use uuid::Uuid;

use super::*;
use crate::db::DatabaseError;
use crate::models::ClinicalNote;

pub fn insert_clinical_note(conn: &Connection, note: &ClinicalNote) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO clinical_notes (id, patient_id, note_type, note, author, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            note.id.to_string(),
            note.patient_id.to_string(),
            note.note_type.as_str(),
            note.note,
            note.author,
            fmt_datetime(&note.created_at),
        ],
    )?;
    Ok(())
}

/// Notes for a patient, newest first.
pub fn list_clinical_notes(conn: &Connection, patient_id: &Uuid) -> Result<Vec<ClinicalNote>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, note_type, note, author, created_at
         FROM clinical_notes WHERE patient_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(ClinicalNote {
            id: uuid_column(row, 0)?,
            patient_id: uuid_column(row, 1)?,
            note_type: enum_column(row, 2)?,
            note: row.get(3)?,
            author: row.get(4)?,
            created_at: datetime_column(row, 5)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}
