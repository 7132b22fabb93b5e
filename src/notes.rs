//! Free-text clinical notes written by the care team against a patient.

use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db;
use crate::error::EngineError;
use crate::models::{ClinicalNote, NoteType};

pub const MAX_NOTE_LEN: usize = 5000;
pub const MAX_AUTHOR_LEN: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct NoteRequest {
    pub note: String,
    #[serde(default = "default_note_type")]
    pub note_type: String,
    #[serde(default)]
    pub author: Option<String>,
}

fn default_note_type() -> String {
    NoteType::General.as_str().to_string()
}

pub fn parse_note_type(raw: &str) -> Result<NoteType, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("note_type", "must not be empty"));
    }
    NoteType::from_str(trimmed).map_err(|_| {
        EngineError::validation(
            "note_type",
            format!("'{trimmed}' is not one of general, call, medication_change, escalation_followup"),
        )
    })
}

pub fn add_note(
    conn: &Connection,
    patient_id: &Uuid,
    request: &NoteRequest,
    at: NaiveDateTime,
) -> Result<ClinicalNote, EngineError> {
    let note_type = parse_note_type(&request.note_type)?;
    let text = request.note.trim();
    if text.is_empty() {
        return Err(EngineError::validation("note", "must not be empty"));
    }
    if text.len() > MAX_NOTE_LEN {
        return Err(EngineError::validation("note", format!("longer than {MAX_NOTE_LEN} bytes")));
    }
    let author = request
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    if author.is_some_and(|a| a.len() > MAX_AUTHOR_LEN) {
        return Err(EngineError::validation("author", "too long"));
    }
    db::require_patient(conn, patient_id)?;

    let note = ClinicalNote {
        id: Uuid::new_v4(),
        patient_id: *patient_id,
        note_type,
        note: text.to_string(),
        author: author.map(str::to_string),
        created_at: at,
    };
    db::insert_clinical_note(conn, &note)?;
    tracing::info!(%patient_id, note_id = %note.id, note_type = %note.note_type, "Clinical note added");
    Ok(note)
}

/// Notes for a patient, newest first.
pub fn list_notes(conn: &Connection, patient_id: &Uuid) -> Result<Vec<ClinicalNote>, EngineError> {
    db::require_patient(conn, patient_id)?;
    Ok(db::list_clinical_notes(conn, patient_id)?)
}
