use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::NoteType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub note_type: NoteType,
    pub note: String,
    pub author: Option<String>,
    pub created_at: NaiveDateTime,
}
