//! Clinical note endpoints:
//! - `POST /api/provider/patients/:id/notes`
//! - `GET /api/provider/patients/:id/notes` — newest first

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::models::ClinicalNote;
use crate::notes::{self, NoteRequest};

/// `POST /api/provider/patients/:id/notes` — `{note, note_type, author?}`
pub async fn add(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ClinicalNote>), ApiError> {
    let Json(request) = payload?;
    let patient_id = parse_id("patient", &id)?;
    let conn = ctx.open_db()?;
    let note = notes::add_note(&conn, &patient_id, &request, ctx.now())?;
    Ok((StatusCode::CREATED, Json(note)))
}

#[derive(Serialize)]
pub struct NotesResponse {
    pub notes: Vec<ClinicalNote>,
}

/// `GET /api/provider/patients/:id/notes`
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<NotesResponse>, ApiError> {
    let patient_id = parse_id("patient", &id)?;
    let conn = ctx.open_db()?;
    Ok(Json(NotesResponse {
        notes: notes::list_notes(&conn, &patient_id)?,
    }))
}
