//! Medication endpoint:
//! - `POST /api/patients/:id/medications/ack` — taken/skipped acknowledgment

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{parse_date, parse_id, ApiContext};
use crate::escalation::EventOutcome;
use crate::ledger::{self, AckRequest};
use crate::models::MedicationAck;

#[derive(Deserialize)]
pub struct AckBody {
    #[serde(flatten)]
    pub ack: AckRequest,
    /// Day the dose belongs to; defaults to today.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub ack: MedicationAck,
    pub escalations: EventOutcome,
}

/// `POST /api/patients/:id/medications/ack` —
/// `{medication_name, scheduled_time, status, skip_reason?, date?}`
pub async fn ack(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<AckBody>, JsonRejection>,
) -> Result<(StatusCode, Json<AckResponse>), ApiError> {
    let Json(body) = payload?;
    let patient_id = parse_id("patient", &id)?;

    let now = ctx.now();
    let date = parse_date("date", body.date.as_deref())?.unwrap_or_else(|| now.date());
    if date > now.date() {
        return Err(ApiError::BadRequest(format!("Cannot acknowledge a dose for a future date ({date})")));
    }

    let conn = ctx.open_db()?;
    let ack = ledger::ack_medication(&conn, &patient_id, date, &body.ack, now)?;
    let escalations = ctx.core.engine(&conn).on_medication_acked(&ack, now)?;

    Ok((StatusCode::CREATED, Json(AckResponse { ack, escalations })))
}
