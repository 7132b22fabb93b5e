//! Vital endpoints:
//! - `POST /api/patients/:id/vitals` — log a reading, run per-event checks
//! - `GET /api/patients/:id/vitals/history` — latest reading per day

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::{parse_date, parse_id, ApiContext};
use crate::escalation::EventOutcome;
use crate::ledger;
use crate::models::{VitalKind, VitalLog};
use crate::views::{self, VitalsHistory, DEFAULT_HISTORY_DAYS};

fn parse_kind(raw: &str) -> Result<VitalKind, ApiError> {
    VitalKind::from_str(raw.trim()).map_err(|_| {
        ApiError::BadRequest(format!("Unknown vital type '{raw}' (expected weight, bp or symptom_check)"))
    })
}

#[derive(Deserialize)]
pub struct VitalRequest {
    #[serde(rename = "type")]
    pub vital_type: String,
    #[serde(default)]
    pub value: Value,
    /// Day the reading belongs to; defaults to today.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct VitalLoggedResponse {
    pub vital: VitalLog,
    pub escalations: EventOutcome,
}

/// `POST /api/patients/:id/vitals` — `{type, value, date?}`
pub async fn log(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<VitalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VitalLoggedResponse>), ApiError> {
    let Json(request) = payload?;
    let patient_id = parse_id("patient", &id)?;
    let kind = parse_kind(&request.vital_type)?;
    let value = ledger::parse_vital_value(kind, &request.value)?;

    let now = ctx.now();
    let date = parse_date("date", request.date.as_deref())?.unwrap_or_else(|| now.date());
    if date > now.date() {
        return Err(ApiError::BadRequest(format!("Cannot log a vital for a future date ({date})")));
    }

    let conn = ctx.open_db()?;
    let vital = ledger::log_vital(&conn, &patient_id, date, value, now)?;
    let escalations = ctx.core.engine(&conn).on_vital_logged(&vital, now)?;

    Ok((StatusCode::CREATED, Json(VitalLoggedResponse { vital, escalations })))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub vital_type: Option<String>,
    pub days: Option<i64>,
}

/// `GET /api/patients/:id/vitals/history?vital_type=&days=`
pub async fn history(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<VitalsHistory>, ApiError> {
    let Query(query) = query?;
    let patient_id = parse_id("patient", &id)?;
    let kind = query
        .vital_type
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(parse_kind)
        .transpose()?;
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);

    let conn = ctx.open_db()?;
    Ok(Json(views::vitals_history(&conn, &patient_id, kind, ctx.today(), days)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vital_kinds_parse_from_wire_names() {
        assert_eq!(parse_kind("weight").unwrap(), VitalKind::Weight);
        assert_eq!(parse_kind(" bp ").unwrap(), VitalKind::BloodPressure);
        assert_eq!(parse_kind("symptom_check").unwrap(), VitalKind::SymptomCheck);
        assert!(parse_kind("glucose").is_err());
    }
}
