//! Care-team patient endpoints:
//! - `GET /api/provider/patients` — roster sorted by urgency
//! - `GET /api/provider/patients/:id` — drill-down

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::views::{self, PatientDetail, RosterEntry, DEFAULT_HISTORY_DAYS};

#[derive(Serialize)]
pub struct RosterResponse {
    pub date: NaiveDate,
    pub total: usize,
    pub patients: Vec<RosterEntry>,
}

/// `GET /api/provider/patients`
pub async fn roster(State(ctx): State<ApiContext>) -> Result<Json<RosterResponse>, ApiError> {
    let today = ctx.today();
    let conn = ctx.open_db()?;
    let patients = views::roster(&conn, today)?;
    Ok(Json(RosterResponse {
        date: today,
        total: patients.len(),
        patients,
    }))
}

#[derive(Deserialize)]
pub struct DetailQuery {
    pub days: Option<i64>,
}

/// `GET /api/provider/patients/:id?days=` — compliance history over `days` (default 7).
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    query: Result<Query<DetailQuery>, QueryRejection>,
) -> Result<Json<PatientDetail>, ApiError> {
    let Query(query) = query?;
    let patient_id = parse_id("patient", &id)?;
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let conn = ctx.open_db()?;
    Ok(Json(views::patient_detail(&conn, &patient_id, ctx.today(), days)?))
}
