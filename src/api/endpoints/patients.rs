//! Patient endpoints:
//! - `POST /api/patients/register` — register from an extraction record
//! - `GET /api/patients/:id/today` — today's obligations and status
//! - `GET /api/patients/:id/care-plan` — care plan, medications, rules in force
//! - `GET /api/patients/:id/compliance` — compliance record for a day
//! - `POST /api/patients/:id/reminders/recompile` — rebuild reminder rules

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_date, parse_id, ApiContext};
use crate::compliance::{self, ComplianceRecord};
use crate::db;
use crate::models::{CarePlan, MedicationPlan, ReminderRuleSet};
use crate::registration::{self, Registration, RegistrationRequest};
use crate::reminders::{self, RecompileOutcome};
use crate::views::{self, TodaySnapshot};

/// `POST /api/patients/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let Json(request) = payload?;
    let conn = ctx.open_db()?;
    let registration = registration::register_patient(&conn, &request, ctx.now())?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// `GET /api/patients/:id/today`
pub async fn today(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<TodaySnapshot>, ApiError> {
    let patient_id = parse_id("patient", &id)?;
    let conn = ctx.open_db()?;
    Ok(Json(views::today_snapshot(&conn, &patient_id, ctx.today())?))
}

#[derive(Serialize)]
pub struct CarePlanResponse {
    pub patient_id: Uuid,
    pub care_plan: CarePlan,
    pub medication_plan: MedicationPlan,
    pub rule_set: Option<ReminderRuleSet>,
}

/// `GET /api/patients/:id/care-plan`
pub async fn care_plan(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<CarePlanResponse>, ApiError> {
    let patient_id = parse_id("patient", &id)?;
    let conn = ctx.open_db()?;
    db::require_patient(&conn, &patient_id)?;

    Ok(Json(CarePlanResponse {
        patient_id,
        care_plan: db::require_care_plan(&conn, &patient_id)?,
        medication_plan: db::get_medication_plan(&conn, &patient_id)?,
        rule_set: db::rule_set_in_force(&conn, &patient_id, ctx.today())?,
    }))
}

#[derive(Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

/// `GET /api/patients/:id/compliance?date=YYYY-MM-DD` (defaults to today)
pub async fn compliance(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<ComplianceRecord>, ApiError> {
    let Query(query) = query?;
    let patient_id = parse_id("patient", &id)?;
    let date = parse_date("date", query.date.as_deref())?.unwrap_or_else(|| ctx.today());
    let conn = ctx.open_db()?;
    Ok(Json(compliance::compliance_for(&conn, &patient_id, date)?))
}

#[derive(Deserialize)]
pub struct RecompileQuery {
    pub effective_from: Option<String>,
}

/// `POST /api/patients/:id/reminders/recompile?effective_from=YYYY-MM-DD`
pub async fn recompile(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    query: Result<Query<RecompileQuery>, QueryRejection>,
) -> Result<Json<RecompileOutcome>, ApiError> {
    let Query(query) = query?;
    let patient_id = parse_id("patient", &id)?;
    let now = ctx.now();
    let effective_from = parse_date("effective_from", query.effective_from.as_deref())?
        .unwrap_or_else(|| now.date());
    let conn = ctx.open_db()?;
    Ok(Json(reminders::recompile(&conn, &patient_id, effective_from, now)?))
}
