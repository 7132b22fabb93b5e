//! Scheduler hooks:
//! - `POST /api/cron/escalation-sweep` — run the missed-action sweep now
//! - `GET /api/cron/due-reminders?window_minutes=` — obligations coming due

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::escalation::SweepCounts;
use crate::models::DueReminder;
use crate::reminders;

pub const DEFAULT_DUE_WINDOW_MINUTES: i64 = 5;
pub const MAX_DUE_WINDOW_MINUTES: i64 = 12 * 60;

#[derive(Serialize)]
pub struct SweepResponse {
    pub as_of: NaiveDateTime,
    #[serde(flatten)]
    pub counts: SweepCounts,
}

/// `POST /api/cron/escalation-sweep` — same entry point as the background thread.
pub async fn escalation_sweep(State(ctx): State<ApiContext>) -> Result<Json<SweepResponse>, ApiError> {
    let as_of = ctx.now();
    let conn = ctx.open_db()?;
    tracing::debug!(%as_of, "Escalation sweep requested");
    let counts = ctx.core.engine(&conn).sweep(as_of)?;
    Ok(Json(SweepResponse { as_of, counts }))
}

#[derive(Deserialize)]
pub struct DueQuery {
    pub window_minutes: Option<i64>,
}

#[derive(Serialize)]
pub struct DueRemindersResponse {
    pub as_of: NaiveDateTime,
    pub window_minutes: i64,
    pub reminders: Vec<DueReminder>,
}

/// `GET /api/cron/due-reminders?window_minutes=` — unfulfilled obligations
/// scheduled within the window either side of now.
pub async fn due_reminders(
    State(ctx): State<ApiContext>,
    query: Result<Query<DueQuery>, QueryRejection>,
) -> Result<Json<DueRemindersResponse>, ApiError> {
    let Query(query) = query?;
    let window_minutes = query.window_minutes.unwrap_or(DEFAULT_DUE_WINDOW_MINUTES);
    if !(0..=MAX_DUE_WINDOW_MINUTES).contains(&window_minutes) {
        return Err(ApiError::BadRequest(format!(
            "window_minutes must be between 0 and {MAX_DUE_WINDOW_MINUTES}"
        )));
    }

    let as_of = ctx.now();
    let conn = ctx.open_db()?;
    let reminders =
        reminders::due_reminders(&conn, as_of, chrono::Duration::minutes(window_minutes))?;
    Ok(Json(DueRemindersResponse {
        as_of,
        window_minutes,
        reminders,
    }))
}
