//! Care-team alert endpoints:
//! - `GET /api/provider/alerts` — open and acknowledged escalations
//! - `POST /api/provider/alerts/:id/ack` — acknowledge
//! - `POST /api/provider/alerts/:id/resolve` — resolve with an outcome

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::models::{Escalation, Resolution};
use crate::views::{self, AlertQueueEntry};

#[derive(Serialize)]
pub struct AlertQueueResponse {
    pub total: usize,
    pub alerts: Vec<AlertQueueEntry>,
}

/// `GET /api/provider/alerts` — highest level first, then most recent.
pub async fn queue(State(ctx): State<ApiContext>) -> Result<Json<AlertQueueResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let alerts = views::alert_queue(&conn)?;
    Ok(Json(AlertQueueResponse {
        total: alerts.len(),
        alerts,
    }))
}

/// `POST /api/provider/alerts/:id/ack`
pub async fn acknowledge(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<Escalation>, ApiError> {
    let escalation_id = parse_id("escalation", &id)?;
    let conn = ctx.open_db()?;
    Ok(Json(ctx.core.engine(&conn).acknowledge(&escalation_id, ctx.now())?))
}

/// `POST /api/provider/alerts/:id/resolve` — `{resolution_type, action_taken?, note?}`
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<Resolution>, JsonRejection>,
) -> Result<Json<Escalation>, ApiError> {
    let Json(resolution) = payload?;
    let escalation_id = parse_id("escalation", &id)?;
    let conn = ctx.open_db()?;
    Ok(Json(ctx.core.engine(&conn).resolve(&escalation_id, resolution, ctx.now())?))
}
