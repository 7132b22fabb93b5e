//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Layer stack (outermost → innermost):
//! 1. Trace → 2. CORS → 3. Cache-Control: no-store

use std::sync::Arc;

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router with all endpoints under `/api/`.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let patients = Router::new()
        .route("/register", post(endpoints::patients::register))
        .route("/:id/today", get(endpoints::patients::today))
        .route("/:id/care-plan", get(endpoints::patients::care_plan))
        .route("/:id/compliance", get(endpoints::patients::compliance))
        .route("/:id/reminders/recompile", post(endpoints::patients::recompile))
        .route("/:id/vitals", post(endpoints::vitals::log))
        .route("/:id/vitals/history", get(endpoints::vitals::history))
        .route("/:id/medications/ack", post(endpoints::medications::ack));

    let provider = Router::new()
        .route("/patients", get(endpoints::provider::roster))
        .route("/patients/:id", get(endpoints::provider::detail))
        .route(
            "/patients/:id/notes",
            get(endpoints::notes::list).post(endpoints::notes::add),
        )
        .route("/alerts", get(endpoints::alerts::queue))
        .route("/alerts/:id/ack", post(endpoints::alerts::acknowledge))
        .route("/alerts/:id/resolve", post(endpoints::alerts::resolve));

    let cron = Router::new()
        .route("/escalation-sweep", post(endpoints::cron::escalation_sweep))
        .route("/due-reminders", get(endpoints::cron::due_reminders));

    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .nest("/patients", patients)
        .nest("/provider", provider)
        .nest("/cron", cron)
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    // Layers apply bottom (innermost) to top (outermost).
    Router::new()
        .nest("/api", api)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
