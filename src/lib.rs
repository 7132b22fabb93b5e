pub mod api; // HTTP API: patient, care-team and cron routes
pub mod careplan; // Extraction record → 90-day care plan
pub mod compliance;
pub mod config;
pub mod core_state; // Shared service state
pub mod db;
pub mod error;
pub mod escalation; // Detection, de-duplication, alert lifecycle
pub mod ledger; // Append-only vitals and medication acks
pub mod models;
pub mod notes;
pub mod registration;
pub mod reminders; // Rule compilation and due reminders
pub mod sweep; // Background missed-action sweep
pub mod views; // Care-team aggregates

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::core_state::{CoreError, CoreState};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Cannot start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("{0}")]
    Server(String),
}

pub fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let service_config = config::ServiceConfig::from_env();
    tracing::info!(
        db = %service_config.db_path.display(),
        bind = %service_config.bind_addr,
        utc_offset = %service_config.utc_offset,
        sweep_interval_secs = service_config.sweep_interval.as_secs(),
        "Configuration loaded"
    );

    let core = Arc::new(CoreState::new(service_config));
    core.initialize()?;

    let sweep_handle = sweep::start_sweep_scheduler(core.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut server = api::start_api_server(core.clone(), core.config.bind_addr)
            .await
            .map_err(StartupError::Server)?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for shutdown signal: {e}");
        }
        server.shutdown();
        server.stopped().await;
        Ok::<(), StartupError>(())
    })?;

    // Stops and joins the scheduler thread.
    drop(sweep_handle);
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
