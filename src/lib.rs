//! popreport -- scheduled world population report pipeline.
//!
//! This crate provides the orchestration core (scheduler controller,
//! pipeline orchestrator, execution history ledger), the default
//! fetch/clean/render collaborators, and the HTTP API that drives them.

pub mod api;
pub mod clock;
pub mod config;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::pipeline::extract::WikipediaExtractor;
use crate::pipeline::render::HtmlReportRenderer;
use crate::pipeline::transform::PopulationCleaner;
use crate::pipeline::PipelineOrchestrator;
use crate::scheduler::SchedulerController;
use crate::storage::ExecutionLedger;

/// Wire the default collaborators and the ledger into an orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> Result<PipelineOrchestrator> {
    let ledger = ExecutionLedger::open(&config.storage.history_path)
        .context("Failed to open execution history")?;
    let extractor = WikipediaExtractor::new(&config.source)?;

    Ok(PipelineOrchestrator::new(
        Arc::new(extractor),
        Arc::new(PopulationCleaner),
        Arc::new(HtmlReportRenderer::new(&config.storage.output_dir)),
        Arc::new(ledger),
    ))
}

/// Start the popreport daemon: API server and background scheduler.
pub async fn serve(config: AppConfig) -> Result<()> {
    config.validate()?;

    // 1. Initialize pipeline + history
    tracing::info!(history = %config.storage.history_path.display(), "Initializing pipeline");
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    // 2. Initialize and start the scheduler (background task)
    let controller = Arc::new(SchedulerController::from_config(orchestrator, &config.scheduler)?);
    controller.start()?;

    // 3. Start API server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind))?;
    let app = api::router(api::state::AppState::new(Arc::clone(&controller)));

    tracing::info!(%addr, "popreport listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 4. Drain the scheduler
    let timeout = Duration::from_secs(config.scheduler.stop_timeout_secs);
    if let Err(e) = controller.stop(timeout).await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
