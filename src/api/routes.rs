//! API route definitions.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{AppError, AppResult};
use super::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_DRY_RUN_HOURS: u64 = 24;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/enable", post(scheduler_enable))
        .route("/scheduler/disable", post(scheduler_disable))
        .route("/scheduler/dry-run", get(scheduler_dry_run))
        .route("/reports/run", post(run_report))
        .route("/reports/generate", get(generate_report))
        .route("/history", get(history))
        .route("/history/latest", get(history_latest))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "scheduler": state.controller.status(),
            "last_execution": state.ledger.latest(),
        },
        "meta": meta()
    }))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.controller.status(), "meta": meta() }))
}

async fn scheduler_enable(State(state): State<AppState>) -> Json<Value> {
    state.controller.enable();
    Json(json!({
        "data": state.controller.status(),
        "meta": { "message": "scheduler enabled" }
    }))
}

async fn scheduler_disable(State(state): State<AppState>) -> Json<Value> {
    state.controller.disable();
    Json(json!({
        "data": state.controller.status(),
        "meta": { "message": "scheduler paused" }
    }))
}

#[derive(Debug, Deserialize)]
struct DryRunParams {
    hours: Option<u64>,
}

async fn scheduler_dry_run(
    State(state): State<AppState>,
    Query(params): Query<DryRunParams>,
) -> Json<Value> {
    let hours = params.hours.unwrap_or(DEFAULT_DRY_RUN_HOURS);
    let upcoming: Vec<String> = state
        .controller
        .preview(hours)
        .iter()
        .map(|t| t.to_rfc3339())
        .collect();
    Json(json!({
        "data": { "schedule": state.controller.schedule().expr(), "upcoming": upcoming },
        "meta": { "hours": hours, "total": upcoming.len() }
    }))
}

async fn run_report(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let artifact = state.controller.run_now().await?;
    Ok(Json(json!({
        "data": {
            "artifact": artifact.display().to_string(),
            "execution": state.ledger.latest(),
        },
        "meta": meta()
    })))
}

/// Run the pipeline and return the report itself as a download.
async fn generate_report(State(state): State<AppState>) -> AppResult<Response> {
    let artifact = state.controller.run_now().await?;
    let body = tokio::fs::read(&artifact)
        .await
        .map_err(|e| AppError::Internal(format!("failed to read {}: {}", artifact.display(), e)))?;
    let file_name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("population_report.html");

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn history(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> Json<Value> {
    let records = state.ledger.recent(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT));
    Json(json!({
        "data": records,
        "meta": { "total": state.ledger.len(), "returned": records.len() }
    }))
}

async fn history_latest(State(state): State<AppState>) -> Json<Value> {
    match state.ledger.latest() {
        Some(record) => Json(json!({ "data": record, "meta": meta() })),
        None => Json(json!({ "data": null, "meta": { "message": "no executions recorded yet" } })),
    }
}
