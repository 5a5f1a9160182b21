//! Report pipeline: extract -> transform -> render.
//!
//! The [`PipelineOrchestrator`] sequences three collaborators behind the
//! [`Extractor`], [`Transformer`] and [`Renderer`] traits and records every
//! run in the execution ledger. The default collaborators live in
//! [`extract`], [`transform`] and [`render`].

pub mod dataset;
pub mod extract;
pub mod orchestrator;
pub mod render;
pub mod transform;

pub use self::dataset::{CountryRow, Dataset};
pub use self::orchestrator::PipelineOrchestrator;

use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

/// A raw extracted row: named fields, values as scraped.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// The three pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Transform,
    Render,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Extract => write!(f, "extract"),
            Stage::Transform => write!(f, "transform"),
            Stage::Render => write!(f, "render"),
        }
    }
}

/// A stage failure, carrying the stage that stopped the run.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {cause:#}")]
pub struct PipelineError {
    pub stage: Stage,
    pub cause: anyhow::Error,
}

impl PipelineError {
    pub fn new(stage: Stage, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

/// Why a call to [`PipelineOrchestrator::run`] did not produce an artifact.
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run holds the single-flight guard. Nothing was executed or recorded.
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("pipeline task was interrupted: {0}")]
    Interrupted(String),
}

impl RunError {
    /// The failing stage, when the run got far enough to have one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunError::Pipeline(e) => Some(e.stage),
            _ => None,
        }
    }
}

/// Fetches raw records from the data source.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self) -> Result<Vec<Record>>;
}

/// Cleans raw records into a typed dataset.
#[async_trait::async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, records: Vec<Record>) -> Result<Dataset>;
}

/// Renders a dataset into an artifact on disk and returns its path.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, dataset: &Dataset) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = PipelineError::new(Stage::Transform, anyhow::anyhow!("no valid rows"));
        let msg = err.to_string();
        assert!(msg.starts_with("transform stage failed"));
        assert!(msg.contains("no valid rows"));
    }

    #[test]
    fn test_run_error_stage() {
        let err = RunError::from(PipelineError::new(Stage::Render, anyhow::anyhow!("disk full")));
        assert_eq!(err.stage(), Some(Stage::Render));
        assert_eq!(RunError::AlreadyRunning.stage(), None);
    }
}
