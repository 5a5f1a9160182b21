//! Pipeline orchestration with single-flight runs and one ledger record per run.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn, Instrument};

use super::{Extractor, PipelineError, Renderer, RunError, Stage, Transformer};
use crate::clock::{Clock, SystemClock};
use crate::storage::{ExecutionLedger, ExecutionRecord};

/// Runs extract -> transform -> render and records the outcome.
///
/// Single-flight policy: **fail fast**. While one run is in flight, any other
/// call to [`run`](Self::run), from the scheduler or a manual trigger, returns
/// [`RunError::AlreadyRunning`] immediately without touching the ledger.
pub struct PipelineOrchestrator {
    extractor: Arc<dyn Extractor>,
    transformer: Arc<dyn Transformer>,
    renderer: Arc<dyn Renderer>,
    ledger: Arc<ExecutionLedger>,
    clock: Arc<dyn Clock>,
    in_flight: Arc<Mutex<()>>,
}

impl PipelineOrchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transformer: Arc<dyn Transformer>,
        renderer: Arc<dyn Renderer>,
        ledger: Arc<ExecutionLedger>,
    ) -> Self {
        Self {
            extractor,
            transformer,
            renderer,
            ledger,
            clock: Arc::new(SystemClock),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Use `clock` for execution timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        &self.ledger
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Execute one full pipeline run and return the rendered artifact path.
    ///
    /// Exactly one [`ExecutionRecord`] is appended for every run that acquires
    /// the single-flight guard, whether it succeeds, fails at a stage, panics
    /// inside a collaborator, or is dropped part-way through.
    pub async fn run(&self) -> Result<PathBuf, RunError> {
        let permit = Arc::clone(&self.in_flight)
            .try_lock_owned()
            .map_err(|_| RunError::AlreadyRunning)?;

        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", %run_id);

        async move {
            let guard = RunGuard::begin(permit, Arc::clone(&self.ledger), self.clock.now());
            info!("Pipeline run started");

            let outcome = self.execute().await;

            let record = guard.record_for(&outcome);
            match &outcome {
                Ok(artifact) => {
                    info!(artifact = %artifact.display(), duration_secs = record.duration_seconds, "Pipeline run succeeded")
                }
                Err(e) => {
                    error!(stage = %e.stage, error = %e, duration_secs = record.duration_seconds, "Pipeline run failed")
                }
            }
            guard.finish(record).await;

            outcome.map_err(RunError::from)
        }
        .instrument(span)
        .await
    }

    async fn execute(&self) -> Result<PathBuf, PipelineError> {
        let records = run_stage(Stage::Extract, self.extractor.extract()).await?;
        if records.is_empty() {
            return Err(PipelineError::new(
                Stage::Extract,
                anyhow!("extractor returned no records"),
            ));
        }
        info!(records = records.len(), "Extraction finished");

        let dataset = run_stage(Stage::Transform, self.transformer.transform(records)).await?;
        if dataset.is_empty() {
            return Err(PipelineError::new(
                Stage::Transform,
                anyhow!("no valid rows left after cleaning"),
            ));
        }
        info!(rows = dataset.len(), "Transformation finished");

        let artifact = run_stage(Stage::Render, self.renderer.render(&dataset)).await?;
        verify_artifact(&artifact)
            .await
            .map_err(|e| PipelineError::new(Stage::Render, e))?;
        info!(artifact = %artifact.display(), "Rendering finished");

        Ok(artifact)
    }
}

/// Await one collaborator call, attributing errors and panics to `stage`.
async fn run_stage<T, F>(stage: Stage, call: F) -> Result<T, PipelineError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    debug!(%stage, "Stage started");
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PipelineError::new(stage, e)),
        Err(panic) => Err(PipelineError::new(
            stage,
            anyhow!("collaborator panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// The artifact must exist as a non-empty regular file.
async fn verify_artifact(path: &Path) -> anyhow::Result<()> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("artifact {} was not created", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("artifact {} is not a regular file", path.display());
    }
    if meta.len() == 0 {
        anyhow::bail!("artifact {} is empty", path.display());
    }
    Ok(())
}

/// Holds the single-flight permit for one run and owns its ledger record.
///
/// `finish` hands the record and the permit to a detached task, so the
/// append completes even if the caller stops polling. Dropping the guard
/// without finishing records the run as cancelled.
struct RunGuard {
    permit: Option<OwnedMutexGuard<()>>,
    ledger: Arc<ExecutionLedger>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RunGuard {
    fn begin(permit: OwnedMutexGuard<()>, ledger: Arc<ExecutionLedger>, started_at: DateTime<Utc>) -> Self {
        Self {
            permit: Some(permit),
            ledger,
            started_at,
            started: Instant::now(),
        }
    }

    fn record_for(&self, outcome: &Result<PathBuf, PipelineError>) -> ExecutionRecord {
        let elapsed = self.started.elapsed().as_secs_f64();
        match outcome {
            Ok(_) => ExecutionRecord::success(self.started_at, elapsed),
            Err(e) => ExecutionRecord::failure(self.started_at, elapsed, e.to_string()),
        }
    }

    async fn finish(mut self, record: ExecutionRecord) {
        let permit = self.permit.take();
        let ledger = Arc::clone(&self.ledger);
        let append = tokio::spawn(async move {
            append_record(&ledger, record).await;
            drop(permit);
        });
        if let Err(e) = append.await {
            error!(error = %e, "Execution record task failed");
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };

        let record = ExecutionRecord::failure(
            self.started_at,
            self.started.elapsed().as_secs_f64(),
            "pipeline run cancelled before completion",
        );
        let ledger = Arc::clone(&self.ledger);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Pipeline run dropped before completion, recording failure");
                handle.spawn(async move {
                    append_record(&ledger, record).await;
                    drop(permit);
                });
            }
            Err(_) => error!("Pipeline run dropped outside a runtime, execution record lost"),
        }
    }
}

async fn append_record(ledger: &ExecutionLedger, record: ExecutionRecord) {
    if let Err(e) = ledger.append(record).await {
        warn!(error = %e, "Execution record kept in memory but not persisted");
    }
}
