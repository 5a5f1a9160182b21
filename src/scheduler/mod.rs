//! Scheduler controller: a pausable background loop that triggers the pipeline.
//!
//! The loop lifecycle (`start`/`stop`) and the gate (`enable`/`disable`) are
//! independent. Toggling the gate never starts or stops the loop, and a
//! stopped loop never reports a next run time.

pub mod cron;
mod engine;

pub use self::cron::ReportSchedule;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use self::engine::LoopContext;
use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::pipeline::{PipelineOrchestrator, RunError};

/// Default wake-up period of the background loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A previous loop was told to stop but has not exited yet.
    #[error("scheduler loop is still shutting down")]
    AlreadyRunning,

    #[error("scheduler loop did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("failed to start scheduler loop: {0}")]
    Setup(String),

    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub next_run_time: Option<DateTime<Utc>>,
    pub schedule: String,
}

struct Worker {
    cancel: CancellationToken,
    exited: CancellationToken,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.exited.is_cancelled()
    }
}

/// Owns the background loop and the enable/disable gate.
///
/// `start` is idempotent: calling it while the loop is alive does nothing.
/// It only fails with [`SchedulerError::AlreadyRunning`] when a previous
/// `stop` timed out and that loop has not exited yet.
pub struct SchedulerController {
    orchestrator: Arc<PipelineOrchestrator>,
    schedule: Arc<ReportSchedule>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    enabled: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl SchedulerController {
    /// A stopped, disabled controller polling every [`DEFAULT_POLL_INTERVAL`].
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, schedule: ReportSchedule) -> Self {
        Self {
            orchestrator,
            schedule: Arc::new(schedule),
            clock: Arc::new(SystemClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
            enabled: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(
        orchestrator: Arc<PipelineOrchestrator>,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let controller = Self::new(orchestrator, ReportSchedule::parse(&config.cron)?)
            .with_poll_interval(Duration::from_secs(config.poll_interval_secs));
        controller.enabled.store(config.enabled_on_start, Ordering::Release);
        Ok(controller)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    pub fn schedule(&self) -> &ReportSchedule {
        &self.schedule
    }

    /// Spawn the background loop on the current Tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut slot = self.lock_worker();

        if let Some(worker) = slot.as_ref() {
            if worker.is_alive() {
                if worker.cancel.is_cancelled() {
                    return Err(SchedulerError::AlreadyRunning);
                }
                debug!("Scheduler loop already running");
                return Ok(());
            }
        }

        if self.poll_interval.is_zero() {
            return Err(SchedulerError::Setup("poll interval must be non-zero".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Setup(e.to_string()))?;

        let cancel = CancellationToken::new();
        let exited = CancellationToken::new();
        let ctx = LoopContext {
            orchestrator: Arc::clone(&self.orchestrator),
            schedule: Arc::clone(&self.schedule),
            clock: Arc::clone(&self.clock),
            enabled: Arc::clone(&self.enabled),
            poll_interval: self.poll_interval,
        };
        runtime.spawn(engine::run_scheduler_loop(ctx, cancel.clone(), exited.clone()));
        *slot = Some(Worker { cancel, exited });

        info!(
            schedule = %self.schedule.expr(),
            enabled = self.is_enabled(),
            "Scheduler running in background"
        );
        Ok(())
    }

    /// Ask the loop to exit and wait up to `timeout` for it to do so.
    ///
    /// A pipeline run already in progress is allowed to finish. On timeout the
    /// loop keeps being reported as running until it actually exits.
    pub async fn stop(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let exited = {
            let slot = self.lock_worker();
            let Some(worker) = slot.as_ref() else {
                debug!("Scheduler loop not running, nothing to stop");
                return Ok(());
            };
            worker.cancel.cancel();
            worker.exited.clone()
        };

        info!("Stopping scheduler");
        if tokio::time::timeout(timeout, exited.cancelled()).await.is_err() {
            warn!(timeout_ms = timeout.as_millis() as u64, "Scheduler loop did not stop in time");
            return Err(SchedulerError::ShutdownTimeout(timeout));
        }

        let mut slot = self.lock_worker();
        if slot.as_ref().is_some_and(|w| !w.is_alive()) {
            *slot = None;
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Open the gate. Takes effect on the loop's next tick.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
        info!("Scheduler enabled");
    }

    /// Close the gate. Manual runs are unaffected.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        info!("Scheduler paused");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().as_ref().is_some_and(Worker::is_alive)
    }

    /// Snapshot of the controller state. Never waits on the loop.
    pub fn status(&self) -> SchedulerStatus {
        let enabled = self.is_enabled();
        let running = self.is_running();
        let next_run_time = if enabled && running {
            self.schedule.next_after(&self.clock.now())
        } else {
            None
        };
        SchedulerStatus {
            enabled,
            running,
            next_run_time,
            schedule: self.schedule.expr().to_string(),
        }
    }

    /// Upcoming fire times over the next `hours`, regardless of the gate.
    pub fn preview(&self, hours: u64) -> Vec<DateTime<Utc>> {
        self.schedule.preview(&self.clock.now(), hours)
    }

    /// Run the pipeline now, ignoring the gate.
    ///
    /// The run executes on its own task, so dropping the returned future does
    /// not abort a run that has already started.
    pub async fn run_now(&self) -> Result<PathBuf, RunError> {
        info!("Manual pipeline run requested");
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run().await })
            .await
            .map_err(|e| {
                error!(error = %e, "Manual pipeline task failed");
                RunError::Interrupted(e.to_string())
            })?
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
