use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ReportSchedule;
use crate::clock::Clock;
use crate::pipeline::{PipelineOrchestrator, RunError};

/// Everything the background loop needs, shared with the controller.
pub(crate) struct LoopContext {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub schedule: Arc<ReportSchedule>,
    pub clock: Arc<dyn Clock>,
    pub enabled: Arc<AtomicBool>,
    pub poll_interval: Duration,
}

/// Tracks the pending fire time between ticks.
///
/// While the gate is closed nothing is pending. When the gate opens, the next
/// fire time strictly after "now" becomes pending, so triggers that passed
/// while disabled are not replayed.
pub(crate) struct Trigger {
    schedule: Arc<ReportSchedule>,
    next_due: Option<DateTime<Utc>>,
}

impl Trigger {
    pub fn new(schedule: Arc<ReportSchedule>) -> Self {
        Self {
            schedule,
            next_due: None,
        }
    }

    /// Returns true when a run is due at `now`.
    pub fn poll(&mut self, now: DateTime<Utc>, enabled: bool) -> bool {
        if !enabled {
            self.next_due = None;
            return false;
        }

        match self.next_due {
            None => {
                self.next_due = self.schedule.next_after(&now);
                debug!(next_due = ?self.next_due, "Scheduled run armed");
                false
            }
            Some(due) if now >= due => {
                self.next_due = self.schedule.next_after(&now);
                true
            }
            Some(_) => false,
        }
    }

    #[cfg(test)]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.next_due
    }
}

/// Main scheduler loop.
///
/// Wakes every `poll_interval`, runs the pipeline inline when the trigger is
/// due and the gate is open, and exits at the first iteration boundary after
/// `cancel` fires. A run in progress is never interrupted. `exited` is
/// cancelled when the loop returns (or unwinds).
pub(crate) async fn run_scheduler_loop(
    ctx: LoopContext,
    cancel: CancellationToken,
    exited: CancellationToken,
) {
    let _exited = exited.drop_guard();
    info!(
        schedule = %ctx.schedule.expr(),
        poll_interval_ms = ctx.poll_interval.as_millis() as u64,
        "Scheduler engine started"
    );

    let mut ticker = tokio::time::interval(ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut trigger = Trigger::new(Arc::clone(&ctx.schedule));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = ctx.clock.now();
        if !trigger.poll(now, ctx.enabled.load(Ordering::Acquire)) {
            continue;
        }

        info!(%now, "Scheduled pipeline run due");
        match ctx.orchestrator.run().await {
            Ok(artifact) => info!(artifact = %artifact.display(), "Scheduled run finished"),
            Err(RunError::AlreadyRunning) => {
                warn!("Scheduled run skipped, a manual run is in progress")
            }
            Err(e) => error!(error = %e, "Scheduled run failed"),
        }
    }

    info!("Scheduler engine stopped");
}
