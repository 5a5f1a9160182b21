//! Shared stub collaborators and helpers for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use popreport::clock::ManualClock;
use popreport::pipeline::{
    CountryRow, Dataset, Extractor, PipelineOrchestrator, Record, Renderer, Transformer,
};
use popreport::scheduler::{ReportSchedule, SchedulerController};
use popreport::storage::ExecutionLedger;
use tempfile::TempDir;

/// How a stub stage behaves when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Ok,
    /// Extractor: no records. Transformer: empty dataset. Renderer: path that does not exist.
    Empty,
    Fail,
    Panic,
}

pub struct StubExtractor {
    calls: AtomicUsize,
    behavior: Behavior,
    delay: Duration,
}

impl StubExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self) -> Result<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            Behavior::Ok => {
                let mut record = Record::new();
                record.insert("country".into(), "Testland".into());
                record.insert("population_2024".into(), "1,000".into());
                Ok(vec![record])
            }
            Behavior::Empty => Ok(Vec::new()),
            Behavior::Fail => Err(anyhow!("source unreachable")),
            Behavior::Panic => panic!("extractor exploded"),
        }
    }
}

pub struct StubTransformer {
    calls: AtomicUsize,
    behavior: Behavior,
}

impl StubTransformer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transformer for StubTransformer {
    async fn transform(&self, _records: Vec<Record>) -> Result<Dataset> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Ok => Ok(Dataset::new(vec![CountryRow {
                country: "Testland".to_string(),
                continent: "Europe".to_string(),
                region: "Nowhere".to_string(),
                population_2023: Some(990),
                population_2024: 1000,
                change_percent: Some(1.0),
            }])),
            Behavior::Empty => Ok(Dataset::default()),
            Behavior::Fail => Err(anyhow!("malformed rows")),
            Behavior::Panic => panic!("transformer exploded"),
        }
    }
}

pub struct StubRenderer {
    calls: AtomicUsize,
    behavior: Behavior,
    dir: PathBuf,
}

impl StubRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, dataset: &Dataset) -> Result<PathBuf> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("report-{n}.html"));
        match self.behavior {
            Behavior::Ok => {
                tokio::fs::write(&path, format!("<html>report of {} rows</html>", dataset.len()))
                    .await?;
                Ok(path)
            }
            Behavior::Empty => Ok(path),
            Behavior::Fail => Err(anyhow!("template missing")),
            Behavior::Panic => panic!("renderer exploded"),
        }
    }
}

/// An orchestrator wired to stubs, with its ledger and output in a temp dir.
pub struct Harness {
    pub extractor: Arc<StubExtractor>,
    pub transformer: Arc<StubTransformer>,
    pub renderer: Arc<StubRenderer>,
    pub ledger: Arc<ExecutionLedger>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

pub struct HarnessBuilder {
    extract: Behavior,
    transform: Behavior,
    render: Behavior,
    extract_delay: Duration,
    history_path: Option<PathBuf>,
}

impl HarnessBuilder {
    pub fn extract(mut self, behavior: Behavior) -> Self {
        self.extract = behavior;
        self
    }

    pub fn transform(mut self, behavior: Behavior) -> Self {
        self.transform = behavior;
        self
    }

    pub fn render(mut self, behavior: Behavior) -> Self {
        self.render = behavior;
        self
    }

    pub fn slow_extract(mut self, delay: Duration) -> Self {
        self.extract_delay = delay;
        self
    }

    pub fn history_path(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));

        let extractor = Arc::new(StubExtractor {
            calls: AtomicUsize::new(0),
            behavior: self.extract,
            delay: self.extract_delay,
        });
        let transformer = Arc::new(StubTransformer {
            calls: AtomicUsize::new(0),
            behavior: self.transform,
        });
        let renderer = Arc::new(StubRenderer {
            calls: AtomicUsize::new(0),
            behavior: self.render,
            dir: dir.path().to_path_buf(),
        });

        let history_path = self
            .history_path
            .unwrap_or_else(|| dir.path().join("history.json"));
        let ledger = Arc::new(ExecutionLedger::open(history_path).unwrap());

        let orchestrator = Arc::new(
            PipelineOrchestrator::new(
                extractor.clone(),
                transformer.clone(),
                renderer.clone(),
                ledger.clone(),
            )
            .with_clock(clock.clone()),
        );

        Harness {
            extractor,
            transformer,
            renderer,
            ledger,
            orchestrator,
            clock,
            dir,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        extract: Behavior::Ok,
        transform: Behavior::Ok,
        render: Behavior::Ok,
        extract_delay: Duration::ZERO,
        history_path: None,
    }
}

/// 2024-01-01T07:00:00Z, one hour before the daily 08:00 trigger.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap()
}

pub const POLL: Duration = Duration::from_millis(10);

/// Long enough for the loop to observe a change on its next tick.
pub const SETTLE: Duration = Duration::from_millis(100);

/// A stopped, disabled controller over `h`'s orchestrator, ticking every [`POLL`].
pub fn controller(h: &Harness) -> SchedulerController {
    SchedulerController::new(
        h.orchestrator.clone(),
        ReportSchedule::parse("0 0 8 * * *").unwrap(),
    )
    .with_clock(h.clock.clone())
    .with_poll_interval(POLL)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
