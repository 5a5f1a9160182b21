//! Execution history ledger: a bounded, durable record of pipeline runs.
//!
//! The ledger keeps the most recent [`MAX_RECORDS`] executions in memory and
//! mirrors them to a single JSON document that is rewritten on every append.
//! Persistence is best-effort: when the write fails, the record stays visible
//! through [`ExecutionLedger::latest`] and [`ExecutionLedger::all`] for the
//! lifetime of the process and the error is handed back to the caller.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on retained records; the oldest entry is evicted first.
pub const MAX_RECORDS: usize = 100;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read execution history {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize execution history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to persist execution history to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a single pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
        })
    }
}

/// One entry of the ledger. `error_message` is set iff the run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    pub fn success(timestamp: DateTime<Utc>, duration_seconds: f64) -> Self {
        Self {
            timestamp,
            status: RunStatus::Success,
            duration_seconds,
            error_message: None,
        }
    }

    pub fn failure(
        timestamp: DateTime<Utc>,
        duration_seconds: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            status: RunStatus::Failure,
            duration_seconds,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Bounded, append-only execution history backed by a JSON file.
pub struct ExecutionLedger {
    path: PathBuf,
    records: Mutex<VecDeque<ExecutionRecord>>,
    // Serializes the read-append-truncate-write cycle so concurrent appends
    // reach the file in the same order they reach memory.
    writer: tokio::sync::Mutex<()>,
}

impl ExecutionLedger {
    /// Open the ledger at `path`, loading any previously persisted history.
    ///
    /// A missing file yields an empty ledger. A file that is not valid JSON
    /// is renamed to `<name>.corrupt-<timestamp>` and the ledger starts empty;
    /// if that rename fails, opening fails rather than risk overwriting it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let records = load(&path)?;
        info!(path = %path.display(), records = records.len(), "Execution history loaded");
        Ok(Self {
            path,
            records: Mutex::new(records),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, evict beyond [`MAX_RECORDS`], and rewrite the file.
    ///
    /// The record is visible in memory before the write is attempted; an
    /// `Err` means only that the durable copy is stale.
    pub async fn append(&self, record: ExecutionRecord) -> Result<(), LedgerError> {
        let _writer = self.writer.lock().await;

        let snapshot: Vec<ExecutionRecord> = {
            let mut records = self.lock_records();
            records.push_back(record);
            while records.len() > MAX_RECORDS {
                records.pop_front();
            }
            records.iter().cloned().collect()
        };

        let payload = serde_json::to_vec_pretty(&snapshot)?;
        super::write_atomically(&self.path, &payload)
            .await
            .map_err(|source| LedgerError::Persist {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), records = snapshot.len(), "Execution history persisted");
        Ok(())
    }

    /// The most recent record, if any run has been recorded.
    pub fn latest(&self) -> Option<ExecutionRecord> {
        self.lock_records().back().cloned()
    }

    /// A snapshot of the full history, oldest first.
    pub fn all(&self) -> Vec<ExecutionRecord> {
        self.lock_records().iter().cloned().collect()
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.lock_records().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    fn lock_records(&self) -> MutexGuard<'_, VecDeque<ExecutionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load(path: &Path) -> Result<VecDeque<ExecutionRecord>, LedgerError> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }

    let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records: VecDeque<ExecutionRecord> = match serde_json::from_str::<Vec<_>>(&content) {
        Ok(list) => list.into(),
        Err(e) => {
            let backup = quarantine(path)?;
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %e,
                "Execution history is unreadable, moved aside and starting empty"
            );
            return Ok(VecDeque::new());
        }
    };

    while records.len() > MAX_RECORDS {
        records.pop_front();
    }
    Ok(records)
}

/// Rename an unreadable history file to `<name>.corrupt-<timestamp>` so the
/// next append cannot overwrite it.
fn quarantine(path: &Path) -> Result<PathBuf, LedgerError> {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
    let backup = PathBuf::from(name);
    std::fs::rename(path, &backup).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(backup)
}
