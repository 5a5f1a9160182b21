//! File-backed storage -- execution history and atomic document writes.

pub mod history;

pub use self::history::{ExecutionLedger, ExecutionRecord, LedgerError, RunStatus, MAX_RECORDS};

use std::path::Path;

/// Replace the file at `path` with `contents`.
///
/// Writes a sibling temp file first and renames it over the target so a
/// crash mid-write never leaves a truncated document behind.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp_name);

    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomically_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("doc.json");

        write_atomically(&path, b"first").await.unwrap();
        write_atomically(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("a").join("b").join("doc.json.tmp").exists());
    }
}
