use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::error::Result;

/// Episode ids recorded in the ledger file at `path`; empty if it doesn't exist
pub async fn read_ledger(path: &Path) -> Result<HashSet<String>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Append `id` as one line and sync it to disk before returning
pub async fn append_to_ledger(path: &Path, id: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{id}\n").as_bytes()).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// The ledger replayed into memory, appended to as downloads complete.
///
/// Single writer only; the file is never rewritten.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    recorded: HashSet<String>,
}

impl Ledger {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let recorded = read_ledger(&path).await?;
        debug!(path = %path.display(), entries = recorded.len(), "ledger loaded");
        Ok(Self { path, recorded })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.recorded.contains(id)
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably record `id`. Ids already present are not written again.
    pub async fn record(&mut self, id: &str) -> Result<()> {
        if self.recorded.contains(id) {
            return Ok(());
        }
        append_to_ledger(&self.path, id).await?;
        self.recorded.insert(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn missing_ledger_reads_empty() {
        let dir = TempDir::new().unwrap();
        let ids = read_ledger(&dir.path().join("downloaded.log")).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.log");

        append_to_ledger(&path, "e1").await.unwrap();
        append_to_ledger(&path, "e1").await.unwrap();
        append_to_ledger(&path, "e2").await.unwrap();

        let ids = read_ledger(&path).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("e1") && ids.contains("e2"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "e1\ne1\ne2\n");
    }

    #[tokio::test]
    async fn blank_lines_and_padding_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.log");
        std::fs::write(&path, "  e1 \n\n\r\ne2\r\n").unwrap();

        let ids = read_ledger(&path).await.unwrap();
        assert_eq!(ids, HashSet::from(["e1".to_string(), "e2".to_string()]));
    }

    #[tokio::test]
    async fn ledger_records_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("downloaded.log");

        let mut ledger = Ledger::open(&path).await.unwrap();
        assert!(ledger.is_empty());
        ledger.record("e1").await.unwrap();
        ledger.record("e1").await.unwrap();

        assert!(ledger.contains("e1"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "e1\n");

        let reopened = Ledger::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
