//! History collaborators fed by the switch and thermostat adapters.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Seconds since the Unix epoch.
    pub time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl HistoryEntry {
    pub fn status(on: bool) -> Self {
        Self {
            time: now_secs(),
            status: Some(u8::from(on)),
            ..Default::default()
        }
    }

    pub fn temperature(temp: f64) -> Self {
        Self {
            time: now_secs(),
            temp: Some(temp),
            ..Default::default()
        }
    }

    pub fn humidity(humidity: f64) -> Self {
        Self {
            time: now_secs(),
            humidity: Some(humidity),
            ..Default::default()
        }
    }
}

pub trait HistoryLog: Send + Sync {
    fn add_entry(&self, entry: HistoryEntry);
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }
}

impl HistoryLog for MemoryHistory {
    fn add_entry(&self, entry: HistoryEntry) {
        self.entries.lock().push(entry);
    }
}

/// Appends entries as JSON lines to `<dir>/<device_id>_history.jsonl`.
///
/// Entries are handed to a writer task, so adding one never blocks the
/// adapter on file I/O.
#[derive(Debug)]
pub struct FileHistory {
    path: PathBuf,
    sender: UnboundedSender<HistoryEntry>,
}

impl FileHistory {
    /// Opens the file and spawns its writer task on the current runtime.
    pub async fn open(dir: impl AsRef<Path>, device_id: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir.as_ref()).await?;
        let path = dir.as_ref().join(format!("{device_id}_history.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (sender, receiver) = unbounded_channel();
        tokio::spawn(write_entries(file, path.clone(), receiver));
        Ok(Self { path, sender })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryLog for FileHistory {
    fn add_entry(&self, entry: HistoryEntry) {
        if self.sender.send(entry).is_err() {
            warn!("History writer for {} has stopped", self.path.display());
        }
    }
}

async fn write_entries(
    mut file: File,
    path: PathBuf,
    mut receiver: UnboundedReceiver<HistoryEntry>,
) {
    while let Some(entry) = receiver.recv().await {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Cannot encode history entry: {e}");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = file.write_all(&line).await {
            warn!("Cannot write history entry to {}: {e}", path.display());
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!("Cannot flush {}: {e}", path.display());
        }
    }
    debug!("History writer for {} finished", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_skips_empty_fields() {
        let entry = HistoryEntry {
            time: 1_700_000_000,
            status: Some(1),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"time":1700000000,"status":1}"#
        );
    }

    async fn read_entries(path: &Path, expected: usize) -> Vec<HistoryEntry> {
        let mut entries = vec![];
        for _ in 0..100 {
            let content = tokio::fs::read_to_string(path).await.unwrap_or_default();
            entries = content
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            if entries.len() >= expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        entries
    }

    #[tokio::test]
    async fn test_file_history_appends_lines() {
        let dir = TempDir::new().unwrap();
        let history = FileHistory::open(dir.path().join("history"), "1000abcd")
            .await
            .unwrap();
        history.add_entry(HistoryEntry::status(true));
        history.add_entry(HistoryEntry::temperature(21.5));

        let entries = read_entries(history.path(), 2).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, Some(1));
        assert_eq!(entries[1].temp, Some(21.5));
    }

    #[tokio::test]
    async fn test_file_history_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let first = FileHistory::open(dir.path(), "1000abcd").await.unwrap();
        first.add_entry(HistoryEntry::status(false));
        assert_eq!(read_entries(first.path(), 1).await.len(), 1);
        drop(first);

        let second = FileHistory::open(dir.path(), "1000abcd").await.unwrap();
        second.add_entry(HistoryEntry::humidity(45.0));
        let entries = read_entries(second.path(), 2).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, Some(0));
        assert_eq!(entries[1].humidity, Some(45.0));
    }
}
