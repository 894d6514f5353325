//! Extension log store
//!
//! A flat JSON array of log entries on disk. Entries are identified by the
//! `(timestamp, version)` pair; merging never introduces a second entry with
//! a pair already present.

mod scan;

pub use scan::{extension_version, scan_extension_logs, LineParser, ParsedLine, ScanOptions, ScanReport};

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// An extension directory tagged with the VS Code channel it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRoot {
    /// `stable`, `insiders`, ...
    pub channel: String,
    pub path: PathBuf,
}

impl LogRoot {
    pub fn new(channel: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
        }
    }

    /// Tag a bare path: anything under an insiders install is `insiders`
    pub fn infer(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let channel = if path.to_string_lossy().to_lowercase().contains("insiders") {
            "insiders"
        } else {
            "stable"
        };
        Self::new(channel, path)
    }
}

/// Parses `CHANNEL=DIR` or a bare `DIR`
impl FromStr for LogRoot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((channel, path)) if !channel.is_empty() && !channel.contains(['/', '\\']) => {
                if path.is_empty() {
                    return Err(Error::InvalidConfig(format!("log root '{}' has no directory", s)));
                }
                Ok(Self::new(channel.to_lowercase(), path))
            }
            _ => Ok(Self::infer(s)),
        }
    }
}

impl fmt::Display for LogRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.channel, self.path.display())
    }
}

/// One collected log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub version: String,
    /// VS Code channel the entry was collected from
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub details: Value,
    pub status: String,
    #[serde(rename = "logFile")]
    pub log_file: String,
    pub platform: String,
    pub metadata: LogFileMetadata,
}

impl LogEntry {
    /// Deduplication key
    pub fn key(&self) -> (String, String) {
        (self.timestamp.clone(), self.version.clone())
    }
}

/// Facts about the file an entry was read from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileMetadata {
    pub file_size: u64,
    pub modified: Option<String>,
}

/// Merge `incoming` into `existing`, skipping any `(timestamp, version)` pair
/// already present (including duplicates within `incoming` itself).
pub fn merge_logs(existing: &[LogEntry], incoming: &[LogEntry]) -> Vec<LogEntry> {
    let mut store = LogStore::from_entries(PathBuf::new(), existing.to_vec());
    store.merge(incoming.iter().cloned());
    store.entries
}

/// On-disk log store
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    entries: Vec<LogEntry>,
    keys: HashSet<(String, String)>,
}

impl LogStore {
    /// Load the store at `path`; a missing file is an empty store
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), count = entries.len(), "loaded log store");
        Ok(Self::from_entries(path.to_path_buf(), entries))
    }

    fn from_entries(path: PathBuf, entries: Vec<LogEntry>) -> Self {
        let mut store = Self {
            path,
            entries: Vec::with_capacity(entries.len()),
            keys: HashSet::new(),
        };
        store.merge(entries);
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append entries with unseen keys; returns the entries that were added
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = LogEntry>) -> Vec<LogEntry> {
        let mut added = Vec::new();
        for entry in incoming {
            if self.keys.insert(entry.key()) {
                self.entries.push(entry.clone());
                added.push(entry);
            }
        }
        added
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        info!(path = %self.path.display(), count = self.entries.len(), "saved log store");
        Ok(())
    }
}
