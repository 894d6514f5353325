//! Scan extension directories for log files

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{LogEntry, LogFileMetadata, LogRoot};
use crate::error::{Error, Result};

/// Entries found during a scan
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<LogEntry>,
    pub extensions: Vec<PathBuf>,
    pub files_scanned: usize,
    pub lines_skipped: usize,
}

/// What to collect and how to label it
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Extension directory name prefix
    pub prefix: String,
    /// Replaces the version taken from the extension directory name
    pub version_override: Option<String>,
}

impl ScanOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            version_override: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version_override = version;
        self
    }
}

/// A parsed line before file context is attached
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub timestamp: String,
    /// Log level as written in the line, lowercased
    pub level: String,
    pub event_type: String,
    pub details: Value,
    pub status: String,
}

/// Parses JSON-object lines, `[ts] [type] event: details` lines and
/// `YYYY-MM-DD hh:mm:ss.mmm [level] message` output channel lines.
pub struct LineParser {
    bracketed: Regex,
    channel: Regex,
}

impl LineParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bracketed: compile(r"^\[(?P<ts>[^\]]+)\]\s*\[(?P<kind>[^\]]+)\]\s*(?P<event>[^:]+):\s*(?P<details>.*)$")?,
            channel: compile(
                r"^(?P<ts>\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?Z?)\s+\[(?P<kind>\w+)\]\s*(?P<rest>.*)$",
            )?,
        })
    }

    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('{') {
            return self.parse_json(line);
        }

        if let Some(caps) = self.bracketed.captures(line) {
            let kind = caps["kind"].trim().to_lowercase();
            return Some(ParsedLine {
                timestamp: caps["ts"].trim().to_string(),
                status: status_for(&kind),
                level: kind,
                event_type: caps["event"].trim().to_string(),
                details: Value::String(caps["details"].trim().to_string()),
            });
        }

        if let Some(caps) = self.channel.captures(line) {
            let kind = caps["kind"].to_lowercase();
            let rest = caps["rest"].trim();
            let (event, details) = match rest.split_once(':') {
                Some((event, details)) if !event.contains(' ') => (event.trim(), details.trim()),
                _ => ("log", rest),
            };
            return Some(ParsedLine {
                timestamp: caps["ts"].to_string(),
                status: status_for(&kind),
                level: kind,
                event_type: event.to_string(),
                details: Value::String(details.to_string()),
            });
        }

        None
    }

    fn parse_json(&self, line: &str) -> Option<ParsedLine> {
        let value: Value = serde_json::from_str(line).ok()?;
        let obj = value.as_object()?;
        let timestamp = obj.get("timestamp").and_then(value_as_string)?;
        let level = obj
            .get("level")
            .or_else(|| obj.get("type"))
            .and_then(value_as_string)
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase();
        let status = obj
            .get("status")
            .and_then(value_as_string)
            .unwrap_or_else(|| status_for(&level));

        Some(ParsedLine {
            timestamp,
            event_type: obj
                .get("eventType")
                .or_else(|| obj.get("event"))
                .and_then(value_as_string)
                .unwrap_or_else(|| "log".to_string()),
            details: obj
                .get("details")
                .or_else(|| obj.get("message"))
                .cloned()
                .unwrap_or(Value::Null),
            level,
            status,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn status_for(kind: &str) -> String {
    match kind {
        "error" | "fatal" | "critical" => "error",
        "warn" | "warning" => "warning",
        _ => "ok",
    }
    .to_string()
}

/// Whether an extension directory name matches `prefix`, either as the
/// whole name (`picanvas-1.2.0`) or after the publisher (`acme.picanvas-1.2.0`).
fn matches_extension(name: &str, prefix: &str) -> bool {
    let name = name.to_lowercase();
    let prefix = prefix.to_lowercase();
    name.starts_with(&prefix)
        || name
            .split_once('.')
            .map(|(_, rest)| rest.starts_with(&prefix))
            .unwrap_or(false)
}

/// Version from an extension directory name such as `acme.picanvas-1.2.0`
pub fn extension_version(name: &str) -> String {
    name.rsplit_once('-')
        .filter(|(_, v)| v.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn file_metadata(path: &Path) -> LogFileMetadata {
    match fs::metadata(path) {
        Ok(meta) => LogFileMetadata {
            file_size: meta.len(),
            modified: meta
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
        },
        Err(_) => LogFileMetadata::default(),
    }
}

/// Version recorded for an entry; insiders builds carry an `-insiders` suffix
fn channel_version(version: &str, channel: &str) -> String {
    if channel == "insiders" && !version.ends_with("-insiders") {
        format!("{}-insiders", version)
    } else {
        version.to_string()
    }
}

/// Collect log entries from every matching extension under `roots`.
///
/// Each entry's `type` is the channel of the root it was found under; the
/// line's own level only feeds `status`.
pub fn scan_extension_logs(roots: &[LogRoot], options: &ScanOptions) -> Result<ScanReport> {
    let parser = LineParser::new()?;
    let mut report = ScanReport::default();
    let platform = std::env::consts::OS.to_string();
    let prefix = options.prefix.as_str();

    for LogRoot { channel, path: root } in roots {
        if !root.is_dir() {
            debug!(%channel, root = %root.display(), "extension root missing, skipping");
            continue;
        }
        debug!(%channel, root = %root.display(), "scanning extension root");

        let mut extensions: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .map(|n| matches_extension(&n.to_string_lossy(), prefix))
                    .unwrap_or(false)
            })
            .collect();
        extensions.sort();

        for ext_dir in extensions {
            let dir_name = ext_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let version = channel_version(
                options
                    .version_override
                    .as_deref()
                    .unwrap_or(&extension_version(&dir_name)),
                channel,
            );

            for file in WalkDir::new(&ext_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().map(|x| x == "log").unwrap_or(false))
            {
                let path = file.path();
                let content = match fs::read_to_string(path) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(file = %path.display(), "unreadable log file: {}", e);
                        continue;
                    }
                };
                report.files_scanned += 1;

                let metadata = file_metadata(path);
                let log_file = path
                    .strip_prefix(&ext_dir)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .to_string();

                for line in content.lines() {
                    match parser.parse(line) {
                        Some(parsed) => report.entries.push(LogEntry {
                            timestamp: parsed.timestamp,
                            version: version.clone(),
                            entry_type: channel.clone(),
                            event_type: parsed.event_type,
                            details: parsed.details,
                            status: parsed.status,
                            log_file: log_file.clone(),
                            platform: platform.clone(),
                            metadata: metadata.clone(),
                        }),
                        None if line.trim().is_empty() => {}
                        None => report.lines_skipped += 1,
                    }
                }
            }

            report.extensions.push(ext_dir);
        }
    }

    debug!(
        entries = report.entries.len(),
        files = report.files_scanned,
        skipped = report.lines_skipped,
        "scan complete"
    );
    Ok(report)
}
