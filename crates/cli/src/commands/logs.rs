//! Extension log collection

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use picanvas_common::config::analytics_log_url;
use picanvas_common::logs::{scan_extension_logs, LogEntry, LogRoot, LogStore, ScanOptions};
use picanvas_common::HarnessConfig;
use serde::Serialize;
use tracing::{debug, warn};

use crate::output::{print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Scan extension directories and merge new entries into the log store
    Collect(CollectArgs),
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Extension root as CHANNEL=DIR, or DIR with the channel guessed (repeatable)
    #[arg(long = "root", value_name = "[CHANNEL=]DIR")]
    pub roots: Vec<LogRoot>,

    /// Extension directory name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Record this version instead of the one in the extension directory name
    #[arg(long, value_name = "VERSION")]
    pub vscode_version: Option<String>,

    /// Log store file
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Post new entries to the analytics server
    #[arg(long)]
    pub post: bool,

    /// Analytics server base URL
    #[arg(long, value_name = "URL", env = "PICANVAS_ANALYTICS_SERVER")]
    pub server: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CollectSummary {
    pub extensions: usize,
    pub files: usize,
    pub entries: usize,
    pub new_entries: usize,
    pub skipped_lines: usize,
    pub stored: usize,
    /// Stored entries per channel
    pub channels: BTreeMap<String, usize>,
    pub store: String,
}

impl TableDisplay for CollectSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Extensions", "Files", "Entries", "New", "Skipped", "Stored", "Channels", "Store"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.extensions.to_string(),
            self.files.to_string(),
            self.entries.to_string(),
            self.new_entries.to_string(),
            self.skipped_lines.to_string(),
            self.stored.to_string(),
            self.channels
                .iter()
                .map(|(channel, count)| format!("{}: {}", channel, count))
                .collect::<Vec<_>>()
                .join(", "),
            self.store.clone(),
        ]
    }
}

pub async fn execute(cmd: LogsCommands, config: &HarnessConfig, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        LogsCommands::Collect(args) => collect(args, config, format).await,
    }
}

async fn collect(args: CollectArgs, config: &HarnessConfig, format: OutputFormat) -> anyhow::Result<()> {
    let roots = if args.roots.is_empty() {
        config.logs.roots.clone()
    } else {
        args.roots
    };
    let prefix = args.prefix.unwrap_or_else(|| config.logs.extension_prefix.clone());
    let store_path = args.store.unwrap_or_else(|| config.logs.store_path.clone());
    let options = ScanOptions::new(prefix.clone()).with_version(args.vscode_version);

    let scan = scan_extension_logs(&roots, &options)?;
    let mut store = LogStore::load(&store_path)
        .with_context(|| format!("failed to load log store {}", store_path.display()))?;
    let scanned = scan.entries.len();
    let added = store.merge(scan.entries);
    store.save()?;

    let summary = CollectSummary {
        extensions: scan.extensions.len(),
        files: scan.files_scanned,
        entries: scanned,
        new_entries: added.len(),
        skipped_lines: scan.lines_skipped,
        stored: store.len(),
        channels: channel_counts(store.entries()),
        store: store_path.display().to_string(),
    };
    print_list(&[summary], format);

    if scan.extensions.is_empty() {
        print_warning(&format!("No extensions matching '{}' found", prefix));
    }

    if args.post {
        let endpoint = match args.server {
            Some(server) => analytics_log_url(&server),
            None => config.logs.analytics_url(),
        };
        if added.is_empty() {
            print_info("No new log entries to post");
            return Ok(());
        }
        let (sent, failed) = post_entries(&endpoint, &added).await?;
        if failed == 0 {
            print_success(&format!("Posted {} entries to {}", sent, endpoint));
        } else {
            print_warning(&format!("Posted {} entries, {} failed", sent, failed));
        }
    }

    Ok(())
}

fn channel_counts(entries: &[LogEntry]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.entry_type.clone()).or_default() += 1;
    }
    counts
}

/// Post each entry individually; returns (sent, failed)
async fn post_entries(endpoint: &str, entries: &[LogEntry]) -> anyhow::Result<(usize, usize)> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let bar = ProgressBar::new(entries.len() as u64);
    bar.set_style(ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}")?);
    bar.set_message("posting");

    let mut sent = 0;
    let mut failed = 0;
    for entry in entries {
        let result = client
            .post(endpoint)
            .json(entry)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        match result {
            Ok(_) => {
                sent += 1;
                debug!(timestamp = %entry.timestamp, "posted log entry");
            }
            Err(e) => {
                failed += 1;
                warn!(timestamp = %entry.timestamp, "failed to post log entry: {}", e);
            }
        }
        bar.inc(1);
    }
    bar.finish_with_message("done");

    Ok((sent, failed))
}
