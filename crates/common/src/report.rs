//! Test results and the persisted run report

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Outcome of one test scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl TestResult {
    pub fn passed(name: impl Into<String>, duration_ms: u64, details: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            duration_ms,
            error: None,
            screenshot: None,
            details,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        duration_ms: u64,
        error: impl Into<String>,
        screenshot: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            duration_ms,
            error: Some(error.into()),
            screenshot,
            details: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Report written once at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub summary: RunSummary,
    pub tests: Vec<TestResult>,
    pub console_errors: Vec<String>,
}

impl RunReport {
    pub fn new(
        url: impl Into<String>,
        tests: Vec<TestResult>,
        console_errors: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        let passed = tests.iter().filter(|t| t.passed).count();
        Self {
            timestamp: Utc::now(),
            url: url.into(),
            summary: RunSummary {
                total: tests.len(),
                passed,
                failed: tests.len() - passed,
                duration_ms,
            },
            tests,
            console_errors,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }

    /// File name derived from the report timestamp
    pub fn file_name(&self) -> String {
        format!("picanvas-report-{}.json", self.timestamp.format("%Y%m%d_%H%M%S"))
    }

    /// Write the report into `dir` and return the file path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
