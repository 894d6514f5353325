//! PiCanvas Harness Common Library
//!
//! Readiness polling, bounded retry, the run report model, harness
//! configuration and the extension log store shared by the harness crates.

pub mod config;
pub mod error;
pub mod logs;
pub mod poll;
pub mod report;
pub mod retry;

// Re-export commonly used types
pub use config::{HarnessConfig, TenantConfig};
pub use error::{Error, Result};
pub use poll::{poll_until_ready, PollOutcome, Poller, WaitOutcome};
pub use report::{RunReport, RunSummary, TestResult};
pub use retry::{with_retry, ActionAttempt, RetryOutcome, RetryPolicy};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
