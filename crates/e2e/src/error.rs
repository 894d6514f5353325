//! Error types for workbench automation

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Dev server failed to start: {0}")]
    ServerStartup(String),

    #[error(
        "Dev server is not reachable at {probe_url}. Start it with `{command}` in {} and re-run",
        .working_dir.display()
    )]
    DevServerUnavailable {
        probe_url: String,
        command: String,
        working_dir: PathBuf,
    },

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser bridge closed: {0}")]
    BridgeClosed(String),

    #[error("Authentication required at {url}. Re-run with --headed to sign in interactively")]
    AuthenticationRequired { url: String },

    #[error("Debug manifests are disabled. Re-run with --debug-manifests or set workbench.load_debug_manifests = true")]
    DebugManifestsDisabled,

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Unknown test: {0}")]
    UnknownTest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Harness(#[from] picanvas_common::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
