//! Test runner that orchestrates the dev server, the browser and the scenarios

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use picanvas_common::config::WorkbenchConfig;
use picanvas_common::{HarnessConfig, RunReport, TestResult};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightPage;
use crate::scenario::Scenario;
use crate::server::ensure_dev_server;
use crate::workbench::WorkbenchSession;

/// Options for a harness run, usually straight from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Tenant key; the configured default when `None`
    pub tenant: Option<String>,
    /// Full workbench URL overriding the tenant-derived one
    pub url: Option<String>,
    pub headed: bool,
    /// Scenario names; empty runs all
    pub tests: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub output_dir: Option<PathBuf>,
    /// Skip the dev server check and launch
    pub no_serve: bool,
    /// Shell-style command line replacing the configured serve command
    pub serve_command: Option<String>,
    /// Overrides `workbench.load_debug_manifests`
    pub debug_manifests: Option<bool>,
}

impl RunOptions {
    /// Whether the dev server has to be up before the browser starts.
    ///
    /// The workbench only fetches from the dev server when it is told to load
    /// debug manifests.
    pub fn needs_dev_server(&self, workbench: &WorkbenchConfig) -> bool {
        !self.no_serve && workbench.load_debug_manifests
    }
}

/// A finished run and where its report was written
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub report_path: PathBuf,
}

/// Runs scenarios sequentially against one workbench session
pub struct TestRunner<'a> {
    session: WorkbenchSession<'a>,
    output_dir: PathBuf,
    results: Vec<TestResult>,
}

impl<'a> TestRunner<'a> {
    pub fn new(session: WorkbenchSession<'a>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            output_dir: output_dir.into(),
            results: Vec::new(),
        }
    }

    /// Run `scenarios` in order, write the report and close the page.
    ///
    /// The workbench is reloaded before every scenario that needs a page, so
    /// each starts from an empty canvas. A failing scenario is recorded with
    /// a screenshot and the run moves on. An authentication failure stops the
    /// run since nothing after it can reach the page.
    pub async fn run(mut self, scenarios: &[Scenario]) -> E2eResult<RunOutcome> {
        let start = Instant::now();
        info!("Running {} test(s)...", scenarios.len());

        for (i, scenario) in scenarios.iter().enumerate() {
            let auth_failure = self.run_scenario(*scenario).await;
            if let Some(url) = auth_failure {
                for skipped in &scenarios[i + 1..] {
                    self.results.push(TestResult::failed(
                        skipped.name(),
                        0,
                        format!("not run: authentication required at {}", url),
                        None,
                    ));
                }
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let console_errors = self
            .session
            .console_errors()
            .into_iter()
            .map(|m| m.text)
            .collect();
        let report = RunReport::new(
            self.session.workbench_url(),
            std::mem::take(&mut self.results),
            console_errors,
            duration_ms,
        );

        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            report.summary.passed, report.summary.failed, duration_ms
        );

        let report_path = report.write_to(&self.output_dir)?;
        info!("Report written to: {}", report_path.display());

        if let Err(e) = self.session.close().await {
            warn!("Failed to close browser: {}", e);
        }

        Ok(RunOutcome { report, report_path })
    }

    /// Run one scenario and record its result; returns the sign-in URL when
    /// the scenario failed on authentication
    async fn run_scenario(&mut self, scenario: Scenario) -> Option<String> {
        let start = Instant::now();
        let outcome = match self.reset(scenario).await {
            Ok(()) => scenario.run(&mut self.session).await,
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(details) => {
                info!("✓ {} ({} ms)", scenario, duration_ms);
                self.results.push(TestResult::passed(scenario.name(), duration_ms, details));
                None
            }
            Err(e) => {
                error!("✗ {} - {}", scenario, e);
                let screenshot = self.capture_failure(scenario).await;
                self.results
                    .push(TestResult::failed(scenario.name(), duration_ms, e.to_string(), screenshot));
                match e {
                    E2eError::AuthenticationRequired { url } => Some(url),
                    _ => None,
                }
            }
        }
    }

    async fn reset(&mut self, scenario: Scenario) -> E2eResult<()> {
        if scenario.needs_fresh_page() {
            debug!("Loading a fresh workbench for {}", scenario);
            self.session.open().await?;
        }
        Ok(())
    }

    async fn capture_failure(&self, scenario: Scenario) -> Option<PathBuf> {
        let path = failure_screenshot_path(&self.output_dir, scenario);
        match self.session.screenshot(&path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Screenshot for {} failed: {}", scenario, e);
                None
            }
        }
    }
}

fn failure_screenshot_path(output_dir: &Path, scenario: Scenario) -> PathBuf {
    output_dir.join("screenshots").join(format!(
        "{}-{}.png",
        scenario.name(),
        Utc::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Scenarios for a run.
///
/// Without debug manifests the manifest check cannot pass, so it is left out
/// of a default run. Asking for it by name keeps it and it fails with
/// [`E2eError::DebugManifestsDisabled`].
pub fn plan_scenarios<S: AsRef<str>>(names: &[S], debug_manifests: bool) -> E2eResult<Vec<Scenario>> {
    let mut scenarios = Scenario::select(names)?;
    if names.is_empty() && !debug_manifests {
        info!("Debug manifests disabled, skipping {}", Scenario::DebugManifestLoaded);
        scenarios.retain(|s| *s != Scenario::DebugManifestLoaded);
    }
    Ok(scenarios)
}

/// Full harness run: dev server, browser, scenarios and report
pub async fn run_harness(config: &HarnessConfig, options: &RunOptions) -> E2eResult<RunOutcome> {
    let mut workbench = config.workbench.clone();
    if let Some(secs) = options.timeout_secs {
        workbench.load_timeout_secs = secs;
    }
    if let Some(enabled) = options.debug_manifests {
        workbench.load_debug_manifests = enabled;
    }
    let scenarios = plan_scenarios(&options.tests, workbench.load_debug_manifests)?;

    let mut serve = config.serve.clone();
    if let Some(line) = &options.serve_command {
        serve.set_command_line(line)?;
    }
    let mut browser = config.browser.clone();
    browser.headless = browser.headless && !options.headed;

    // A full URL override does not need a configured tenant
    let override_tenant;
    let tenant = match (&options.url, config.tenant(options.tenant.as_deref())) {
        (_, Ok((key, tenant))) => {
            info!("Tenant: {}", key);
            tenant
        }
        (Some(url), Err(_)) => {
            override_tenant = picanvas_common::TenantConfig::new(url.clone());
            &override_tenant
        }
        (None, Err(e)) => return Err(e.into()),
    };

    let mut server = if options.needs_dev_server(&workbench) {
        ensure_dev_server(&serve, workbench.poll_interval()).await?
    } else {
        None
    };

    let result = async {
        let page = PlaywrightPage::launch(&browser).await?;
        let mut session = WorkbenchSession::new(Box::new(page), tenant, &workbench, browser.headless)?;
        if let Some(url) = &options.url {
            session = session.with_url(url.clone());
        }
        TestRunner::new(session, options.output_dir.clone().unwrap_or_else(|| config.output_dir()))
            .run(&scenarios)
            .await
    }
    .await;

    if let Some(process) = server.as_mut() {
        if let Err(e) = process.terminate(serve.shutdown_grace()).await {
            warn!("Failed to stop dev server: {}", e);
        }
    }

    result
}
