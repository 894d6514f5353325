//! Runner behaviour: failures are recorded, the run continues, the report is written

mod support;

use picanvas_common::config::{TenantConfig, WorkbenchConfig};
use picanvas_common::RunReport;
use picanvas_e2e::scenario::{SAMPLE_TEXT, TEXT_WEB_PART};
use picanvas_e2e::{ConsoleMessage, Scenario, TestRunner, WorkbenchSession};
use support::FakePage;

fn loaded_page(config: &WorkbenchConfig) -> FakePage {
    let page = FakePage::new();
    page.show(&config.selectors.canvas);
    page
}

#[tokio::test(start_paused = true)]
async fn failing_scenario_is_recorded_and_run_continues() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig::default();
    let page = loaded_page(&config);
    page.fail(&config.selectors.preview_toggle, 100);

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = TestRunner::new(session, out.path())
        .run(&[Scenario::WorkbenchLoads, Scenario::PreviewMode, Scenario::AddSection])
        .await
        .unwrap();

    let report = &outcome.report;
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.passed, 2);
    assert_eq!(report.summary.failed, 1);
    assert!(!report.all_passed());

    let failed = &report.tests[1];
    assert_eq!(failed.name, "preview_mode");
    assert!(!failed.passed);
    assert!(failed.error.as_deref().unwrap().contains("element not interactable"));
    let screenshot = failed.screenshot.clone().unwrap();
    assert!(screenshot.starts_with(out.path().join("screenshots")));
    assert_eq!(page.state.lock().screenshots, vec![screenshot]);

    assert_eq!(report.tests[2].name, "add_section");
    assert!(report.tests[2].passed);
    // Loaded once by workbench_loads, then once before each later scenario
    assert_eq!(page.state.lock().navigations.len(), 3);
    assert_eq!(report.tests[0].details["url"], report.url.as_str());

    assert!(outcome.report_path.exists());
    let reloaded = RunReport::load(&outcome.report_path).unwrap();
    assert_eq!(reloaded.summary, report.summary);
    assert!(page.state.lock().closed);
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_stops_the_run() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig::default();
    let page = loaded_page(&config);
    page.state.lock().redirect = Some("https://login.microsoftonline.com/common".to_string());

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = TestRunner::new(session, out.path()).run(Scenario::all()).await.unwrap();

    let report = outcome.report;
    assert_eq!(report.summary.total, Scenario::all().len());
    assert_eq!(report.summary.passed, 0);
    assert!(report.tests[0].error.as_deref().unwrap().contains("--headed"));
    assert!(report.tests[1..]
        .iter()
        .all(|t| t.error.as_deref().unwrap().starts_with("not run: authentication required")));
    // Only the failing scenario gets a screenshot
    assert_eq!(page.state.lock().screenshots.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn known_bad_console_errors_fail_the_console_check() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig::default();
    let page = loaded_page(&config);

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    page.emit(ConsoleMessage::console("warning", "PiCanvas: slow render"));
    page.emit(ConsoleMessage::console("error", "PiCanvas: shape store unavailable"));
    page.emit(ConsoleMessage::console("error", "telemetry endpoint blocked"));

    let outcome = TestRunner::new(session, out.path())
        .run(&[Scenario::WorkbenchLoads, Scenario::NoConsoleErrors])
        .await
        .unwrap();

    let report = outcome.report;
    assert!(report.tests[0].passed);
    let console_check = &report.tests[1];
    assert!(!console_check.passed);
    let error = console_check.error.as_deref().unwrap();
    assert!(error.contains("1 known-bad console error(s)"));
    assert!(error.contains("shape store unavailable"));
    assert_eq!(
        report.console_errors,
        vec![
            "PiCanvas: shape store unavailable".to_string(),
            "telemetry endpoint blocked".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn single_scenario_opens_the_workbench_itself() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let page = loaded_page(&config);
    page.reveal_on_click(&selectors.toolbox_item_for(TEXT_WEB_PART), &selectors.web_part_for(TEXT_WEB_PART));

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = TestRunner::new(session, out.path())
        .run(&[Scenario::SetText])
        .await
        .unwrap();

    assert!(outcome.report.all_passed());
    let state = page.state.lock();
    assert_eq!(state.navigations.len(), 1);
    assert_eq!(state.navigations[0], outcome.report.url);
    assert_eq!(state.fills.last().unwrap(), &(selectors.text_editor.clone(), SAMPLE_TEXT.to_string()));
}

#[tokio::test(start_paused = true)]
async fn every_scenario_starts_from_a_reloaded_page() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let page = loaded_page(&config);
    page.reveal_on_click(&selectors.toolbox_item_for(TEXT_WEB_PART), &selectors.web_part_for(TEXT_WEB_PART));

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = TestRunner::new(session, out.path())
        .run(&[Scenario::AddSection, Scenario::SetText, Scenario::NoConsoleErrors])
        .await
        .unwrap();

    assert!(outcome.report.all_passed());
    // The console check reads what was captured and does not reload
    assert_eq!(page.state.lock().navigations.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_reload_is_recorded_against_the_scenario() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig {
        load_timeout_secs: 2,
        ..Default::default()
    };
    let page = FakePage::new();

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = TestRunner::new(session, out.path())
        .run(&[Scenario::AddSection, Scenario::NoConsoleErrors])
        .await
        .unwrap();

    let report = outcome.report;
    assert!(!report.tests[0].passed);
    assert!(report.tests[0].error.as_deref().unwrap().contains("workbench canvas"));
    assert!(report.tests[0].screenshot.is_some());
    assert!(report.tests[1].passed);
    assert_eq!(page.clicks_on(&config.selectors.add_section), 0);
}

#[tokio::test(start_paused = true)]
async fn noisy_console_keeps_early_errors() {
    let out = tempfile::tempdir().unwrap();
    let tenant = TenantConfig::new("https://contoso.sharepoint.com/sites/dev");
    let config = WorkbenchConfig::default();
    let page = loaded_page(&config);

    let session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    page.emit(ConsoleMessage::console("error", "PiCanvas: failed to load shapes"));
    for i in 0..200 {
        page.emit(ConsoleMessage::console("log", format!("render tick {}", i)));
    }

    let outcome = TestRunner::new(session, out.path())
        .run(&[Scenario::WorkbenchLoads, Scenario::NoConsoleErrors])
        .await
        .unwrap();

    let report = outcome.report;
    assert_eq!(report.console_errors, vec!["PiCanvas: failed to load shapes".to_string()]);
    assert!(!report.tests[1].passed);
}
