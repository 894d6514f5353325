//! Workbench session behaviour against a scripted page

mod support;

use picanvas_common::config::{TenantConfig, WorkbenchConfig};
use picanvas_e2e::{ColumnRef, ConsoleMessage, E2eError, SectionLayout, TabContent, WorkbenchSession};
use regex::Regex;
use serde_json::json;
use support::FakePage;

fn tenant() -> TenantConfig {
    TenantConfig::new("https://contoso.sharepoint.com/sites/dev/")
}

#[test]
fn workbench_url_carries_debug_manifests() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let session = WorkbenchSession::new(Box::new(FakePage::new()), &tenant, &config, true).unwrap();
    assert_eq!(
        session.workbench_url(),
        "https://contoso.sharepoint.com/sites/dev/_layouts/15/workbench.aspx\
         ?debug=true&noredir=true&debugManifestsFile=https://localhost:4321/temp/build/manifests.js"
    );

    let plain = WorkbenchConfig {
        load_debug_manifests: false,
        ..Default::default()
    };
    let session = WorkbenchSession::new(Box::new(FakePage::new()), &tenant, &plain, true).unwrap();
    assert_eq!(
        session.workbench_url(),
        "https://contoso.sharepoint.com/sites/dev/_layouts/15/workbench.aspx"
    );

    let session = session.with_url("https://localhost:4321/workbench");
    assert_eq!(session.workbench_url(), "https://localhost:4321/workbench");
}

#[tokio::test(start_paused = true)]
async fn headless_sign_in_redirect_fails_fast() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let page = FakePage::new();
    page.state.lock().redirect = Some("https://login.microsoftonline.com/common/oauth2/authorize".to_string());

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let started = tokio::time::Instant::now();
    let err = session.open().await.unwrap_err();

    assert!(started.elapsed() < config.poll_interval());
    match &err {
        E2eError::AuthenticationRequired { url } => assert!(url.contains("login.microsoftonline.com")),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("--headed"));
}

#[tokio::test(start_paused = true)]
async fn headed_sign_in_waits_for_the_operator() {
    let tenant = tenant();
    let config = WorkbenchConfig {
        load_timeout_secs: 5,
        auth_timeout_secs: 30,
        ..Default::default()
    };
    let page = FakePage::new();
    page.state.lock().redirect = Some("https://login.microsoftonline.com/common".to_string());

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, false).unwrap();
    let started = tokio::time::Instant::now();
    let err = session.open().await.unwrap_err();

    // Never signed in: times out on the longer authentication budget
    assert!(matches!(err, E2eError::Harness(picanvas_common::Error::Timeout { .. })));
    assert!(started.elapsed() >= config.auth_timeout());
}

#[tokio::test(start_paused = true)]
async fn open_accepts_debug_scripts_prompt() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let page = FakePage::new();
    page.show(&selectors.debug_scripts_accept)
        .fail(&selectors.debug_scripts_accept, 1)
        .reveal_on_click(&selectors.debug_scripts_accept, &selectors.canvas);
    page.state
        .lock()
        .dismissable
        .insert(selectors.debug_scripts_accept.clone());

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    session.open().await.unwrap();

    assert_eq!(page.clicks_on(&selectors.debug_scripts_accept), 2);
    assert_eq!(page.state.lock().navigations.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn canvas_never_appearing_times_out() {
    let tenant = tenant();
    let config = WorkbenchConfig {
        load_timeout_secs: 5,
        ..Default::default()
    };
    let page = FakePage::new();

    let mut session = WorkbenchSession::new(Box::new(page), &tenant, &config, true).unwrap();
    let err = session.open().await.unwrap_err();
    assert!(err.to_string().contains("workbench canvas"));
}

fn manifests(ids: &[(&str, &str)]) -> serde_json::Value {
    let matching: Vec<_> = ids.iter().filter(|(_, alias)| alias.to_lowercase().contains("picanvas")).collect();
    json!({
        "present": true,
        "count": ids.len(),
        "expectedFound": ids.iter().any(|(id, _)| *id == "6bcd9bfc-425b-47c2-8e5e-c17eb1c864c5"),
        "aliases": matching.iter().map(|(_, alias)| alias).collect::<Vec<_>>(),
        "ids": matching.iter().map(|(id, _)| id).collect::<Vec<_>>(),
    })
}

#[tokio::test(start_paused = true)]
async fn debug_manifests_are_polled_until_present() {
    let tenant = tenant();
    let config = WorkbenchConfig {
        load_timeout_secs: 3,
        ..Default::default()
    };
    let page = FakePage::new();
    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();

    let err = session.wait_for_debug_manifest().await.unwrap_err();
    assert!(err.to_string().contains("debug manifests not detected after 3s"));

    page.on_evaluate(
        "getManifests",
        manifests(&[("6bcd9bfc-425b-47c2-8e5e-c17eb1c864c5", "PiCanvasWebPart"), ("d1d91016", "Text")]),
    );
    let (_, info) = session.wait_for_debug_manifest().await.unwrap();
    assert!(info.expected_found);
    assert_eq!(info.count, 2);
    assert_eq!(info.aliases, vec!["PiCanvasWebPart".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn manifest_with_a_different_component_id_fails() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let page = FakePage::new();
    page.on_evaluate(
        "getManifests",
        manifests(&[("00000000-0000-0000-0000-000000000000", "PiCanvasWebPart")]),
    );
    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();

    let message = session.wait_for_debug_manifest().await.unwrap_err().to_string();
    assert!(message.contains("component id mismatch"));
    assert!(message.contains("6bcd9bfc-425b-47c2-8e5e-c17eb1c864c5"));
    assert!(message.contains("00000000-0000-0000-0000-000000000000"));
    assert!(message.contains("PiCanvasWebPart"));
}

#[tokio::test(start_paused = true)]
async fn manifest_script_carries_the_expected_component_id() {
    let tenant = tenant();
    let config = WorkbenchConfig {
        component_id: "abc-123".to_string(),
        ..Default::default()
    };
    let page = FakePage::new();
    page.on_evaluate("\"abc-123\".toLowerCase()", json!({"present": true, "count": 1, "expectedFound": true}));
    let mut session = WorkbenchSession::new(Box::new(page), &tenant, &config, true).unwrap();

    let (_, info) = session.wait_for_debug_manifest().await.unwrap();
    assert!(info.expected_found);
    assert!(info.aliases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn disabled_debug_manifests_fail_explicitly() {
    let tenant = tenant();
    let config = WorkbenchConfig {
        load_debug_manifests: false,
        ..Default::default()
    };
    let page = FakePage::new();
    page.on_evaluate("getManifests", manifests(&[("6bcd9bfc-425b-47c2-8e5e-c17eb1c864c5", "PiCanvas")]));
    let mut session = WorkbenchSession::new(Box::new(page), &tenant, &config, true).unwrap();

    let err = session.wait_for_debug_manifest().await.unwrap_err();
    assert!(matches!(err, E2eError::DebugManifestsDisabled));
    assert!(err.to_string().contains("--debug-manifests"));
}

#[tokio::test(start_paused = true)]
async fn add_web_part_retries_flaky_toolbox() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let open = selectors.column_add_for(1, 2);
    let item = selectors.toolbox_item_for("Text");
    let page = FakePage::new();
    page.fail(&open, 2).reveal_on_click(&item, &selectors.web_part_for("Text"));

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    session.add_web_part("Text", ColumnRef::new(1, 2)).await.unwrap();

    assert!(open.contains("nth=0") && open.contains("nth=1"));
    assert_eq!(page.clicks_on(&open), 3);
    assert_eq!(page.clicks_on(&item), 1);
    let fills = page.state.lock().fills.clone();
    assert_eq!(fills, vec![(selectors.toolbox_search.clone(), "Text".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn picanvas_is_picked_by_component_id_when_listed() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let by_id = selectors.toolbox_item_with_id(&config.component_id);
    let by_name = selectors.toolbox_item_for("PiCanvas");
    let page = FakePage::new();
    page.show(&by_id).reveal_on_click(&by_id, &selectors.web_part_for("PiCanvas"));

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    session.add_picanvas(ColumnRef::FIRST).await.unwrap();

    assert_eq!(page.clicks_on(&by_id), 1);
    assert_eq!(page.clicks_on(&by_name), 0);
}

#[tokio::test(start_paused = true)]
async fn web_part_that_never_renders_times_out() {
    let tenant = tenant();
    let config = WorkbenchConfig {
        load_timeout_secs: 4,
        ..Default::default()
    };
    let page = FakePage::new();

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let err = session.add_picanvas(ColumnRef::FIRST).await.unwrap_err();

    assert!(err.to_string().contains("PiCanvas web part"));
    assert_eq!(page.clicks_on(&config.selectors.toolbox_item_for("PiCanvas")), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_the_last_error() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let page = FakePage::new();
    page.fail(&selectors.add_section, 10);

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let err = session.add_section(SectionLayout::TwoColumns).await.unwrap_err();

    assert_eq!(page.clicks_on(&selectors.add_section), config.retry_attempts as usize);
    assert_eq!(
        err.to_string(),
        format!("Playwright error: element not interactable: {} (7 left)", selectors.add_section)
    );
    assert_eq!(page.clicks_on(&selectors.section_layout_for("Two columns")), 0);
}

#[tokio::test(start_paused = true)]
async fn section_layout_is_chosen_by_label() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let page = FakePage::new();

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    session.add_section(SectionLayout::TwoColumns).await.unwrap();

    let clicks = page.state.lock().clicks.clone();
    assert_eq!(
        clicks,
        vec![
            config.selectors.add_section.clone(),
            "button:has-text('Two columns') >> nth=0".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn preview_toggle_is_retried() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let page = FakePage::new();
    page.fail(&selectors.preview_toggle, 1)
        .reveal_on_click(&selectors.preview_toggle, &selectors.edit_button);

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    assert!(!session.in_preview().await);
    session.toggle_preview().await.unwrap();

    assert!(session.in_preview().await);
    assert_eq!(page.clicks_on(&selectors.preview_toggle), 2);
}

#[tokio::test(start_paused = true)]
async fn tab_content_is_selected_and_entered() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let option = selectors.content_type_option_for("Mermaid");
    let page = FakePage::new();
    page.show(&selectors.picanvas)
        .reveal_on_click(&selectors.picanvas, &selectors.configure_tabs)
        .reveal_on_click(&selectors.content_type_dropdown, &option)
        .reveal_on_click(&option, &selectors.content_field)
        .on_evaluate("Content Type", json!(true));

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = session.configure_tab_content(TabContent::Mermaid).await.unwrap();

    assert!(outcome.content_type_found && outcome.selected && outcome.entered);
    assert_eq!(page.clicks_on(&selectors.configure_tabs), 1);
    let fills = page.state.lock().fills.clone();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].0, selectors.content_field);
    assert!(fills[0].1.starts_with("graph TD"));
}

#[tokio::test(start_paused = true)]
async fn embed_content_goes_into_the_url_field() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let selectors = &config.selectors;
    let option = selectors.content_type_option_for("Embed");
    let page = FakePage::new();
    page.show(&selectors.configure_tabs)
        .show(&option)
        .show(&selectors.embed_url_field)
        .on_evaluate("Content Type", json!(true));

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = session.configure_tab_content(TabContent::Embed).await.unwrap();

    assert!(outcome.entered);
    let fills = page.state.lock().fills.clone();
    assert_eq!(fills, vec![(selectors.embed_url_field.clone(), TabContent::Embed.sample().to_string())]);
}

#[tokio::test(start_paused = true)]
async fn missing_content_type_setting_is_reported_not_raised() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let page = FakePage::new();

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    let outcome = session.configure_tab_content(TabContent::Html).await.unwrap();

    assert!(!outcome.content_type_found);
    assert!(!outcome.selected);
    assert!(page.state.lock().clicks.is_empty());
}

#[tokio::test]
async fn page_inspection_reads_sections() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let page = FakePage::new();
    page.on_evaluate(
        "totalSections",
        json!({
            "totalSections": 2,
            "totalWebParts": 3,
            "picanvasFound": true,
            "sections": [
                {"section": 1, "columns": 2, "webParts": 2},
                {"section": 2, "columns": 1, "webParts": 1}
            ]
        }),
    );

    let session = WorkbenchSession::new(Box::new(page), &tenant, &config, true).unwrap();
    let inspection = session.inspect_page().await.unwrap();
    assert_eq!(inspection.total_web_parts, 3);
    assert!(inspection.picanvas_found);
    assert!(inspection.has_multi_column_section());
}

#[tokio::test]
async fn console_errors_are_captured_after_subscription() {
    let tenant = tenant();
    let config = WorkbenchConfig::default();
    let page = FakePage::new();
    page.emit(ConsoleMessage::console("error", "before the session existed"));

    let mut session = WorkbenchSession::new(Box::new(page.clone()), &tenant, &config, true).unwrap();
    page.emit(ConsoleMessage::console("log", "PiCanvas mounted"));
    page.emit(ConsoleMessage::console("error", "PiCanvas: failed to load shapes"));
    page.emit(ConsoleMessage::page_error("ResizeObserver loop limit exceeded"));

    assert_eq!(session.console().len(), 3);
    assert_eq!(session.console_errors().len(), 2);

    let patterns = vec![Regex::new("(?i)picanvas").unwrap()];
    let bad = session.bad_console_errors(&patterns);
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].text, "PiCanvas: failed to load shapes");
}
