//! SharePoint Workbench session
//!
//! Every mutation goes through the retry policy; every wait goes through a
//! poller. The session owns its page exclusively and holds the console
//! buffer that scenarios inspect afterwards.

use std::path::Path;
use std::time::Duration;

use picanvas_common::config::{TenantConfig, WorkbenchConfig};
use picanvas_common::{PollOutcome, Poller, RetryPolicy, WaitOutcome};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::{BrowserPage, ConsoleBuffer, ConsoleMessage};
use crate::error::{E2eError, E2eResult};

/// Lists registered debug manifests; `__ID__` and `__ALIAS__` are JSON strings
const MANIFEST_SCRIPT: &str = r#"(() => {
  const expected = __ID__.toLowerCase();
  const alias = __ALIAS__.toLowerCase();
  const result = { present: !!window.debugManifests, count: 0, expectedFound: false, aliases: [], ids: [], error: null };
  try {
    if (window.debugManifests && typeof window.debugManifests.getManifests === 'function') {
      const manifests = window.debugManifests.getManifests() || [];
      result.count = manifests.length;
      for (const m of manifests) {
        if (!m) continue;
        if (m.id && m.id.toLowerCase() === expected) result.expectedFound = true;
        if (m.alias && m.alias.toLowerCase().includes(alias)) {
          result.aliases.push(m.alias);
          if (m.id) result.ids.push(m.id);
        }
      }
    }
  } catch (e) {
    result.error = String(e);
  }
  return result;
})()"#;

const INSPECT_SCRIPT: &str = r#"(() => {
  const zones = Array.from(document.querySelectorAll("[data-automation-id='CanvasZone']"));
  return {
    totalSections: zones.length,
    totalWebParts: document.querySelectorAll('.ControlZone').length,
    picanvasFound: !!document.querySelector("[class*='piCanvas'], [class*='hillbilly']"),
    sections: zones.map((zone, i) => ({
      section: i + 1,
      columns: zone.querySelectorAll("[data-automation-id='CanvasSection']").length,
      webParts: zone.querySelectorAll('.ControlZone').length,
    })),
  };
})()"#;

/// True once the property pane offers the tab "Content Type" setting
const CONTENT_TYPE_SCRIPT: &str = r#"(() => {
  const labels = Array.from(document.querySelectorAll('.ms-Label, label'));
  if (labels.some((l) => (l.textContent || '').includes('Content Type'))) return true;
  const titles = Array.from(document.querySelectorAll('.ms-Dropdown-title'));
  return titles.some((d) => /Mermaid|Markdown|SharePoint Web Part|HTML/.test(d.textContent || ''));
})()"#;

/// Section layouts offered by the workbench
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLayout {
    OneColumn,
    TwoColumns,
    ThreeColumns,
}

impl SectionLayout {
    /// Button label in the layout picker
    pub fn label(&self) -> &'static str {
        match self {
            SectionLayout::OneColumn => "One column",
            SectionLayout::TwoColumns => "Two columns",
            SectionLayout::ThreeColumns => "Three columns",
        }
    }
}

/// A column on the canvas, both indices 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub section: usize,
    pub column: usize,
}

impl ColumnRef {
    pub const FIRST: ColumnRef = ColumnRef { section: 1, column: 1 };

    pub fn new(section: usize, column: usize) -> Self {
        Self { section, column }
    }
}

/// Debug manifests registered in the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestInfo {
    pub present: bool,
    pub count: u64,
    pub expected_found: bool,
    /// Aliases containing the web part name
    pub aliases: Vec<String>,
    pub ids: Vec<String>,
    pub error: Option<String>,
}

/// Canvas structure as rendered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInspection {
    pub total_sections: usize,
    pub total_web_parts: usize,
    pub picanvas_found: bool,
    pub sections: Vec<SectionInspection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionInspection {
    pub section: usize,
    pub columns: usize,
    pub web_parts: usize,
}

impl PageInspection {
    pub fn has_multi_column_section(&self) -> bool {
        self.sections.iter().any(|s| s.columns >= 2)
    }
}

/// Content a PiCanvas tab can be configured to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabContent {
    Mermaid,
    Markdown,
    Html,
    Embed,
}

const MERMAID_SAMPLE: &str = "graph TD
    A[Start] --> B{Is it working?}
    B -->|Yes| C[Great!]
    B -->|No| D[Debug]
    D --> A";

const MARKDOWN_SAMPLE: &str = "# Hello World

This is **bold** and *italic* text.

## Features
- Item 1
- Item 2
- Item 3

[Link](https://example.com)";

const HTML_SAMPLE: &str = r#"<div style="padding: 20px; background: #f0f0f0; border-radius: 8px;">
    <h2 style="color: #333;">Custom HTML Content</h2>
    <p>This is <strong>sanitized HTML</strong> content.</p>
    <ul>
        <li>Feature A</li>
        <li>Feature B</li>
    </ul>
</div>"#;

const EMBED_SAMPLE: &str = "https://www.youtube.com/embed/dQw4w9WgXcQ";

impl TabContent {
    /// Option text in the Content Type dropdown
    pub fn option(&self) -> &'static str {
        match self {
            TabContent::Mermaid => "Mermaid",
            TabContent::Markdown => "Markdown",
            TabContent::Html => "HTML",
            TabContent::Embed => "Embed",
        }
    }

    /// Value entered once the content type is selected
    pub fn sample(&self) -> &'static str {
        match self {
            TabContent::Mermaid => MERMAID_SAMPLE,
            TabContent::Markdown => MARKDOWN_SAMPLE,
            TabContent::Html => HTML_SAMPLE,
            TabContent::Embed => EMBED_SAMPLE,
        }
    }

    /// Embeds take a URL in a text input, everything else a textarea
    pub fn is_url(&self) -> bool {
        matches!(self, TabContent::Embed)
    }
}

/// How far tab configuration got
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TabContentOutcome {
    pub content_type_found: bool,
    pub selected: bool,
    pub entered: bool,
}

pub struct WorkbenchSession<'a> {
    page: Box<dyn BrowserPage>,
    tenant: &'a TenantConfig,
    config: &'a WorkbenchConfig,
    headless: bool,
    url_override: Option<String>,
    retry: RetryPolicy,
    auth_patterns: Vec<Regex>,
    console: ConsoleBuffer,
}

impl<'a> WorkbenchSession<'a> {
    /// Take ownership of `page` and start capturing its console
    pub fn new(
        page: Box<dyn BrowserPage>,
        tenant: &'a TenantConfig,
        config: &'a WorkbenchConfig,
        headless: bool,
    ) -> E2eResult<Self> {
        let console = ConsoleBuffer::new(page.subscribe());
        Ok(Self {
            page,
            tenant,
            config,
            headless,
            url_override: None,
            retry: config.retry_policy(),
            auth_patterns: config.auth_patterns()?,
            console,
        })
    }

    /// Open this URL instead of the one derived from the tenant
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url_override = Some(url.into());
        self
    }

    pub fn config(&self) -> &'a WorkbenchConfig {
        self.config
    }

    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    pub fn workbench_url(&self) -> String {
        if let Some(url) = &self.url_override {
            return url.clone();
        }
        let mut url = format!("{}{}", self.tenant.site_url, self.config.path);
        if self.config.load_debug_manifests {
            url.push_str("?debug=true&noredir=true&debugManifestsFile=");
            url.push_str(&self.config.debug_manifests_url);
        }
        url
    }

    fn poller(&self, label: &str) -> Poller {
        Poller::new(label, self.config.load_timeout(), self.config.poll_interval())
    }

    async fn visible(&self, selector: &str) -> bool {
        self.page.is_visible(selector).await.unwrap_or(false)
    }

    /// Navigate to the workbench and wait for the canvas.
    ///
    /// Calling it again reloads the page, which is how scenarios start from
    /// a clean canvas. Headless runs that land on a sign-in page fail
    /// immediately with [`E2eError::AuthenticationRequired`]; headed runs
    /// wait up to the authentication timeout for the operator to sign in.
    pub async fn open(&mut self) -> E2eResult<Duration> {
        let url = self.workbench_url();
        info!("Opening workbench: {}", url);

        let page = self.page.as_ref();
        let target = url.as_str();
        self.retry.run("navigate", || page.navigate(target)).await?;

        let timeout = if self.headless {
            self.config.load_timeout()
        } else {
            self.config.load_timeout().max(self.config.auth_timeout())
        };
        let poller = self.poller("workbench canvas").with_timeout(timeout);

        let this = &*self;
        match poller.wait(|| this.check_loaded()).await {
            // The only unrecoverable condition is an auth redirect; its reason is the URL
            WaitOutcome::Unrecoverable { reason, .. } => Err(E2eError::AuthenticationRequired { url: reason }),
            outcome => {
                let elapsed = outcome.into_result("workbench canvas")?;
                info!("Workbench loaded in {:.1}s", elapsed.as_secs_f64());
                Ok(elapsed)
            }
        }
    }

    async fn check_loaded(&self) -> PollOutcome {
        let url = match self.page.current_url().await {
            Ok(url) => url,
            Err(e) => {
                debug!("current_url failed: {}", e);
                return PollOutcome::NotYetReady;
            }
        };

        if self.auth_patterns.iter().any(|p| p.is_match(&url)) {
            if self.headless {
                return PollOutcome::unrecoverable(url);
            }
            debug!("waiting for sign-in at {}", url);
            return PollOutcome::NotYetReady;
        }

        let selectors = &self.config.selectors;
        if self.visible(&selectors.debug_scripts_accept).await {
            info!("Accepting debug scripts prompt");
            let page = self.page.as_ref();
            let accept = selectors.debug_scripts_accept.as_str();
            if let Err(e) = self.retry.run("accept debug scripts", || page.click(accept)).await {
                debug!("debug scripts prompt still pending: {}", e);
            }
            return PollOutcome::NotYetReady;
        }

        match self.page.is_visible(&selectors.canvas).await {
            Ok(visible) => PollOutcome::from_bool(visible),
            Err(e) => {
                debug!("canvas check failed: {}", e);
                PollOutcome::NotYetReady
            }
        }
    }

    fn manifest_script(&self) -> E2eResult<String> {
        Ok(MANIFEST_SCRIPT
            .replace("__ID__", &serde_json::to_string(&self.config.component_id)?)
            .replace("__ALIAS__", &serde_json::to_string(&self.config.web_part_name)?))
    }

    /// Snapshot of the debug manifests registered in the page
    pub async fn debug_manifest_info(&self) -> E2eResult<ManifestInfo> {
        let value = self.page.evaluate(&self.manifest_script()?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for the debug manifests and check they register the web part's
    /// component id
    pub async fn wait_for_debug_manifest(&mut self) -> E2eResult<(Duration, ManifestInfo)> {
        if !self.config.load_debug_manifests {
            return Err(E2eError::DebugManifestsDisabled);
        }

        let page = self.page.as_ref();
        let script = self.manifest_script()?;
        let script = script.as_str();
        let elapsed = self
            .poller("debug manifests")
            .wait_ready(|| async move {
                match page.evaluate(script).await {
                    Ok(value) => PollOutcome::from_bool(is_truthy(&value["present"])),
                    Err(e) => {
                        debug!("manifest check failed: {}", e);
                        PollOutcome::NotYetReady
                    }
                }
            })
            .await
            .map_err(|e| match e {
                picanvas_common::Error::Timeout { seconds, .. } => E2eError::AssertionFailed(format!(
                    "debug manifests not detected after {}s. Check that the workbench URL carries \
                     debugManifestsFile and the localhost certificate is trusted",
                    seconds
                )),
                other => other.into(),
            })?;

        let info = self.debug_manifest_info().await?;
        if let Some(error) = &info.error {
            warn!("Debug manifest inspection error: {}", error);
        }
        if !info.expected_found {
            let or_none = |v: &[String]| if v.is_empty() { "none".to_string() } else { v.join(", ") };
            return Err(E2eError::AssertionFailed(format!(
                "{} component id mismatch in debug manifests. Expected {}. Found aliases: {}. IDs: {}. \
                 Restart the dev server to regenerate manifests",
                self.config.web_part_name,
                self.config.component_id,
                or_none(info.aliases.as_slice()),
                or_none(info.ids.as_slice())
            )));
        }
        info!(
            "Debug manifests include {} ({})",
            self.config.web_part_name, self.config.component_id
        );
        Ok((elapsed, info))
    }

    /// Sections, columns and web parts currently on the canvas
    pub async fn inspect_page(&self) -> E2eResult<PageInspection> {
        let value = self.page.evaluate(INSPECT_SCRIPT).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn add_section(&mut self, layout: SectionLayout) -> E2eResult<()> {
        info!("Adding {} section", layout.label());
        let page = self.page.as_ref();
        let selectors = &self.config.selectors;

        let add = selectors.add_section.as_str();
        self.retry.run("add section", || page.click(add)).await?;

        let layout = selectors.section_layout_for(layout.label());
        let layout = layout.as_str();
        self.retry.run("choose section layout", || page.click(layout)).await?;
        Ok(())
    }

    /// Add a web part to a column through the toolbox and wait for it to render
    pub async fn add_web_part(&mut self, name: &str, at: ColumnRef) -> E2eResult<Duration> {
        self.insert_web_part(name, at, None).await
    }

    /// Add the web part under test, preferring the toolbox entry that carries
    /// its component id
    pub async fn add_picanvas(&mut self, at: ColumnRef) -> E2eResult<Duration> {
        let config = self.config;
        self.insert_web_part(&config.web_part_name, at, Some(&config.component_id))
            .await
    }

    async fn insert_web_part(&mut self, name: &str, at: ColumnRef, component_id: Option<&str>) -> E2eResult<Duration> {
        info!("Adding '{}' to section {}, column {}", name, at.section, at.column);
        let page = self.page.as_ref();
        let selectors = &self.config.selectors;

        let open = selectors.column_add_for(at.section, at.column);
        let open = open.as_str();
        self.retry.run("open toolbox", || page.click(open)).await?;

        let search = selectors.toolbox_search.as_str();
        self.retry
            .run("search toolbox", || page.fill(search, name))
            .await?;

        let item = match component_id.map(|id| selectors.toolbox_item_with_id(id)) {
            Some(by_id) if self.visible(&by_id).await => by_id,
            _ => selectors.toolbox_item_for(name),
        };
        let item = item.as_str();
        self.retry.run("pick toolbox item", || page.click(item)).await?;

        let rendered = selectors.web_part_for(name);
        let rendered = rendered.as_str();
        let elapsed = self
            .poller(&format!("{} web part", name))
            .wait_ready(|| async move { PollOutcome::from_bool(page.is_visible(rendered).await.unwrap_or(false)) })
            .await?;
        info!("{} rendered after {:.1}s", name, elapsed.as_secs_f64());
        Ok(elapsed)
    }

    /// Fill the most recently added text editor
    pub async fn set_text(&mut self, text: &str) -> E2eResult<()> {
        let page = self.page.as_ref();
        let editor = self.config.selectors.text_editor.as_str();
        self.retry.run("set text", || page.fill(editor, text)).await?;
        Ok(())
    }

    /// Switch between edit and preview mode
    pub async fn toggle_preview(&mut self) -> E2eResult<()> {
        info!("Toggling preview mode");
        let page = self.page.as_ref();
        let toggle = self.config.selectors.preview_toggle.as_str();
        self.retry.run("toggle preview", || page.click(toggle)).await
    }

    /// Preview mode shows an Edit button in place of the editing chrome
    pub async fn in_preview(&self) -> bool {
        self.visible(&self.config.selectors.edit_button).await
    }

    async fn content_type_available(&self) -> bool {
        match self.page.evaluate(CONTENT_TYPE_SCRIPT).await {
            Ok(value) => is_truthy(&value),
            Err(e) => {
                debug!("content type check failed: {}", e);
                false
            }
        }
    }

    /// Open the web part's tab configuration and switch the tab to `content`.
    ///
    /// Missing pieces of the property pane are reported in the outcome rather
    /// than as errors; failing clicks on controls that are present are errors.
    pub async fn configure_tab_content(&mut self, content: TabContent) -> E2eResult<TabContentOutcome> {
        let page = self.page.as_ref();
        let selectors = &self.config.selectors;
        let mut outcome = TabContentOutcome::default();

        if !self.visible(&selectors.configure_tabs).await && self.visible(&selectors.picanvas).await {
            // Selecting the web part reveals its toolbar
            let web_part = selectors.picanvas.as_str();
            self.retry.run("select web part", || page.click(web_part)).await?;
        }
        if self.visible(&selectors.configure_tabs).await {
            let configure = selectors.configure_tabs.as_str();
            self.retry.run("configure tabs", || page.click(configure)).await?;
        } else {
            debug!("no Configure Tabs button");
        }

        outcome.content_type_found = self.content_type_available().await;
        if !outcome.content_type_found && self.visible(&selectors.tab_configuration).await {
            let group = selectors.tab_configuration.as_str();
            self.retry.run("expand tab configuration", || page.click(group)).await?;
            outcome.content_type_found = self.content_type_available().await;
        }
        if !outcome.content_type_found {
            return Ok(outcome);
        }

        let label = selectors.content_type_label.as_str();
        self.retry.run("focus content type", || page.click(label)).await?;
        let dropdown = selectors.content_type_dropdown.as_str();
        self.retry.run("open content type", || page.click(dropdown)).await?;

        let option = selectors.content_type_option_for(content.option());
        if !self.visible(&option).await {
            debug!("content type option '{}' not offered", content.option());
            return Ok(outcome);
        }
        let option = option.as_str();
        self.retry.run("choose content type", || page.click(option)).await?;
        outcome.selected = true;

        let field = if content.is_url() {
            selectors.embed_url_field.as_str()
        } else {
            selectors.content_field.as_str()
        };
        if self.visible(field).await {
            self.retry
                .run("enter tab content", || page.fill(field, content.sample()))
                .await?;
            outcome.entered = true;
        }
        Ok(outcome)
    }

    pub async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.page.screenshot(path).await
    }

    /// Every console message captured so far
    pub fn console(&mut self) -> &[ConsoleMessage] {
        self.console.drain()
    }

    pub fn console_errors(&mut self) -> Vec<ConsoleMessage> {
        self.console.errors()
    }

    /// Captured errors matching any known-bad pattern
    pub fn bad_console_errors(&mut self, patterns: &[Regex]) -> Vec<ConsoleMessage> {
        self.console.matching(patterns)
    }

    pub async fn close(self) -> E2eResult<()> {
        self.page.close().await
    }
}

/// JavaScript truthiness of an evaluated value
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(null), false)]
    #[test_case(json!(false), false)]
    #[test_case(json!(0), false)]
    #[test_case(json!(""), false)]
    #[test_case(json!(true), true)]
    #[test_case(json!(2), true)]
    #[test_case(json!("yes"), true)]
    #[test_case(json!({}), true)]
    fn truthiness(value: Value, expected: bool) {
        assert_eq!(is_truthy(&value), expected);
    }

    #[test]
    fn inspection_parses_partial_results() {
        let inspection: PageInspection = serde_json::from_value(json!({
            "totalSections": 2,
            "sections": [{"section": 1, "columns": 2, "webParts": 2}, {"section": 2, "columns": 1}]
        }))
        .unwrap();
        assert_eq!(inspection.total_sections, 2);
        assert!(inspection.has_multi_column_section());
        assert_eq!(inspection.sections[1].web_parts, 0);
    }
}
