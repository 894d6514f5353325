//! Named workbench scenarios
//!
//! Each scenario builds the canvas it needs from a freshly loaded page, so
//! any subset can run in any order.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::workbench::{ColumnRef, SectionLayout, TabContent, WorkbenchSession};

/// Text typed into the rich text editor by [`Scenario::SetText`]
pub const SAMPLE_TEXT: &str = "PiCanvas automated test";

/// Name of the out-of-the-box rich text web part
pub const TEXT_WEB_PART: &str = "Text";

/// Scenarios in their default execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    WorkbenchLoads,
    DebugManifestLoaded,
    AddSection,
    AddPicanvasWebPart,
    PicanvasRenders,
    SetText,
    SectionAsTab,
    MermaidContentType,
    MarkdownContentType,
    HtmlContentType,
    EmbedContentType,
    PreviewMode,
    NoConsoleErrors,
}

impl Scenario {
    pub const ALL: [Scenario; 13] = [
        Scenario::WorkbenchLoads,
        Scenario::DebugManifestLoaded,
        Scenario::AddSection,
        Scenario::AddPicanvasWebPart,
        Scenario::PicanvasRenders,
        Scenario::SetText,
        Scenario::SectionAsTab,
        Scenario::MermaidContentType,
        Scenario::MarkdownContentType,
        Scenario::HtmlContentType,
        Scenario::EmbedContentType,
        Scenario::PreviewMode,
        Scenario::NoConsoleErrors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::WorkbenchLoads => "workbench_loads",
            Scenario::DebugManifestLoaded => "debug_manifest_loaded",
            Scenario::AddSection => "add_section",
            Scenario::AddPicanvasWebPart => "add_picanvas_web_part",
            Scenario::PicanvasRenders => "picanvas_renders",
            Scenario::SetText => "set_text",
            Scenario::SectionAsTab => "section_as_tab",
            Scenario::MermaidContentType => "mermaid_content_type",
            Scenario::MarkdownContentType => "markdown_content_type",
            Scenario::HtmlContentType => "html_content_type",
            Scenario::EmbedContentType => "embed_content_type",
            Scenario::PreviewMode => "preview_mode",
            Scenario::NoConsoleErrors => "no_console_errors",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::WorkbenchLoads => "Workbench page loads and shows the canvas",
            Scenario::DebugManifestLoaded => "Debug manifests register the PiCanvas component id",
            Scenario::AddSection => "A one-column section can be added",
            Scenario::AddPicanvasWebPart => "The web part can be added from the toolbox",
            Scenario::PicanvasRenders => "The web part is rendered on the canvas",
            Scenario::SetText => "Text can be entered into the rich text editor",
            Scenario::SectionAsTab => "Web parts in a two-column section can be shown as tabs",
            Scenario::MermaidContentType => "A tab can show a Mermaid diagram",
            Scenario::MarkdownContentType => "A tab can show Markdown",
            Scenario::HtmlContentType => "A tab can show sanitized HTML",
            Scenario::EmbedContentType => "A tab can show an embedded URL",
            Scenario::PreviewMode => "Preview mode can be toggled on and off",
            Scenario::NoConsoleErrors => "No known-bad console or page errors were captured",
        }
    }

    /// Whether the workbench is reloaded before this scenario runs.
    ///
    /// `workbench_loads` opens the page itself and `no_console_errors` only
    /// reads what earlier scenarios captured.
    pub fn needs_fresh_page(&self) -> bool {
        !matches!(self, Scenario::WorkbenchLoads | Scenario::NoConsoleErrors)
    }

    fn tab_content(&self) -> Option<TabContent> {
        match self {
            Scenario::MermaidContentType => Some(TabContent::Mermaid),
            Scenario::MarkdownContentType => Some(TabContent::Markdown),
            Scenario::HtmlContentType => Some(TabContent::Html),
            Scenario::EmbedContentType => Some(TabContent::Embed),
            _ => None,
        }
    }

    pub fn all() -> &'static [Scenario] {
        &Self::ALL
    }

    /// Resolve names and keep the default execution order; empty means all
    pub fn select<S: AsRef<str>>(names: &[S]) -> E2eResult<Vec<Scenario>> {
        if names.is_empty() {
            return Ok(Self::ALL.to_vec());
        }
        let wanted = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<E2eResult<Vec<Scenario>>>()?;
        Ok(Self::ALL.into_iter().filter(|s| wanted.contains(s)).collect())
    }

    /// Run against the session, returning details for the report
    pub async fn run(&self, session: &mut WorkbenchSession<'_>) -> E2eResult<Map<String, Value>> {
        info!("Running scenario: {}", self.name());
        let mut details = Map::new();

        match self {
            Scenario::WorkbenchLoads => {
                let elapsed = session.open().await?;
                details.insert("url".into(), json!(session.workbench_url()));
                details.insert("load_ms".into(), json!(millis(elapsed)));
            }
            Scenario::DebugManifestLoaded => {
                let (elapsed, manifests) = session.wait_for_debug_manifest().await?;
                details.insert("wait_ms".into(), json!(millis(elapsed)));
                details.insert("manifest_count".into(), json!(manifests.count));
                details.insert("component_id".into(), json!(session.config().component_id));
            }
            Scenario::AddSection => {
                session.add_section(SectionLayout::OneColumn).await?;
                details.insert("layout".into(), json!(SectionLayout::OneColumn.label()));
            }
            Scenario::AddPicanvasWebPart => {
                session.add_section(SectionLayout::OneColumn).await?;
                let elapsed = session.add_picanvas(ColumnRef::FIRST).await?;
                details.insert("web_part".into(), json!(session.config().web_part_name));
                details.insert("render_ms".into(), json!(millis(elapsed)));
            }
            Scenario::PicanvasRenders => {
                session.add_section(SectionLayout::OneColumn).await?;
                session.add_picanvas(ColumnRef::FIRST).await?;
                let config = session.config();
                let selector = &config.selectors.picanvas;
                session
                    .page()
                    .wait_for_selector(selector, config.load_timeout())
                    .await
                    .map_err(|e| {
                        E2eError::AssertionFailed(format!("{} is not visible ({}): {}", config.web_part_name, selector, e))
                    })?;
                details.insert("selector".into(), json!(selector));
            }
            Scenario::SetText => {
                session.add_section(SectionLayout::OneColumn).await?;
                session.add_web_part(TEXT_WEB_PART, ColumnRef::FIRST).await?;
                session.set_text(SAMPLE_TEXT).await?;
                details.insert("text".into(), json!(SAMPLE_TEXT));
            }
            Scenario::SectionAsTab => section_as_tab(session, &mut details).await?,
            Scenario::MermaidContentType
            | Scenario::MarkdownContentType
            | Scenario::HtmlContentType
            | Scenario::EmbedContentType => {
                let Some(content) = self.tab_content() else {
                    return Ok(details);
                };
                session.add_section(SectionLayout::OneColumn).await?;
                session.add_picanvas(ColumnRef::FIRST).await?;
                let outcome = session.configure_tab_content(content).await?;
                details.insert("content_type".into(), json!(content.option()));
                details.insert("content_type_found".into(), json!(outcome.content_type_found));
                details.insert("selected".into(), json!(outcome.selected));
                details.insert("content_entered".into(), json!(outcome.entered));
                if !outcome.content_type_found {
                    return Err(E2eError::AssertionFailed(
                        "Content Type setting not found in the property pane".into(),
                    ));
                }
                if !outcome.selected {
                    return Err(E2eError::AssertionFailed(format!(
                        "content type '{}' is not offered",
                        content.option()
                    )));
                }
            }
            Scenario::PreviewMode => {
                session.toggle_preview().await?;
                let detected = session.in_preview().await;
                session.toggle_preview().await?;
                details.insert("preview_mode_detected".into(), json!(detected));
            }
            Scenario::NoConsoleErrors => {
                let patterns = session.config().bad_console_regexes()?;
                let bad = session.bad_console_errors(&patterns);
                details.insert("console_messages".into(), json!(session.console().len()));
                if !bad.is_empty() {
                    let texts: Vec<&str> = bad.iter().map(|m| m.text.as_str()).collect();
                    return Err(E2eError::AssertionFailed(format!(
                        "{} known-bad console error(s): {}",
                        bad.len(),
                        texts.join(" | ")
                    )));
                }
            }
        }

        Ok(details)
    }
}

/// Two text web parts side by side in a two-column section, then the web
/// part under test in its own section below
async fn section_as_tab(session: &mut WorkbenchSession<'_>, details: &mut Map<String, Value>) -> E2eResult<()> {
    session.add_section(SectionLayout::TwoColumns).await?;
    for column in 1..=2 {
        session.add_web_part(TEXT_WEB_PART, ColumnRef::new(1, column)).await?;
        session.set_text(&format!("Tab {} content", column)).await?;
    }

    session.add_section(SectionLayout::OneColumn).await?;
    if let Err(e) = session.add_picanvas(ColumnRef::new(2, 1)).await {
        warn!("Could not add {} below the tabbed section: {}", session.config().web_part_name, e);
    }

    let inspection = session.inspect_page().await?;
    details.insert("sections".into(), json!(inspection.total_sections));
    details.insert("web_parts".into(), json!(inspection.total_web_parts));
    details.insert("picanvas_found".into(), json!(inspection.picanvas_found));
    if inspection.total_sections < 2 || !inspection.has_multi_column_section() {
        return Err(E2eError::AssertionFailed(format!(
            "expected a two-column section above another section, found {} section(s)",
            inspection.total_sections
        )));
    }
    Ok(())
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|sc| sc.name() == normalized)
            .ok_or_else(|| E2eError::UnknownTest(s.to_string()))
    }
}
