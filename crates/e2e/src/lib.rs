//! PiCanvas Workbench Automation
//!
//! Drives the SharePoint Workbench through Playwright to exercise the
//! PiCanvas web part:
//! - Checks the local SPFx dev server and launches it when needed
//! - Controls a browser page through a Node.js Playwright bridge
//! - Runs named scenarios from a freshly loaded page, with bounded retry and
//!   readiness polling
//! - Writes a JSON report with a screenshot for every failure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  run_harness(config, options)                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ensure_dev_server() -> Option<ServeProcess>                 │
//! │  PlaywrightPage::launch() -> impl BrowserPage                │
//! │  WorkbenchSession                                            │
//! │    ├── open()                    poll: auth / prompt / canvas│
//! │    ├── wait_for_debug_manifest() poll + component id check   │
//! │    ├── add_section(layout)       retry: click, click         │
//! │    ├── add_web_part(name, at)    retry + poll: rendered      │
//! │    ├── configure_tab_content()   retry: property pane        │
//! │    ├── toggle_preview()          retry: click                │
//! │    └── inspect_page()            evaluate                    │
//! │  TestRunner                                                  │
//! │    └── run(scenarios) -> RunReport (JSON)                    │
//! │          open() before each scenario, then scenario.run()    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod workbench;

pub use browser::{BrowserPage, ConsoleBuffer, ConsoleMessage, EventHub, MessageKind, PageEvents};
pub use error::{E2eError, E2eResult};
pub use playwright::{check_playwright_installed, PlaywrightPage};
pub use runner::{plan_scenarios, run_harness, RunOptions, RunOutcome, TestRunner};
pub use scenario::Scenario;
pub use server::{ensure_dev_server, HttpProbe, ServeProcess};
pub use workbench::{
    ColumnRef, ManifestInfo, PageInspection, SectionInspection, SectionLayout, TabContent, TabContentOutcome,
    WorkbenchSession,
};
