//! Harness configuration
//!
//! Loaded once at startup from a TOML file (defaults when the file is
//! missing) and passed by reference to whatever needs it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logs::LogRoot;
use crate::retry::RetryPolicy;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "picanvas.toml";

/// Manifest bundle written by `npm run serve`
pub const DEBUG_MANIFESTS_URL: &str = "https://localhost:4321/temp/build/manifests.js";

/// Environment variable replacing the serve command line
pub const SERVE_COMMAND_ENV: &str = "PICANVAS_SERVE_COMMAND";

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Tenant used when none is given on the command line
    pub default_tenant: Option<String>,

    /// Directory for reports and screenshots
    pub output_dir: Option<PathBuf>,

    /// Tenant key -> site metadata
    pub tenants: BTreeMap<String, TenantConfig>,

    pub workbench: WorkbenchConfig,
    pub serve: ServeConfig,
    pub browser: BrowserConfig,
    pub logs: LogCollectorConfig,
}

/// A SharePoint site the workbench can be opened on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Site URL without trailing slash, e.g. `https://contoso.sharepoint.com/sites/dev`
    pub site_url: String,

    #[serde(default)]
    pub display_name: Option<String>,
}

impl TenantConfig {
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into().trim_end_matches('/').to_string(),
            display_name: None,
        }
    }
}

/// Workbench behaviour, timeouts and markup hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Path of the workbench page relative to the site URL
    pub path: String,

    /// Debug manifests served by the local dev server
    pub debug_manifests_url: String,

    /// Load the web part from the local dev server instead of the app catalog
    pub load_debug_manifests: bool,

    /// Display name of the web part under test
    pub web_part_name: String,

    /// Manifest id the debug manifests must register for the web part
    pub component_id: String,

    pub load_timeout_secs: u64,

    /// Budget for an operator to finish signing in when running headed
    pub auth_timeout_secs: u64,

    pub poll_interval_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,

    /// URL patterns that indicate an authentication redirect
    pub auth_url_patterns: Vec<String>,

    /// Console/page error patterns treated as failures
    pub bad_console_patterns: Vec<String>,

    pub selectors: WorkbenchSelectors,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            path: "/_layouts/15/workbench.aspx".to_string(),
            debug_manifests_url: DEBUG_MANIFESTS_URL.to_string(),
            load_debug_manifests: true,
            web_part_name: "PiCanvas".to_string(),
            component_id: "6bcd9bfc-425b-47c2-8e5e-c17eb1c864c5".to_string(),
            load_timeout_secs: 60,
            auth_timeout_secs: 300,
            poll_interval_ms: 1000,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            auth_url_patterns: vec![
                r"login\.microsoftonline\.com".to_string(),
                r"login\.live\.com".to_string(),
                r"/_forms/default\.aspx".to_string(),
                r"/adfs/ls".to_string(),
            ],
            bad_console_patterns: vec![
                r"(?i)picanvas".to_string(),
                r"Uncaught".to_string(),
                r"Failed to load (component|entry point)".to_string(),
                r"ChunkLoadError".to_string(),
            ],
            selectors: WorkbenchSelectors::default(),
        }
    }
}

impl WorkbenchConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn auth_patterns(&self) -> Result<Vec<Regex>> {
        compile_patterns(&self.auth_url_patterns)
    }

    pub fn bad_console_regexes(&self) -> Result<Vec<Regex>> {
        compile_patterns(&self.bad_console_patterns)
    }
}

/// Selectors for workbench UI elements.
///
/// These target markup owned by SharePoint and may change without notice.
/// Templates expand `{name}` (web part name), `{id}` (component id),
/// `{layout}` (section layout label), `{option}` (dropdown option) and the
/// zero-based `{section}`/`{column}` indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchSelectors {
    pub canvas: String,
    pub debug_scripts_accept: String,
    pub add_section: String,
    pub section_layout: String,
    pub column_add_web_part: String,
    pub toolbox_search: String,
    pub toolbox_item: String,
    pub toolbox_item_by_id: String,
    pub web_part: String,
    pub picanvas: String,
    pub text_editor: String,
    pub preview_toggle: String,
    pub edit_button: String,
    pub configure_tabs: String,
    pub tab_configuration: String,
    pub content_type_label: String,
    pub content_type_dropdown: String,
    pub content_type_option: String,
    pub content_field: String,
    pub embed_url_field: String,
}

impl Default for WorkbenchSelectors {
    fn default() -> Self {
        Self {
            canvas: "[data-automation-id='CanvasZone']".to_string(),
            debug_scripts_accept: "button:has-text('Load debug scripts')".to_string(),
            add_section: "button[aria-label*='Add a new section'] >> nth=0".to_string(),
            section_layout: "button:has-text('{layout}') >> nth=0".to_string(),
            column_add_web_part: "[data-automation-id='CanvasZone'] >> nth={section} >> \
                                  [data-automation-id='CanvasSection'] >> nth={column} >> \
                                  button[aria-label*='Add'] >> nth=0"
                .to_string(),
            toolbox_search: "input[data-automation-id='searchBox']".to_string(),
            toolbox_item: "button:has-text('{name}') >> nth=0".to_string(),
            toolbox_item_by_id: "[data-sp-component-id='{id}' i], [data-sp-componentid='{id}' i] >> nth=0"
                .to_string(),
            web_part: "[data-automation-id='WebPartWrapper'] [class*='{name}' i] >> nth=-1".to_string(),
            picanvas: "[class*='piCanvas'], [class*='hillbilly'] >> nth=0".to_string(),
            text_editor: "[data-automation-id='textEditor'], .ck-editor__editable, [contenteditable='true'] >> nth=-1"
                .to_string(),
            preview_toggle: "button[data-automation-id='previewModeToggle']".to_string(),
            edit_button: "button:has-text('Edit') >> nth=0".to_string(),
            configure_tabs: "button:has-text('Configure Tabs'), a:has-text('Configure Tabs') >> nth=0".to_string(),
            tab_configuration: "button:has-text('Tab Configuration') >> nth=0".to_string(),
            content_type_label: "text=Content Type".to_string(),
            content_type_dropdown: ".ms-Dropdown >> nth=0".to_string(),
            content_type_option: "button:has-text('{option}'), span:has-text('{option}') >> nth=0".to_string(),
            content_field: "textarea >> nth=0".to_string(),
            embed_url_field: "input[type='text'], input.ms-TextField-field >> nth=0".to_string(),
        }
    }
}

impl WorkbenchSelectors {
    pub fn section_layout_for(&self, layout: &str) -> String {
        self.section_layout.replace("{layout}", layout)
    }

    /// Add button of a column; `section` and `column` are 1-based
    pub fn column_add_for(&self, section: usize, column: usize) -> String {
        self.column_add_web_part
            .replace("{section}", &section.saturating_sub(1).to_string())
            .replace("{column}", &column.saturating_sub(1).to_string())
    }

    pub fn toolbox_item_for(&self, name: &str) -> String {
        self.toolbox_item.replace("{name}", name)
    }

    pub fn toolbox_item_with_id(&self, id: &str) -> String {
        self.toolbox_item_by_id.replace("{id}", id)
    }

    pub fn web_part_for(&self, name: &str) -> String {
        self.web_part.replace("{name}", name)
    }

    pub fn content_type_option_for(&self, option: &str) -> String {
        self.content_type_option.replace("{option}", option)
    }
}

/// Local SPFx dev server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,

    /// URL probed to decide whether the dev server is up
    pub probe_url: String,
    pub probe_timeout_ms: u64,
    pub startup_timeout_secs: u64,

    /// Launch the serve command when the probe fails
    pub auto_start: bool,
    pub shutdown_grace_secs: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            command: "npm".to_string(),
            args: vec!["run".to_string(), "serve".to_string()],
            working_dir: PathBuf::from("."),
            probe_url: DEBUG_MANIFESTS_URL.to_string(),
            probe_timeout_ms: 2000,
            startup_timeout_secs: 120,
            auto_start: true,
            shutdown_grace_secs: 5,
        }
    }
}

impl ServeConfig {
    /// Full command line, for display and remediation messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replace the command and its arguments with a shell-style command line
    pub fn set_command_line(&mut self, line: &str) -> Result<()> {
        let mut words = shlex::split(line)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| Error::InvalidConfig(format!("cannot parse serve command '{}'", line)))?
            .into_iter();
        self.command = words
            .next()
            .ok_or_else(|| Error::InvalidConfig("serve command is empty".to_string()))?;
        self.args = words.collect();
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(Error::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: BrowserKind,
    pub headless: bool,

    /// Persistent profile directory; keeps the SharePoint sign-in between runs
    pub user_data_dir: Option<PathBuf>,

    pub viewport_width: u32,
    pub viewport_height: u32,
    pub ignore_https_errors: bool,
    pub node_binary: String,

    /// Per-command timeout applied inside the browser bridge
    pub action_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            user_data_dir: Some(default_state_dir().join("browser-profile")),
            viewport_width: 1280,
            viewport_height: 720,
            ignore_https_errors: true,
            node_binary: "node".to_string(),
            action_timeout_ms: 10_000,
        }
    }
}

/// Extension log collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCollectorConfig {
    /// Extension directories to scan, each tagged with its VS Code channel
    pub roots: Vec<LogRoot>,

    /// Extension directory name prefix, e.g. `publisher.picanvas`
    pub extension_prefix: String,

    /// JSON log store
    pub store_path: PathBuf,

    /// Analytics server base URL; entries go to [`ANALYTICS_LOG_PATH`] below it
    pub analytics_server: String,
}

impl Default for LogCollectorConfig {
    fn default() -> Self {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            roots: vec![
                LogRoot::new("stable", home.join(".vscode").join("extensions")),
                LogRoot::new("insiders", home.join(".vscode-insiders").join("extensions")),
            ],
            extension_prefix: "picanvas".to_string(),
            store_path: default_state_dir().join("vscode-logs.json"),
            analytics_server: "http://localhost:4200".to_string(),
        }
    }
}

impl LogCollectorConfig {
    pub fn analytics_url(&self) -> String {
        analytics_log_url(&self.analytics_server)
    }
}

/// Endpoint path receiving one log entry per POST
pub const ANALYTICS_LOG_PATH: &str = "/api/analytics/vscode/log";

pub fn analytics_log_url(server: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), ANALYTICS_LOG_PATH)
}

impl HarnessConfig {
    /// Load configuration from file, or defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that patterns compile, intervals are usable and tenant URLs look right
    pub fn validate(&self) -> Result<()> {
        self.workbench.auth_patterns()?;
        self.workbench.bad_console_regexes()?;
        if self.workbench.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "workbench.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.workbench.retry_attempts == 0 {
            return Err(Error::InvalidConfig(
                "workbench.retry_attempts must be at least 1".to_string(),
            ));
        }
        for (key, tenant) in &self.tenants {
            if !tenant.site_url.starts_with("https://") && !tenant.site_url.starts_with("http://") {
                return Err(Error::InvalidConfig(format!(
                    "tenant '{}' site_url must be an http(s) URL, got '{}'",
                    key, tenant.site_url
                )));
            }
        }
        if let Some(default) = &self.default_tenant {
            if !self.tenants.contains_key(default) {
                return Err(Error::UnknownTenant(default.clone()));
            }
        }
        Ok(())
    }

    /// Resolve a tenant by key, falling back to the default tenant
    pub fn tenant(&self, key: Option<&str>) -> Result<(&str, &TenantConfig)> {
        let key = key
            .or(self.default_tenant.as_deref())
            .or_else(|| self.tenants.keys().next().map(String::as_str))
            .ok_or_else(|| Error::InvalidConfig("no tenants configured".to_string()))?;

        self.tenants
            .get_key_value(key)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| Error::UnknownTenant(key.to_string()))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("test-results"))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| Error::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Directory for harness state (profiles, log store)
pub fn default_state_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".picanvas")
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
