//! Playwright browser automation
//!
//! Drives a single page through a small Node.js bridge script. The bridge
//! reads one JSON request per line on stdin and answers on stdout:
//!
//! ```text
//! -> {"id": 3, "op": "click", "args": {"selector": "button"}}
//! <- {"id": 3, "ok": true, "value": true}
//! <- {"event": "console", "level": "error", "text": "..."}
//! ```
//!
//! Requests are answered in order; console and page-error events are
//! interleaved with replies and fanned out to subscribers.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use picanvas_common::config::BrowserConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserPage, ConsoleMessage, EventHub, PageEvents};
use crate::error::{E2eError, E2eResult};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(90);
const REPLY_SLACK: Duration = Duration::from_secs(5);

const BRIDGE_TEMPLATE: &str = r#"
const playwright = require('playwright');
const readline = require('readline');

const config = __CONFIG__;
const emit = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
const describe = (e) => String((e && e.message) || e);

(async () => {
  const browserType = playwright[config.browser];
  const viewport = { width: config.viewportWidth, height: config.viewportHeight };
  let browser = null;
  let context;
  if (config.userDataDir) {
    context = await browserType.launchPersistentContext(config.userDataDir, {
      headless: config.headless,
      viewport,
      ignoreHTTPSErrors: config.ignoreHttpsErrors,
    });
  } else {
    browser = await browserType.launch({ headless: config.headless });
    context = await browser.newContext({ viewport, ignoreHTTPSErrors: config.ignoreHttpsErrors });
  }
  context.setDefaultTimeout(config.actionTimeoutMs);
  const page = context.pages()[0] || (await context.newPage());
  page.on('console', (m) => emit({ event: 'console', level: m.type(), text: m.text() }));
  page.on('pageerror', (e) => emit({ event: 'pageerror', text: describe(e) }));

  const shutdown = async () => {
    await context.close().catch(() => {});
    if (browser) await browser.close().catch(() => {});
  };

  const handlers = {
    ping: async () => true,
    goto: async (a) => { await page.goto(a.url, { waitUntil: 'domcontentloaded' }); return page.url(); },
    url: async () => page.url(),
    waitForSelector: async (a) => {
      await page.waitForSelector(a.selector, { state: 'visible', timeout: a.timeout });
      return true;
    },
    isVisible: async (a) => page.locator(a.selector).first().isVisible(),
    click: async (a) => { await page.locator(a.selector).first().click(); return true; },
    fill: async (a) => { await page.locator(a.selector).first().fill(a.text); return true; },
    evaluate: async (a) => {
      const value = await page.evaluate(a.script);
      return value === undefined ? null : value;
    },
    screenshot: async (a) => { await page.screenshot({ path: a.path, fullPage: !!a.fullPage }); return a.path; },
    close: async () => { await shutdown(); return true; },
  };

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let req;
    try { req = JSON.parse(line); } catch (e) { continue; }
    const handler = handlers[req.op];
    try {
      if (!handler) throw new Error('unknown op ' + req.op);
      emit({ id: req.id, ok: true, value: await handler(req.args || {}) });
      if (req.op === 'close') process.exit(0);
    } catch (e) {
      emit({ id: req.id, ok: false, error: describe(e) });
    }
  }
  await shutdown();
})().catch((e) => {
  emit({ event: 'fatal', text: describe(e) });
  process.exit(1);
});
"#;

/// Launch options injected into the bridge script
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeConfig<'a> {
    browser: &'a str,
    headless: bool,
    user_data_dir: Option<String>,
    viewport_width: u32,
    viewport_height: u32,
    ignore_https_errors: bool,
    action_timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'a str,
    args: Value,
}

/// One line of bridge output
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeLine {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        event: String,
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        text: String,
    },
}

#[derive(Debug)]
struct BridgeReply {
    ok: bool,
    value: Value,
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeReply>>>>;

/// Render the bridge script for a browser configuration
pub fn build_bridge_script(config: &BrowserConfig) -> E2eResult<String> {
    let bridge_config = BridgeConfig {
        browser: config.browser.as_str(),
        headless: config.headless,
        user_data_dir: config
            .user_data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
        viewport_width: config.viewport_width,
        viewport_height: config.viewport_height,
        ignore_https_errors: config.ignore_https_errors,
        action_timeout_ms: config.action_timeout_ms,
    };
    Ok(BRIDGE_TEMPLATE.replace("__CONFIG__", &serde_json::to_string(&bridge_config)?))
}

/// Check if Playwright is installed
pub async fn check_playwright_installed() -> E2eResult<()> {
    let status = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

/// A page driven through the Playwright bridge
pub struct PlaywrightPage {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    events: EventHub,
    reader: JoinHandle<()>,
    action_timeout: Duration,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Start the bridge and wait until the browser is up
    pub async fn launch(config: &BrowserConfig) -> E2eResult<Self> {
        if let Some(dir) = &config.user_data_dir {
            std::fs::create_dir_all(dir)?;
        }

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, build_bridge_script(config)?)?;

        info!(
            browser = config.browser.as_str(),
            headless = config.headless,
            "Launching Playwright bridge"
        );

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .env("NODE_PATH", node_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn {}: {}", config.node_binary, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "playwright", "{}", line);
                }
            });
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let events = EventHub::new();
        let reader = tokio::spawn(read_bridge_output(stdout, pending.clone(), events.clone()));

        let page = Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            events,
            reader,
            action_timeout: Duration::from_millis(config.action_timeout_ms),
            _script_dir: script_dir,
        };

        page.request_with_timeout("ping", json!({}), LAUNCH_TIMEOUT).await?;
        info!("Browser ready");
        Ok(page)
    }

    async fn request(&self, op: &str, args: Value) -> E2eResult<Value> {
        self.request_with_timeout(op, args, self.action_timeout + REPLY_SLACK)
            .await
    }

    async fn request_with_timeout(&self, op: &str, args: Value, limit: Duration) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&BridgeRequest { id, op, args })?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                self.pending.lock().remove(&id);
                return Err(E2eError::BridgeClosed(e.to_string()));
            }
        }

        let reply = match tokio::time::timeout(limit, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(E2eError::BridgeClosed(format!("no reply to {}", op))),
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(E2eError::Playwright(format!(
                    "{} did not answer within {}s",
                    op,
                    limit.as_secs()
                )));
            }
        };

        if reply.ok {
            Ok(reply.value)
        } else {
            Err(E2eError::Playwright(format!(
                "{}: {}",
                op,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }
}

fn node_path() -> String {
    let local = std::env::current_dir()
        .map(|d| d.join("node_modules").to_string_lossy().to_string())
        .unwrap_or_else(|_| "node_modules".to_string());
    match std::env::var("NODE_PATH") {
        Ok(existing) if !existing.is_empty() => {
            let sep = if cfg!(windows) { ";" } else { ":" };
            format!("{}{}{}", local, sep, existing)
        }
        _ => local,
    }
}

async fn read_bridge_output(
    stdout: tokio::process::ChildStdout,
    pending: Pending,
    events: EventHub,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("bridge read failed: {}", e);
                break;
            }
        };

        match serde_json::from_str::<BridgeLine>(&line) {
            Ok(BridgeLine::Reply { id, ok, value, error }) => {
                if let Some(tx) = pending.lock().remove(&id) {
                    let _ = tx.send(BridgeReply { ok, value, error });
                } else {
                    debug!(id, "reply for abandoned request");
                }
            }
            Ok(BridgeLine::Event { event, level, text }) => match event.as_str() {
                "console" => {
                    events.publish(ConsoleMessage::console(
                        level.unwrap_or_else(|| "log".to_string()),
                        text,
                    ));
                }
                "pageerror" => {
                    events.publish(ConsoleMessage::page_error(text));
                }
                "fatal" => error!("Playwright bridge failed: {}", text),
                other => debug!(event = other, "ignoring bridge event"),
            },
            Err(_) => debug!(target: "playwright", "{}", line),
        }
    }

    // Dropping the senders fails every outstanding request.
    pending.lock().clear();
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("navigate: {}", url);
        self.request("goto", json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        let value = self.request("url", json!({})).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        let timeout_ms = timeout.as_millis() as u64;
        self.request_with_timeout(
            "waitForSelector",
            json!({ "selector": selector, "timeout": timeout_ms }),
            timeout + REPLY_SLACK,
        )
        .await?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        let value = self.request("isVisible", json!({ "selector": selector })).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        debug!("click: {}", selector);
        self.request("click", json!({ "selector": selector })).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> E2eResult<()> {
        debug!("fill: {}", selector);
        self.request("fill", json!({ "selector": selector, "text": text }))
            .await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> E2eResult<Value> {
        self.request("evaluate", json!({ "script": script })).await
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.request(
            "screenshot",
            json!({ "path": path.to_string_lossy(), "fullPage": true }),
        )
        .await?;
        Ok(())
    }

    fn subscribe(&self) -> PageEvents {
        self.events.subscribe()
    }

    async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.request("close", json!({})).await {
            warn!("bridge close failed: {}", e);
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("bridge did not exit, killing");
                child.kill().await?;
            }
        }
        self.reader.abort();
        Ok(())
    }
}
