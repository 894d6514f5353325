//! Scripted in-memory browser page for session and runner tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use picanvas_e2e::browser::{BrowserPage, ConsoleMessage, EventHub, PageEvents};
use picanvas_e2e::{E2eError, E2eResult};
use serde_json::Value;

#[derive(Default)]
pub struct PageState {
    /// Where every navigation ends up instead of the requested URL
    pub redirect: Option<String>,
    pub url: String,
    pub visible: HashSet<String>,
    /// Remaining forced failures per selector, for clicks and fills
    pub failures: HashMap<String, u32>,
    /// Selectors that become visible after clicking the key
    pub reveals: HashMap<String, Vec<String>>,
    /// Selectors that disappear once clicked
    pub dismissable: HashSet<String>,
    /// Result of any script without a more specific match
    pub evaluate_result: Value,
    /// (script fragment, result) pairs checked in order
    pub evaluations: Vec<(String, Value)>,
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
    pub screenshots: Vec<PathBuf>,
    pub closed: bool,
}

#[derive(Clone)]
pub struct FakePage {
    pub state: Arc<Mutex<PageState>>,
    events: EventHub,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState::default())),
            events: EventHub::new(),
        }
    }

    pub fn show(&self, selector: &str) -> &Self {
        self.state.lock().visible.insert(selector.to_string());
        self
    }

    pub fn fail(&self, selector: &str, times: u32) -> &Self {
        self.state.lock().failures.insert(selector.to_string(), times);
        self
    }

    pub fn reveal_on_click(&self, clicked: &str, shown: &str) -> &Self {
        self.state
            .lock()
            .reveals
            .entry(clicked.to_string())
            .or_default()
            .push(shown.to_string());
        self
    }

    /// Answer scripts containing `fragment` with `result`
    pub fn on_evaluate(&self, fragment: &str, result: Value) -> &Self {
        self.state.lock().evaluations.push((fragment.to_string(), result));
        self
    }

    pub fn emit(&self, message: ConsoleMessage) {
        self.events.publish(message);
    }

    pub fn clicks_on(&self, selector: &str) -> usize {
        self.state.lock().clicks.iter().filter(|c| *c == selector).count()
    }

    fn take_failure(state: &mut PageState, selector: &str) -> E2eResult<()> {
        if let Some(remaining) = state.failures.get_mut(selector) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(E2eError::Playwright(format!(
                    "element not interactable: {} ({} left)",
                    selector, *remaining
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        state.url = state.redirect.clone().unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        if self.state.lock().visible.contains(selector) {
            Ok(())
        } else {
            Err(E2eError::Playwright(format!(
                "timeout {}ms waiting for {}",
                timeout.as_millis(),
                selector
            )))
        }
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        Ok(self.state.lock().visible.contains(selector))
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.clicks.push(selector.to_string());
        Self::take_failure(&mut state, selector)?;
        if state.dismissable.contains(selector) {
            state.visible.remove(selector);
        }
        if let Some(shown) = state.reveals.get(selector).cloned() {
            state.visible.extend(shown);
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        Self::take_failure(&mut state, selector)?;
        state.fills.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> E2eResult<Value> {
        let state = self.state.lock();
        let matched = state
            .evaluations
            .iter()
            .find(|(fragment, _)| script.contains(fragment.as_str()))
            .map(|(_, result)| result.clone());
        Ok(matched.unwrap_or_else(|| state.evaluate_result.clone()))
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.state.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }

    fn subscribe(&self) -> PageEvents {
        self.events.subscribe()
    }

    async fn close(&self) -> E2eResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}
