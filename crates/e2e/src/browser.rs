//! Browser automation capability and console capture
//!
//! The workbench session only talks to the page through [`BrowserPage`].
//! Console output arrives on an explicit subscription handle ([`PageEvents`])
//! and is drained on demand into a [`ConsoleBuffer`] owned by the session.
//! Subscriptions are unbounded: a noisy page never pushes out messages the
//! buffer has not drained yet.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::E2eResult;

/// Source of a captured message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Console,
    PageError,
}

/// A console message or uncaught page error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub kind: MessageKind,
    /// Console level (`log`, `warning`, `error`, ...); `error` for page errors
    pub level: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleMessage {
    pub fn console(level: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Console,
            level: level.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn page_error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::PageError,
            level: "error".to_string(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Page errors, `error`-level messages and any message mentioning an error
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::PageError
            || self.level == "error"
            || self.text.to_lowercase().contains("error")
    }
}

/// Fan-out of page events to every live subscription
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ConsoleMessage>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to every subscriber, forgetting those that were dropped
    pub fn publish(&self, message: ConsoleMessage) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(message.clone()).is_ok());
    }

    /// Receive everything published from now on
    pub fn subscribe(&self) -> PageEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        PageEvents::new(rx)
    }
}

/// Subscription handle for page events
pub struct PageEvents {
    rx: mpsc::UnboundedReceiver<ConsoleMessage>,
}

impl PageEvents {
    pub fn new(rx: mpsc::UnboundedReceiver<ConsoleMessage>) -> Self {
        Self { rx }
    }

    /// Take every message currently queued without waiting
    pub fn try_drain(&mut self) -> Vec<ConsoleMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Append-only buffer of captured messages
pub struct ConsoleBuffer {
    events: PageEvents,
    messages: Vec<ConsoleMessage>,
}

impl ConsoleBuffer {
    pub fn new(events: PageEvents) -> Self {
        Self {
            events,
            messages: Vec::new(),
        }
    }

    /// Pull pending messages from the subscription into the buffer
    pub fn drain(&mut self) -> &[ConsoleMessage] {
        let pending = self.events.try_drain();
        self.messages.extend(pending);
        &self.messages
    }

    pub fn errors(&mut self) -> Vec<ConsoleMessage> {
        self.drain().iter().filter(|m| m.is_error()).cloned().collect()
    }

    /// Error messages matching any of `patterns`
    pub fn matching(&mut self, patterns: &[Regex]) -> Vec<ConsoleMessage> {
        self.drain()
            .iter()
            .filter(|m| m.is_error())
            .filter(|m| patterns.iter().any(|p| p.is_match(&m.text)))
            .cloned()
            .collect()
    }
}

/// The browser-automation capability consumed by the harness
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    async fn current_url(&self) -> E2eResult<String>;

    /// Wait for `selector` to become visible, failing after `timeout`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()>;

    /// Single observation; never waits
    async fn is_visible(&self, selector: &str) -> E2eResult<bool>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    async fn fill(&self, selector: &str, text: &str) -> E2eResult<()>;

    /// Evaluate a JavaScript expression in the page
    async fn evaluate(&self, script: &str) -> E2eResult<serde_json::Value>;

    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    /// Subscribe to console messages and page errors emitted from now on
    fn subscribe(&self) -> PageEvents;

    async fn close(&self) -> E2eResult<()>;
}
