// SPDX-License-Identifier: MIT
//!
//! The seam between the dispatch/locking machinery in this crate and the
//! concrete browser-control actions this workspace deliberately does not
//! implement itself (click, screenshot, navigate, page-scraping, GIF
//! encoding). A real
//! extension host implements [`BrowserDriver`] against the browser's
//! debugger APIs; `viyv-worker-sim` implements it against nothing for tests.

use async_trait::async_trait;
use serde_json::Value;

use viyv_protocol::{TabId, ToolError};

/// The concrete actions a tab can perform once the CDP debugger is
/// attached. Everything but `attach`/`detach` is opaque by design — the
/// dispatcher hands `tool` and `input` straight through and returns
/// whatever JSON comes back.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn attach(&self, tab_id: TabId) -> Result<(), ToolError>;
    async fn detach(&self, tab_id: TabId) -> Result<(), ToolError>;
    async fn dispatch(&self, tab_id: Option<TabId>, tool: &str, input: Value) -> Result<Value, ToolError>;
}
