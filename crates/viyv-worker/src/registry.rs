// SPDX-License-Identifier: MIT
//!
//! Dispatch-by-name preamble: validates `tabId`,
//! enforces the tab lock and group ownership for CDP-dependent tools, then
//! hands off to [`BrowserDriver::dispatch`]. Grounded on the shape of
//! `sven_tools::registry` routing a call by name to a boxed handler,
//! generalized here to thread the lock/ownership/attach checks through
//! every dispatch rather than leaving them to each handler.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use viyv_protocol::{AgentId, ErrorCode, TabId, ToolError};

use crate::attach::AttachTable;
use crate::driver::BrowserDriver;
use crate::events;
use crate::refs::is_valid_ref;
use crate::ring::{EntryBuffers, ScreenshotRing};
use crate::session::SessionSequences;
use crate::tab_group::TabGroups;
use crate::tab_lock::TabLocks;
use viyv_protocol::BrowserEvent;

/// Tools that require a live CDP attach and per-tab mutual exclusion.
/// Mirrors `viyv_server::catalogue::CDP_DEPENDENT_TOOLS` — the two
/// processes keep independent copies by design: each owns its own instance,
/// with no sharing across processes.
pub const CDP_DEPENDENT_TOOLS: &[&str] = &[
    "navigate",
    "click",
    "wait_for",
    "screenshot",
    "get_console_logs",
    "get_network_requests",
];

/// The full set of tool names this worker answers for. Anything else
/// yields `UNKNOWN_TOOL`. `browser_event_subscribe`/`unsubscribe` carry no
/// CDP action of their own — they just mint (or echo back) a subscription
/// id for the Server to mirror into its own event table.
pub const KNOWN_TOOLS: &[&str] = &[
    "navigate",
    "click",
    "wait_for",
    "screenshot",
    "get_console_logs",
    "get_network_requests",
    "browser_event_subscribe",
    "browser_event_unsubscribe",
];

const DEFAULT_LOG_LIMIT: usize = 100;

fn is_cdp_dependent(tool: &str) -> bool {
    CDP_DEPENDENT_TOOLS.contains(&tool)
}

fn limit_from_input(input: &Value) -> usize {
    input.get("limit").and_then(Value::as_u64).map(|n| n as usize).unwrap_or(DEFAULT_LOG_LIMIT)
}

pub struct Dispatcher {
    pub locks: TabLocks,
    pub groups: TabGroups,
    pub attach: Arc<AttachTable>,
    pub screenshots: Mutex<ScreenshotRing>,
    pub console: Mutex<EntryBuffers>,
    pub network: Mutex<EntryBuffers>,
    pub sequences: SessionSequences,
    pub driver: Arc<dyn BrowserDriver>,
}

impl Dispatcher {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            locks: TabLocks::new(),
            groups: TabGroups::new(),
            attach: Arc::new(AttachTable::new()),
            screenshots: Mutex::new(ScreenshotRing::new()),
            console: Mutex::new(EntryBuffers::new()),
            network: Mutex::new(EntryBuffers::new()),
            sequences: SessionSequences::new(),
            driver,
        }
    }

    /// Builds a `browser_event` on the worker's own timeline, stamped with
    /// the next sequence number for `agent_id`.
    pub async fn emit_event(
        &self,
        agent_id: AgentId,
        event_type: impl Into<String>,
        payload: Value,
        tab_id: Option<TabId>,
        url: Option<String>,
    ) -> BrowserEvent {
        events::build_event(&self.sequences, agent_id, event_type, payload, tab_id, url).await
    }

    /// Called on the worker's own timeline as console/network entries
    /// arrive from the browser, independent of any tool call.
    pub async fn record_console_entry(&self, tab_id: TabId, entry: Value) {
        self.console.lock().await.push(tab_id, entry);
    }

    pub async fn record_network_entry(&self, tab_id: TabId, entry: Value) {
        self.network.lock().await.push(tab_id, entry);
    }

    /// `session_close`: drop the agent's tab group and purge its buffers.
    pub async fn close_session(&self, agent_id: AgentId) {
        let tabs = self.groups.remove_group(agent_id).await;
        for tab_id in tabs {
            self.console.lock().await.purge_tab(tab_id);
            self.network.lock().await.purge_tab(tab_id);
        }
        self.sequences.forget(agent_id).await;
    }

    /// Run the dispatch preamble for `tool_call` and, on success, the
    /// handler itself. The lock (if taken) is always released afterward,
    /// regardless of outcome.
    pub async fn dispatch(&self, agent_id: AgentId, tool: &str, input: Value) -> Result<Value, ToolError> {
        let tab_id = match input.get("tabId") {
            Some(value) => match TabId::from_json(value) {
                Some(tab_id) => Some(tab_id),
                None => return Err(ToolError::new(ErrorCode::InvalidParams, "tabId must be a finite non-negative number")),
            },
            None => None,
        };

        if !KNOWN_TOOLS.contains(&tool) {
            return Err(ToolError::new(ErrorCode::UnknownTool, format!("no handler for tool `{tool}`")));
        }

        if let Some(reference) = input.get("ref").and_then(Value::as_str) {
            if !is_valid_ref(reference) {
                return Err(ToolError::new(ErrorCode::InvalidParams, "ref does not match the expected ref_<n> shape"));
            }
        }

        let cdp_dependent = is_cdp_dependent(tool);
        let locked_tab = if cdp_dependent { tab_id } else { None };

        if let Some(tab_id) = locked_tab {
            if !self.locks.acquire(tab_id, agent_id).await {
                return Err(ToolError::new(ErrorCode::TabLocked, format!("tab {tab_id} is locked by another agent")));
            }
        }

        let result = self.dispatch_locked(agent_id, tool, tab_id, cdp_dependent, input).await;

        if let Some(tab_id) = locked_tab {
            self.locks.release(tab_id, agent_id).await;
        }

        result
    }

    async fn dispatch_locked(
        &self,
        agent_id: AgentId,
        tool: &str,
        tab_id: Option<TabId>,
        cdp_dependent: bool,
        input: Value,
    ) -> Result<Value, ToolError> {
        if let Some(tab_id) = tab_id {
            let owned = self.groups.owns(agent_id, tab_id).await;
            if !owned {
                // First touch of a tab claims it for the calling agent;
                // a tab already claimed by someone else is always denied.
                if !self.groups.bind(agent_id, "", tab_id).await {
                    return Err(ToolError::new(ErrorCode::TabAccessDenied, format!("tab {tab_id} belongs to another agent")));
                }
            }
        }

        // Buffer reads answer straight from the ring rather than attaching
        // CDP; the lock above still serializes them against other tab ops.
        match tool {
            "get_console_logs" => {
                let tab_id = tab_id.ok_or_else(|| ToolError::new(ErrorCode::InvalidParams, "get_console_logs requires tabId"))?;
                let entries = self.console.lock().await.for_tab(tab_id, limit_from_input(&input));
                return Ok(json!({ "entries": entries }));
            }
            "get_network_requests" => {
                let tab_id = tab_id.ok_or_else(|| ToolError::new(ErrorCode::InvalidParams, "get_network_requests requires tabId"))?;
                let entries = self.network.lock().await.for_tab(tab_id, limit_from_input(&input));
                return Ok(json!({ "entries": entries }));
            }
            "browser_event_subscribe" => {
                let event_types = input
                    .get("eventTypes")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>())
                    .unwrap_or_default();
                let url_pattern = input.get("urlPattern").and_then(Value::as_str).map(str::to_string);
                return Ok(json!({
                    "subscriptionId": uuid::Uuid::new_v4().to_string(),
                    "eventTypes": event_types,
                    "urlPattern": url_pattern,
                }));
            }
            "browser_event_unsubscribe" => {
                let subscription_id = input.get("subscriptionId").and_then(Value::as_str).map(str::to_string);
                return Ok(json!({ "subscriptionId": subscription_id }));
            }
            _ => {}
        }

        if !cdp_dependent {
            return self.driver.dispatch(tab_id, tool, input).await;
        }

        let tab_id = tab_id.ok_or_else(|| ToolError::new(ErrorCode::InvalidParams, format!("{tool} requires tabId")))?;
        self.attach.ensure_attached(tab_id, self.driver.as_ref()).await?;
        self.attach.begin_command(tab_id).await;
        let outcome = self.driver.dispatch(Some(tab_id), tool, input).await;
        self.attach.end_command(tab_id, Arc::clone(&self.driver)).await;

        if tool == "screenshot" {
            if let Ok(value) = &outcome {
                if let (Some(image_id), Some(data)) = (value.get("imageId").and_then(Value::as_str), value.get("data").and_then(Value::as_str)) {
                    self.screenshots.lock().await.push(image_id, data);
                }
            }
        }

        outcome
    }
}
