// SPDX-License-Identifier: MIT
//!
//! Builds outbound `browser_event` records. The
//! worker emits these on its own timeline — a tab navigating, a console
//! message landing, a debugger detaching unexpectedly — independent of
//! any in-flight tool call.

use serde_json::Value;

use viyv_protocol::{AgentId, BrowserEvent, RequestId, TabId};

use crate::session::SessionSequences;

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Builds a [`BrowserEvent`] for `agent_id`, stamping it with that agent's
/// next sequence number.
pub async fn build_event(
    sequences: &SessionSequences,
    agent_id: AgentId,
    event_type: impl Into<String>,
    payload: Value,
    tab_id: Option<TabId>,
    url: Option<String>,
) -> BrowserEvent {
    let sequence_number = sequences.next(agent_id).await;
    BrowserEvent {
        id: RequestId::new(),
        agent_id,
        event_type: event_type.into(),
        payload,
        tab_id,
        url,
        timestamp: now_millis(),
        sequence_number,
    }
}
