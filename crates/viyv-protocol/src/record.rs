// SPDX-License-Identifier: MIT
//!
//! The wire record types exchanged between Server, Bridge and Worker.
//!
//! All records are tagged JSON objects (`{"type": "...", ...}`). [`Record`]
//! is the sum type; unlike a plain `#[serde(tag = "type")]` enum it never
//! fails to deserialize — an unrecognized `type` becomes [`Record::Unknown`]
//! and carries the original value, so new record kinds introduced by a newer
//! peer are silently ignored rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::ids::{AgentId, RequestId, TabId};

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: RequestId,
    pub agent_id: AgentId,
    pub tool: String,
    pub input: Value,
    pub timestamp: u64,
}

impl ToolCall {
    pub fn new(agent_id: AgentId, tool: impl Into<String>, input: Value) -> Self {
        Self {
            id: RequestId::new(),
            agent_id,
            tool: tool.into(),
            input,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub id: RequestId,
    pub agent_id: AgentId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    pub timestamp: u64,
}

impl ToolResult {
    pub fn ok(id: RequestId, agent_id: AgentId, result: Value) -> Self {
        Self {
            id,
            agent_id,
            success: true,
            result: Some(result),
            error: None,
            timestamp: now_millis(),
        }
    }

    pub fn err(id: RequestId, agent_id: AgentId, error: ToolError) -> Self {
        Self {
            id,
            agent_id,
            success: false,
            result: None,
            error: Some(error),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEvent {
    pub id: RequestId,
    pub agent_id: AgentId,
    pub event_type: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: u64,
    pub sequence_number: u64,
}

/// Shared shape of `session_init` / `session_heartbeat` / `session_recovery`
/// / `session_close` — they differ only by which `Record` variant wraps them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: RequestId,
    pub agent_id: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub timestamp: u64,
}

impl SessionRecord {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            id: RequestId::new(),
            agent_id,
            protocol_version: None,
            config: None,
            timestamp: now_millis(),
        }
    }

    pub fn with_protocol_version(mut self, v: u32) -> Self {
        self.protocol_version = Some(v);
        self
    }
}

/// One fragment of a chunk set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub request_id: RequestId,
    pub agent_id: AgentId,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub total_size: u64,
    pub compressed: bool,
    pub data: String,
}

/// The C2-only gzip envelope. Never nests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Compressed {
    pub data: String,
}

/// The sum of all record variants on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    BrowserEvent(BrowserEvent),
    SessionInit(SessionRecord),
    SessionHeartbeat(SessionRecord),
    SessionRecovery(SessionRecord),
    SessionClose(SessionRecord),
    Chunk(Chunk),
    Compressed(Compressed),
    /// A record whose `type` tag this version doesn't recognize, or a value
    /// that wasn't a JSON object at all. Carries the original value so a
    /// caller that does understand it (future protocol version) could still
    /// recover it; callers here simply ignore it.
    Unknown(Value),
}

impl Record {
    /// The literal `type` discriminant string, if this is a known variant.
    pub fn type_tag(&self) -> Option<&'static str> {
        Some(match self {
            Record::ToolCall(_) => "tool_call",
            Record::ToolResult(_) => "tool_result",
            Record::BrowserEvent(_) => "browser_event",
            Record::SessionInit(_) => "session_init",
            Record::SessionHeartbeat(_) => "session_heartbeat",
            Record::SessionRecovery(_) => "session_recovery",
            Record::SessionClose(_) => "session_close",
            Record::Chunk(_) => "chunk",
            Record::Compressed(_) => "compressed",
            Record::Unknown(_) => return None,
        })
    }

    /// Parse a decoded JSON value into a [`Record`]. Never fails: anything
    /// that isn't a recognized, well-formed record becomes [`Record::Unknown`].
    pub fn from_value(value: Value) -> Record {
        let Some(tag) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Record::Unknown(value);
        };
        let parsed = match tag.as_str() {
            "tool_call" => serde_json::from_value(value.clone()).ok().map(Record::ToolCall),
            "tool_result" => serde_json::from_value(value.clone()).ok().map(Record::ToolResult),
            "browser_event" => serde_json::from_value(value.clone()).ok().map(Record::BrowserEvent),
            "session_init" => serde_json::from_value(value.clone()).ok().map(Record::SessionInit),
            "session_heartbeat" => {
                serde_json::from_value(value.clone()).ok().map(Record::SessionHeartbeat)
            }
            "session_recovery" => {
                serde_json::from_value(value.clone()).ok().map(Record::SessionRecovery)
            }
            "session_close" => serde_json::from_value(value.clone()).ok().map(Record::SessionClose),
            "chunk" => serde_json::from_value(value.clone()).ok().map(Record::Chunk),
            "compressed" => serde_json::from_value(value.clone()).ok().map(Record::Compressed),
            _ => None,
        };
        parsed.unwrap_or(Record::Unknown(value))
    }

    /// Serialize back into the tagged JSON shape.
    pub fn into_value(self) -> Value {
        match self {
            Record::Unknown(v) => v,
            other => {
                let tag = other.type_tag().expect("non-Unknown variant has a tag");
                let mut v = match &other {
                    Record::ToolCall(r) => serde_json::to_value(r),
                    Record::ToolResult(r) => serde_json::to_value(r),
                    Record::BrowserEvent(r) => serde_json::to_value(r),
                    Record::SessionInit(r) => serde_json::to_value(r),
                    Record::SessionHeartbeat(r) => serde_json::to_value(r),
                    Record::SessionRecovery(r) => serde_json::to_value(r),
                    Record::SessionClose(r) => serde_json::to_value(r),
                    Record::Chunk(r) => serde_json::to_value(r),
                    Record::Compressed(r) => serde_json::to_value(r),
                    Record::Unknown(_) => unreachable!(),
                }
                .expect("record payload always serializes");
                if let Some(obj) = v.as_object_mut() {
                    obj.insert("type".to_string(), Value::String(tag.to_string()));
                }
                v
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_round_trips_through_record() {
        let call = ToolCall::new(AgentId::new(), "navigate", json!({"url": "https://x"}));
        let value = Record::ToolCall(call.clone()).into_value();
        assert_eq!(value["type"], "tool_call");
        match Record::from_value(value) {
            Record::ToolCall(back) => assert_eq!(back, call),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_tag_is_ignored_not_rejected() {
        let value = json!({"type": "future_record_kind", "whatever": 1});
        match Record::from_value(value.clone()) {
            Record::Unknown(v) => assert_eq!(v, value),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn missing_type_field_is_unknown() {
        let value = json!({"no_type_here": true});
        assert!(matches!(Record::from_value(value), Record::Unknown(_)));
    }

    #[test]
    fn malformed_known_type_falls_back_to_unknown() {
        // tool_call missing required fields.
        let value = json!({"type": "tool_call"});
        assert!(matches!(Record::from_value(value), Record::Unknown(_)));
    }

    #[test]
    fn session_variants_share_shape_but_distinct_tags() {
        let rec = SessionRecord::new(AgentId::new()).with_protocol_version(3);
        let init = Record::SessionInit(rec.clone()).into_value();
        let close = Record::SessionClose(rec).into_value();
        assert_eq!(init["type"], "session_init");
        assert_eq!(close["type"], "session_close");
    }

    #[test]
    fn chunk_round_trips() {
        let c = Chunk {
            request_id: RequestId::new(),
            agent_id: AgentId::new(),
            chunk_index: 1,
            total_chunks: 3,
            total_size: 2_000_000,
            compressed: true,
            data: "abc".to_string(),
        };
        let value = Record::Chunk(c.clone()).into_value();
        assert_eq!(value["type"], "chunk");
        match Record::from_value(value) {
            Record::Chunk(back) => assert_eq!(back, c),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn tool_result_error_omits_result_field() {
        let r = ToolResult::err(
            RequestId::new(),
            AgentId::new(),
            ToolError::new(crate::error::ErrorCode::TabLocked, "locked"),
        );
        let value = Record::ToolResult(r).into_value();
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_some());
    }
}
