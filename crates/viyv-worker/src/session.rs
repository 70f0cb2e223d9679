// SPDX-License-Identifier: MIT
//!
//! Session lifecycle bookkeeping for the worker: per-agent event sequence
//! numbers, and the persisted tab-group state restored across a
//! `session_recovery`.
//!
//! The on-disk shape is `{sessions: {agentId -> {agentId, agentName,
//! groupId, color, tabs, status, lastActivity}}}`, accepting both array
//! and map shapes for forward compatibility — handled here with
//! a custom [`Deserialize`] rather than two parallel schemas.

use std::collections::HashMap;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use viyv_protocol::{AgentId, TabId};

use crate::error::WorkerError;
use crate::tab_group::TabGroups;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub agent_id: AgentId,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub tabs: Vec<TabId>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub last_activity: u64,
}

fn default_status() -> String {
    "active".to_string()
}

/// The `sessions` map, accepting either shape on input: an array of
/// entries each carrying their own `agentId`, or an object keyed by
/// `agentId` whose value omits it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PersistedSessions(pub Vec<PersistedSession>);

impl<'de> Deserialize<'de> for PersistedSessions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let sessions = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(DeError::custom))
                .collect::<Result<Vec<PersistedSession>, D::Error>>()?,
            Value::Object(map) => map
                .into_iter()
                .map(|(key, mut body)| {
                    let agent_uuid: uuid::Uuid = key.parse().map_err(DeError::custom)?;
                    if let Some(obj) = body.as_object_mut() {
                        obj.entry("agentId").or_insert_with(|| Value::String(key.clone()));
                    }
                    let mut parsed: PersistedSession = serde_json::from_value(body).map_err(DeError::custom)?;
                    parsed.agent_id = AgentId(agent_uuid);
                    Ok(parsed)
                })
                .collect::<Result<Vec<PersistedSession>, D::Error>>()?,
            other => return Err(DeError::custom(format!("expected sessions array or object, got {other}"))),
        };
        Ok(PersistedSessions(sessions))
    }
}

/// Top-level persisted document: `{"sessions": {...}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub sessions: PersistedSessions,
}

/// Loads the persisted session document from disk, if present. A missing
/// file is not an error — a fresh worker simply starts with no groups.
pub async fn load_state(path: &std::path::Path) -> Result<PersistedState, WorkerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(PersistedState::default()),
        Err(err) => Err(err.into()),
    }
}

pub async fn save_state(path: &std::path::Path, state: &PersistedState) -> Result<(), WorkerError> {
    let bytes = serde_json::to_vec_pretty(state)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Re-binds an agent's tab group from persisted state (`session_recovery`).
/// Tabs that are already owned by a different agent are skipped rather
/// than stolen.
pub async fn restore_session(groups: &TabGroups, session: &PersistedSession) {
    for &tab_id in &session.tabs {
        groups.bind(session.agent_id, &session.agent_name, tab_id).await;
    }
}

/// Builds the document to persist from the current live tab groups, for
/// writing back out with [`save_state`] before a clean shutdown.
pub async fn snapshot(groups: &TabGroups) -> PersistedState {
    let sessions = groups
        .snapshot()
        .await
        .into_iter()
        .map(|(agent_id, group)| PersistedSession {
            agent_id,
            agent_name: group.agent_name,
            group_id: group.group_id,
            color: group.color,
            tabs: group.tabs.into_iter().collect(),
            status: default_status(),
            last_activity: 0,
        })
        .collect();
    PersistedState {
        sessions: PersistedSessions(sessions),
    }
}

/// Per-agent event sequence counters, assigning an incrementing
/// `sequenceNumber` per session. Not part of the persisted
/// shape; a fresh worker process starts every agent back at zero.
#[derive(Default)]
pub struct SessionSequences {
    counters: Mutex<HashMap<AgentId, u64>>,
}

impl SessionSequences {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn next(&self, agent_id: AgentId) -> u64 {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(agent_id).or_insert(0);
        *counter += 1;
        *counter
    }

    pub async fn forget(&self, agent_id: AgentId) {
        self.counters.lock().await.remove(&agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_array_shape() {
        let value = json!({"sessions": [
            {"agentId": "3fa85f64-5717-4562-b3fc-2c963f66afa6", "agentName": "agent-a", "groupId": "g1", "color": "blue", "tabs": [1, 2], "status": "active", "lastActivity": 5}
        ]});
        let parsed: PersistedState = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.sessions.0.len(), 1);
        assert_eq!(parsed.sessions.0[0].tabs, vec![TabId(1), TabId(2)]);
        assert_eq!(parsed.sessions.0[0].agent_name, "agent-a");
    }

    #[test]
    fn deserializes_map_shape_keyed_by_agent_id() {
        let value = json!({"sessions": {
            "3fa85f64-5717-4562-b3fc-2c963f66afa6": {"agentName": "agent-a", "groupId": "g1", "color": "blue", "tabs": [7], "status": "active", "lastActivity": 9}
        }});
        let parsed: PersistedState = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.sessions.0.len(), 1);
        assert_eq!(parsed.sessions.0[0].tabs, vec![TabId(7)]);
        assert_eq!(parsed.sessions.0[0].agent_id.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[test]
    fn missing_optional_fields_default_rather_than_fail() {
        let value = json!({"sessions": [{"agentId": "3fa85f64-5717-4562-b3fc-2c963f66afa6"}]});
        let parsed: PersistedState = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.sessions.0[0].status, "active");
        assert!(parsed.sessions.0[0].tabs.is_empty());
    }

    #[test]
    fn rejects_non_object_non_array_sessions_shape() {
        let value = json!({"sessions": "nonsense"});
        let result: Result<PersistedState, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn restore_session_binds_its_persisted_tabs() {
        let groups = TabGroups::new();
        let session = PersistedSession {
            agent_id: AgentId::new(),
            agent_name: "agent-a".to_string(),
            group_id: "g1".to_string(),
            color: "blue".to_string(),
            tabs: vec![TabId(1), TabId(2)],
            status: "active".to_string(),
            last_activity: 0,
        };
        restore_session(&groups, &session).await;
        assert!(groups.owns(session.agent_id, TabId(1)).await);
        assert!(groups.owns(session.agent_id, TabId(2)).await);
    }

    #[tokio::test]
    async fn missing_state_file_loads_as_empty_rather_than_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let state = load_state(&path).await.unwrap();
        assert!(state.sessions.0.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let state = PersistedState {
            sessions: PersistedSessions(vec![PersistedSession {
                agent_id: AgentId::new(),
                agent_name: "agent-a".to_string(),
                group_id: "g1".to_string(),
                color: "blue".to_string(),
                tabs: vec![TabId(3)],
                status: "active".to_string(),
                last_activity: 42,
            }]),
        };
        save_state(&path, &state).await.unwrap();
        let loaded = load_state(&path).await.unwrap();
        assert_eq!(loaded.sessions.0.len(), 1);
        assert_eq!(loaded.sessions.0[0].tabs, vec![TabId(3)]);
    }

    #[tokio::test]
    async fn sequence_numbers_increment_per_agent_independently() {
        let sequences = SessionSequences::new();
        let a = AgentId::new();
        let b = AgentId::new();
        assert_eq!(sequences.next(a).await, 1);
        assert_eq!(sequences.next(a).await, 2);
        assert_eq!(sequences.next(b).await, 1);
    }
}
