// SPDX-License-Identifier: MIT
//!
//! The agent session table. Grounded on
//! `sven-node::control::service::ControlService`'s `sessions: HashMap<Uuid, Session>`,
//! generalized with a periodic sweeper that table doesn't have.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use viyv_protocol::{AgentId, SessionToken};

/// Sessions idle longer than this are pruned by the 60s sweeper.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Idle,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct AgentSession {
    pub agent_id: AgentId,
    pub session_token: SessionToken,
    pub agent_name: String,
    pub status: SessionStatus,
    pub last_activity: Instant,
    pub created_at: Instant,
}

#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<AgentId, AgentSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `session_init` / `session_recovery`: create the entry if absent,
    /// otherwise revive it (mark active, touch activity).
    pub async fn init_or_revive(&self, agent_id: AgentId, agent_name: String) -> SessionToken {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let session = sessions.entry(agent_id).or_insert_with(|| AgentSession {
            agent_id,
            session_token: SessionToken::new(),
            agent_name: agent_name.clone(),
            status: SessionStatus::Active,
            last_activity: now,
            created_at: now,
        });
        session.status = SessionStatus::Active;
        session.last_activity = now;
        session.agent_name = agent_name;
        session.session_token
    }

    /// Any inbound record bearing an agent id touches `lastActivity`.
    pub async fn touch(&self, agent_id: AgentId) {
        if let Some(session) = self.sessions.lock().await.get_mut(&agent_id) {
            session.last_activity = Instant::now();
            session.status = SessionStatus::Active;
        }
    }

    /// `session_close`: removes the entry outright.
    pub async fn close(&self, agent_id: AgentId) -> Option<AgentSession> {
        self.sessions.lock().await.remove(&agent_id)
    }

    pub async fn get(&self, agent_id: AgentId) -> Option<AgentSession> {
        self.sessions.lock().await.get(&agent_id).cloned()
    }

    /// Prune entries idle for more than [`IDLE_TIMEOUT`], returning their
    /// agent ids so the caller can also purge their event subscriptions.
    pub async fn sweep(&self, now: Instant) -> Vec<AgentId> {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<AgentId> = sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_activity) > IDLE_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}
