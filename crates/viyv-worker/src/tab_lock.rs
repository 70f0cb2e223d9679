// SPDX-License-Identifier: MIT
//!
//! The per-tab mutual-exclusion table. Grounded on the same
//! `HashMap`-behind-a-mutex shape as every other table in this workspace,
//! plain `std::collections` over a dedicated locking crate the same way
//! `GdbSessionState` and `ControlService`'s sessions do it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use viyv_protocol::{AgentId, TabId};

/// Locks held longer than this without a refresh are considered broken.
pub const LOCK_TTL: Duration = Duration::from_secs(60);

struct LockEntry {
    agent_id: AgentId,
    acquired_at: Instant,
}

#[derive(Default)]
pub struct TabLocks {
    locks: Mutex<HashMap<TabId, LockEntry>>,
}

impl TabLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `tab_id` on behalf of `agent_id`. Idempotent for
    /// the current holder (refreshes `acquiredAt`); a lock older than
    /// [`LOCK_TTL`] is treated as broken and can be taken by anyone.
    /// Returns `false` (without taking the lock) if another agent holds an
    /// unexpired lock.
    pub async fn acquire(&self, tab_id: TabId, agent_id: AgentId) -> bool {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        if let Some(entry) = locks.get(&tab_id) {
            if entry.agent_id != agent_id && now.saturating_duration_since(entry.acquired_at) < LOCK_TTL {
                return false;
            }
        }
        locks.insert(tab_id, LockEntry { agent_id, acquired_at: now });
        true
    }

    pub async fn release(&self, tab_id: TabId, agent_id: AgentId) {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(&tab_id) {
            if entry.agent_id == agent_id {
                locks.remove(&tab_id);
            }
        }
    }
}
