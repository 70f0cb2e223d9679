// SPDX-License-Identifier: MIT
//!
//! The per-tab CDP attach state machine. Modeled the way
//! `sven-tools::builtin::gdb::state::GdbSessionState` models a debugger
//! session's lifecycle — an explicit state struct with transition methods
//! and teardown that drains in-flight work — generalized from one global
//! session to one state machine per tab, with a rendezvous so concurrent
//! `ensure_attached` callers share a single in-flight attach.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use viyv_protocol::TabId;

use crate::driver::BrowserDriver;

/// A tab is detached automatically after this long with no commands running.
pub const IDLE_DETACH: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachState {
    Detached,
    Attaching,
    Attached { cmd_count: u32 },
}

struct TabSlot {
    state: Mutex<AttachState>,
    attach_done: Notify,
    /// Bumped on every `begin_command`; an idle-detach task captures the
    /// generation when it's scheduled and only acts if it's unchanged.
    generation: std::sync::atomic::AtomicU64,
}

impl TabSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(AttachState::Detached),
            attach_done: Notify::new(),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

pub struct AttachTable {
    tabs: Mutex<HashMap<TabId, Arc<TabSlot>>>,
}

impl Default for AttachTable {
    fn default() -> Self {
        Self { tabs: Mutex::new(HashMap::new()) }
    }
}

impl AttachTable {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, tab_id: TabId) -> Arc<TabSlot> {
        self.tabs.lock().await.entry(tab_id).or_insert_with(|| Arc::new(TabSlot::new())).clone()
    }

    /// Ensure `tab_id` is attached, performing the attach via `driver` if
    /// it isn't already, and joining an in-flight attach if one is running.
    pub async fn ensure_attached(&self, tab_id: TabId, driver: &dyn BrowserDriver) -> Result<(), viyv_protocol::ToolError> {
        let slot = self.slot(tab_id).await;
        loop {
            let mut state = slot.state.lock().await;
            match *state {
                AttachState::Attached { .. } => return Ok(()),
                AttachState::Attaching => {
                    let notified = slot.attach_done.notified();
                    drop(state);
                    notified.await;
                    continue;
                }
                AttachState::Detached => {
                    *state = AttachState::Attaching;
                    drop(state);
                    let result = driver.attach(tab_id).await;
                    let mut state = slot.state.lock().await;
                    *state = match &result {
                        Ok(()) => AttachState::Attached { cmd_count: 0 },
                        Err(_) => AttachState::Detached,
                    };
                    drop(state);
                    slot.attach_done.notify_waiters();
                    return result;
                }
            }
        }
    }

    /// Mark a command starting on an attached tab, suppressing any pending
    /// idle-detach by invalidating its generation.
    pub async fn begin_command(&self, tab_id: TabId) {
        let slot = self.slot(tab_id).await;
        slot.generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut state = slot.state.lock().await;
        if let AttachState::Attached { cmd_count } = *state {
            *state = AttachState::Attached { cmd_count: cmd_count + 1 };
        }
    }

    /// Mark a command finishing. If this drops `cmd_count` to zero, arm the
    /// idle-detach timer (5s idle -> DETACHED); a detach attempt while
    /// `cmd_count > 0` is deferred naturally since the timer only fires
    /// this check when `cmd_count` is still zero.
    pub async fn end_command(self: &Arc<Self>, tab_id: TabId, driver: Arc<dyn BrowserDriver>) {
        let slot = self.slot(tab_id).await;
        let generation = {
            let mut state = slot.state.lock().await;
            if let AttachState::Attached { cmd_count } = *state {
                let remaining = cmd_count.saturating_sub(1);
                *state = AttachState::Attached { cmd_count: remaining };
                if remaining > 0 {
                    return;
                }
            } else {
                return;
            }
            slot.generation.load(std::sync::atomic::Ordering::SeqCst)
        };

        let table = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(IDLE_DETACH).await;
            table.try_idle_detach(tab_id, generation, driver).await;
        });
    }

    async fn try_idle_detach(&self, tab_id: TabId, generation: u64, driver: Arc<dyn BrowserDriver>) {
        let slot = self.slot(tab_id).await;
        let still_idle = slot.generation.load(std::sync::atomic::Ordering::SeqCst) == generation
            && matches!(*slot.state.lock().await, AttachState::Attached { cmd_count: 0 });
        if !still_idle {
            return;
        }
        let _ = driver.detach(tab_id).await;
        *slot.state.lock().await = AttachState::Detached;
    }
}
