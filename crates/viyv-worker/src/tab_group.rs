// SPDX-License-Identifier: MIT
//!
//! Agent tab groups: exclusive ownership of a browser tab by one
//! agent. A tab operation by a non-owner fails with `TAB_ACCESS_DENIED`
//! rather than queuing or sharing.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use viyv_protocol::{AgentId, TabId};

#[derive(Debug, Clone)]
pub struct TabGroup {
    pub group_id: String,
    pub agent_name: String,
    pub color: String,
    pub tabs: HashSet<TabId>,
}

#[derive(Default)]
pub struct TabGroups {
    groups: Mutex<HashMap<AgentId, TabGroup>>,
}

impl TabGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `tab_id` to `agent_id`'s group, creating the group on first use.
    /// No-op if already bound to this agent; fails if bound elsewhere.
    pub async fn bind(&self, agent_id: AgentId, agent_name: &str, tab_id: TabId) -> bool {
        let mut groups = self.groups.lock().await;
        if let Some((owner, _)) = groups.iter().find(|(_, g)| g.tabs.contains(&tab_id)) {
            return *owner == agent_id;
        }
        let group = groups.entry(agent_id).or_insert_with(|| TabGroup {
            group_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            color: default_color(agent_id),
            tabs: HashSet::new(),
        });
        group.tabs.insert(tab_id);
        true
    }

    /// Whether `tab_id` belongs to `agent_id`'s group. A tab with no group
    /// yet is not owned by anyone and is implicitly deniable — callers
    /// should `bind` before checking ownership on a fresh tab.
    pub async fn owns(&self, agent_id: AgentId, tab_id: TabId) -> bool {
        self.groups
            .lock()
            .await
            .get(&agent_id)
            .map(|g| g.tabs.contains(&tab_id))
            .unwrap_or(false)
    }

    /// `session_close`: remove the agent's group entirely, returning the
    /// tabs it owned so the caller can also purge their buffers.
    pub async fn remove_group(&self, agent_id: AgentId) -> HashSet<TabId> {
        self.groups.lock().await.remove(&agent_id).map(|g| g.tabs).unwrap_or_default()
    }

    /// A snapshot of every live group, for persisting to disk.
    pub async fn snapshot(&self) -> Vec<(AgentId, TabGroup)> {
        self.groups.lock().await.iter().map(|(id, g)| (*id, g.clone())).collect()
    }
}

fn default_color(agent_id: AgentId) -> String {
    const PALETTE: &[&str] = &["blue", "green", "orange", "purple", "red", "teal"];
    let idx = (agent_id.0.as_u128() % PALETTE.len() as u128) as usize;
    PALETTE[idx].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_then_owns_is_true() {
        let groups = TabGroups::new();
        let agent = AgentId::new();
        assert!(groups.bind(agent, "a", TabId(1)).await);
        assert!(groups.owns(agent, TabId(1)).await);
    }

    #[tokio::test]
    async fn tab_bound_to_one_agent_is_denied_to_another() {
        let groups = TabGroups::new();
        let a = AgentId::new();
        let b = AgentId::new();
        assert!(groups.bind(a, "a", TabId(1)).await);
        assert!(!groups.bind(b, "b", TabId(1)).await);
        assert!(!groups.owns(b, TabId(1)).await);
    }

    #[tokio::test]
    async fn remove_group_returns_its_tabs() {
        let groups = TabGroups::new();
        let agent = AgentId::new();
        groups.bind(agent, "a", TabId(1)).await;
        groups.bind(agent, "a", TabId(2)).await;
        let tabs = groups.remove_group(agent).await;
        assert_eq!(tabs, [TabId(1), TabId(2)].into_iter().collect());
        assert!(!groups.owns(agent, TabId(1)).await);
    }
}
