// SPDX-License-Identifier: MIT
//!
//! The single authoritative subscription table: what would otherwise be two
//! divergent tables (one per process) collapses into one here, populated by
//! observing `browser_event_subscribe`/`unsubscribe` tool-results; the
//! worker only mints subscription ids.
//!
//! Delivery to the client is a broadcast channel rather than a direct call,
//! modeled on `ControlService`'s `event_tx: broadcast::Sender<ControlEvent>` —
//! a send with no receivers (no client currently listening) is exactly the
//! "send failures are swallowed" behavior this needs.

use std::collections::{HashMap, HashSet};

use tokio::sync::broadcast;
use tokio::time::Instant;

use viyv_protocol::{AgentId, BrowserEvent};

const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub agent_id: AgentId,
    pub event_types: HashSet<String>,
    pub url_pattern: Option<String>,
    pub created_at: Instant,
}

impl Subscription {
    fn matches(&self, event: &BrowserEvent) -> bool {
        if self.agent_id != event.agent_id {
            return false;
        }
        if !self.event_types.contains(&event.event_type) {
            return false;
        }
        match (&self.url_pattern, &event.url) {
            (Some(pattern), Some(url)) => url.contains(pattern.as_str()),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// A client-facing notification for one matching subscription.
#[derive(Debug, Clone)]
pub struct EventNotification {
    pub subscription_id: String,
    pub event: BrowserEvent,
}

pub struct EventTable {
    subscriptions: std::sync::Mutex<HashMap<String, Subscription>>,
    notifications: broadcast::Sender<EventNotification>,
}

impl Default for EventTable {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            subscriptions: std::sync::Mutex::new(HashMap::new()),
            notifications: tx,
        }
    }
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_to_notifications(&self) -> broadcast::Receiver<EventNotification> {
        self.notifications.subscribe()
    }

    pub fn insert(&self, sub: Subscription) {
        self.subscriptions.lock().unwrap().insert(sub.id.clone(), sub);
    }

    pub fn remove(&self, subscription_id: &str) {
        self.subscriptions.lock().unwrap().remove(subscription_id);
    }

    /// Tied to an agent id and cleared when that agent's session closes.
    pub fn purge_agent(&self, agent_id: AgentId) {
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|_, sub| sub.agent_id != agent_id);
    }

    /// Fan out an inbound `browser_event` to every matching subscription.
    /// Swallows the case of no current listener — there is nothing to log,
    /// since "no one is subscribed right now" is routine, not an error.
    pub fn dispatch(&self, event: &BrowserEvent) {
        let subscriptions = self.subscriptions.lock().unwrap();
        for sub in subscriptions.values() {
            if sub.matches(event) {
                let _ = self.notifications.send(EventNotification {
                    subscription_id: sub.id.clone(),
                    event: event.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(agent_id: AgentId, event_type: &str, url: Option<&str>) -> BrowserEvent {
        BrowserEvent {
            id: viyv_protocol::RequestId::new(),
            agent_id,
            event_type: event_type.to_string(),
            payload: json!({}),
            tab_id: None,
            url: url.map(str::to_string),
            timestamp: 0,
            sequence_number: 1,
        }
    }

    #[test]
    fn matches_same_agent_event_type_and_url_substring() {
        let agent = AgentId::new();
        let table = EventTable::new();
        table.insert(Subscription {
            id: "sub-1".to_string(),
            agent_id: agent,
            event_types: ["browser.page_load".to_string()].into_iter().collect(),
            url_pattern: Some("example.com".to_string()),
            created_at: Instant::now(),
        });
        let mut rx = table.subscribe_to_notifications();

        table.dispatch(&event(agent, "browser.page_load", Some("https://example.com/x")));
        table.dispatch(&event(agent, "browser.page_load", Some("https://other.com/y")));

        let notif = rx.try_recv().unwrap();
        assert_eq!(notif.subscription_id, "sub-1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn never_delivers_to_a_different_agents_subscription() {
        let owner = AgentId::new();
        let other = AgentId::new();
        let table = EventTable::new();
        table.insert(Subscription {
            id: "sub-1".to_string(),
            agent_id: owner,
            event_types: ["x".to_string()].into_iter().collect(),
            url_pattern: None,
            created_at: Instant::now(),
        });
        let mut rx = table.subscribe_to_notifications();
        table.dispatch(&event(other, "x", None));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn purge_agent_removes_only_that_agents_subscriptions() {
        let a = AgentId::new();
        let b = AgentId::new();
        let table = EventTable::new();
        table.insert(Subscription {
            id: "a-sub".to_string(),
            agent_id: a,
            event_types: HashSet::new(),
            url_pattern: None,
            created_at: Instant::now(),
        });
        table.insert(Subscription {
            id: "b-sub".to_string(),
            agent_id: b,
            event_types: HashSet::new(),
            url_pattern: None,
            created_at: Instant::now(),
        });
        table.purge_agent(a);
        assert_eq!(table.subscriptions.lock().unwrap().len(), 1);
        assert!(table.subscriptions.lock().unwrap().contains_key("b-sub"));
    }

    #[test]
    fn dispatch_with_no_subscribers_does_not_panic() {
        let table = EventTable::new();
        table.dispatch(&event(AgentId::new(), "x", None));
    }
}
