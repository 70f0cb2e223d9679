// SPDX-License-Identifier: MIT
//!
//! The fixed tool catalogue exposed to the MCP client.
//!
//! Concrete browser-control semantics live in `viyv-worker`, out of reach of
//! this crate; what's fixed here is only each tool's name, description and
//! input schema, mirroring the shape `sven-mcp::bridge::schema_to_mcp_tool`
//! expects, generalized from one schema per registered `sven_tools::Tool`
//! to one schema per catalogue entry declared statically.

use serde_json::{json, Value};

pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: fn() -> Value,
}

fn navigate_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabId": {"type": "number", "minimum": 0},
            "url": {"type": "string"}
        },
        "required": ["tabId", "url"]
    })
}

fn click_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabId": {"type": "number", "minimum": 0},
            "ref": {"type": "string", "pattern": "^(find_|page_)?ref_\\d+$"}
        },
        "required": ["tabId", "ref"]
    })
}

fn wait_for_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabId": {"type": "number", "minimum": 0},
            "selector": {"type": "string"},
            "timeout": {"type": "number", "minimum": 0}
        },
        "required": ["tabId", "selector"]
    })
}

fn screenshot_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabId": {"type": "number", "minimum": 0},
            "format": {"type": "string", "enum": ["png", "jpeg"]}
        },
        "required": ["tabId"]
    })
}

fn get_console_logs_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabId": {"type": "number", "minimum": 0},
            "limit": {"type": "number", "minimum": 1, "maximum": 500}
        },
        "required": ["tabId"]
    })
}

fn get_network_requests_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tabId": {"type": "number", "minimum": 0},
            "limit": {"type": "number", "minimum": 1, "maximum": 5000}
        },
        "required": ["tabId"]
    })
}

fn browser_event_subscribe_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "eventTypes": {"type": "array", "items": {"type": "string"}},
            "urlPattern": {"type": "string"}
        },
        "required": ["eventTypes"]
    })
}

fn browser_event_unsubscribe_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "subscriptionId": {"type": "string"}
        },
        "required": ["subscriptionId"]
    })
}

fn switch_browser_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Tools in this set cause the worker to acquire the tab lock for `tabId`
/// before dispatch.
pub const CDP_DEPENDENT_TOOLS: &[&str] = &[
    "navigate",
    "click",
    "wait_for",
    "screenshot",
    "get_console_logs",
    "get_network_requests",
];

pub fn catalogue() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "navigate",
            description: "Navigate a tab to a URL",
            schema: navigate_schema,
        },
        ToolDescriptor {
            name: "click",
            description: "Click an element identified by a ref handle",
            schema: click_schema,
        },
        ToolDescriptor {
            name: "wait_for",
            description: "Wait for a selector to appear in a tab",
            schema: wait_for_schema,
        },
        ToolDescriptor {
            name: "screenshot",
            description: "Capture a screenshot of a tab",
            schema: screenshot_schema,
        },
        ToolDescriptor {
            name: "get_console_logs",
            description: "Read buffered console log entries for a tab",
            schema: get_console_logs_schema,
        },
        ToolDescriptor {
            name: "get_network_requests",
            description: "Read buffered network request entries for a tab",
            schema: get_network_requests_schema,
        },
        ToolDescriptor {
            name: "browser_event_subscribe",
            description: "Subscribe to browser events matching a filter",
            schema: browser_event_subscribe_schema,
        },
        ToolDescriptor {
            name: "browser_event_unsubscribe",
            description: "Remove an existing event subscription",
            schema: browser_event_unsubscribe_schema,
        },
        ToolDescriptor {
            name: "switch_browser",
            description: "Disconnect the current browser and wait for a new one to attach",
            schema: switch_browser_schema,
        },
    ]
}

pub fn is_cdp_dependent(tool: &str) -> bool {
    CDP_DEPENDENT_TOOLS.contains(&tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_has_a_non_empty_name_and_object_schema() {
        for entry in catalogue() {
            assert!(!entry.name.is_empty());
            let schema = (entry.schema)();
            assert_eq!(schema["type"], "object");
        }
    }

    #[test]
    fn switch_browser_is_in_the_catalogue_but_not_cdp_dependent() {
        assert!(catalogue().iter().any(|t| t.name == "switch_browser"));
        assert!(!is_cdp_dependent("switch_browser"));
    }

    #[test]
    fn navigate_is_cdp_dependent() {
        assert!(is_cdp_dependent("navigate"));
    }
}
