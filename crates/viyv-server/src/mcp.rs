// SPDX-License-Identifier: MIT
//!
//! [`ViyvMcpServer`] — the rmcp [`ServerHandler`] implementation, grounded on
//! `sven-mcp::server::SvenMcpServer`: same `tools/list` and `tools/call`
//! shape, but `call_tool` forwards into [`ServerCore`]'s pending-request
//! engine instead of a local tool registry, and every tool-domain failure
//! comes back as a successful [`CallToolResult`] whose text content carries
//! `{"error":{"code":...,"message":...}}` rather than an MCP-level error
//! (matching scenario S2's literal expected output).

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, JsonObject, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool as McpTool,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};
use serde_json::Value;

use crate::catalogue::{self, ToolDescriptor};
use crate::core::ServerCore;

fn descriptor_to_mcp_tool(descriptor: ToolDescriptor) -> McpTool {
    let schema: JsonObject = match (descriptor.schema)() {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("type".to_string(), Value::String("object".to_string()));
            map.insert("value".to_string(), other);
            map
        }
    };
    McpTool::new(
        std::borrow::Cow::Borrowed(descriptor.name),
        std::borrow::Cow::Borrowed(descriptor.description),
        Arc::new(schema),
    )
}

fn resolution_to_call_result(resolution: Result<Value, viyv_protocol::ToolError>) -> CallToolResult {
    let body = match resolution {
        Ok(value) => value,
        Err(error) => serde_json::json!({"error": {"code": error.code, "message": error.message}}),
    };
    let text = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());
    CallToolResult::success(vec![Content::text(text)])
}

#[derive(Clone)]
pub struct ViyvMcpServer {
    core: Arc<ServerCore>,
}

impl ViyvMcpServer {
    pub fn new(core: Arc<ServerCore>) -> Self {
        Self { core }
    }
}

impl ServerHandler for ViyvMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            let tools = catalogue::catalogue().into_iter().map(descriptor_to_mcp_tool).collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let input = request
            .arguments
            .map(|m| Value::Object(m.into_iter().collect()))
            .unwrap_or(Value::Object(serde_json::Map::new()));

        let resolution = self.core.call_tool(request.name.as_ref(), input).await;
        Ok(resolution_to_call_result(resolution))
    }
}
