// SPDX-License-Identifier: MIT
//!
//! [`ServerCore`] ties together the extension socket, the pending-request
//! engine, the session table and the event subsystem. Grounded
//! on `sven-node::control::service::ControlService`'s ownership model: one
//! live peer connection behind a lock, a shared pending-call map, and a
//! `tokio::select!`-driven accept loop — generalized here from "one active
//! agent" to "one active extension socket shared by every agent session".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use viyv_protocol::{AgentId, ErrorCode, Record, RequestId, SessionRecord, TabId, ToolCall, ToolError};
use viyv_transport::chunk::ChunkReassembler;
use viyv_transport::{LineReader, LineWriter};

use crate::catalogue;
use crate::events::{EventTable, Subscription};
use crate::pending::{deadline_for, PendingRequests};
use crate::session::SessionTable;

const SWITCH_BROWSER_POLL: Duration = Duration::from_millis(500);
const SWITCH_BROWSER_TIMEOUT: Duration = Duration::from_secs(60);

struct ExtensionConnection {
    writer: LineWriter<OwnedWriteHalf>,
    reader_task: JoinHandle<()>,
    generation: u64,
}

/// Identity the Server presents for subscription syncing and session
/// bookkeeping that isn't tied to a particular MCP client connection.
/// Minted once at startup.
pub struct DefaultAgent {
    pub id: AgentId,
    pub name: String,
}

pub struct ServerCore {
    default_agent: DefaultAgent,
    pending: PendingRequests,
    pending_tools: Mutex<HashMap<RequestId, String>>,
    sessions: SessionTable,
    events: EventTable,
    chunks: Mutex<ChunkReassembler>,
    connection: Mutex<Option<ExtensionConnection>>,
    generation: AtomicU64,
}

impl ServerCore {
    pub fn new(default_agent: DefaultAgent) -> Arc<Self> {
        Arc::new(Self {
            default_agent,
            pending: PendingRequests::new(),
            pending_tools: Mutex::new(HashMap::new()),
            sessions: SessionTable::new(),
            events: EventTable::new(),
            chunks: Mutex::new(ChunkReassembler::new()),
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn events(&self) -> &EventTable {
        &self.events
    }

    /// Install a freshly accepted extension socket, destroying whatever
    /// connection (if any) preceded it first. Ordering matters: the prior
    /// socket is torn down and every call it left pending is failed with
    /// `EXTENSION_NOT_CONNECTED` *before* the new one is installed.
    pub async fn install_connection(self: &Arc<Self>, stream: UnixStream) {
        self.destroy_connection().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (read_half, write_half) = stream.into_split();
        let writer = LineWriter::new(write_half);

        let core = Arc::clone(self);
        let reader_task = tokio::spawn(async move {
            let mut reader = LineReader::new(read_half);
            loop {
                match reader.next_record().await {
                    Ok(Some(value)) => core.handle_incoming(Record::from_value(value)).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "extension socket read error");
                        break;
                    }
                }
            }
            core.on_reader_closed(generation).await;
        });

        *self.connection.lock().await = Some(ExtensionConnection {
            writer,
            reader_task,
            generation,
        });
        tracing::info!(generation, "extension connection installed");

        let init = SessionRecord::new(self.default_agent.id).with_protocol_version(viyv_protocol::PROTOCOL_VERSION);
        if let Err(e) = self.write_to_extension(Record::SessionInit(init).into_value()).await {
            tracing::warn!(error = %e, "failed to send session_init on newly installed connection");
        }
    }

    /// A reader task's natural exit. Only tears the connection down if it's
    /// still the active one — an old reader exiting after it was already
    /// superseded by [`install_connection`] must not clobber the new state.
    async fn on_reader_closed(self: &Arc<Self>, generation: u64) {
        let still_current = matches!(
            &*self.connection.lock().await,
            Some(conn) if conn.generation == generation
        );
        if still_current {
            self.destroy_connection().await;
        }
    }

    /// Tear down the current connection, if any: abort its reader task,
    /// drop its writer, and fail every pending call with
    /// `EXTENSION_NOT_CONNECTED`.
    async fn destroy_connection(self: &Arc<Self>) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.reader_task.abort();
            drop(conn.writer);
        }
        self.pending.fail_all(ErrorCode::ExtensionNotConnected, "extension socket is not connected").await;
        self.pending_tools.lock().await.clear();
    }

    async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    async fn handle_incoming(self: &Arc<Self>, record: Record) {
        match record {
            Record::ToolResult(result) => {
                let tool = self.pending_tools.lock().await.remove(&result.id);
                let resolution = if result.success {
                    Ok(result.result.clone().unwrap_or(Value::Null))
                } else {
                    Err(result.error.clone().unwrap_or_else(|| {
                        ToolError::new(ErrorCode::InternalError, "tool failed without an error payload")
                    }))
                };
                if let (Some(tool), Ok(value)) = (tool.as_deref(), &resolution) {
                    self.sync_subscription(tool, value).await;
                }
                self.pending.resolve(result.id, resolution).await;
            }
            Record::BrowserEvent(event) => {
                self.sessions.touch(event.agent_id).await;
                self.events.dispatch(&event);
            }
            Record::SessionInit(session) | Record::SessionRecovery(session) => {
                if let Some(version) = session.protocol_version {
                    if version != viyv_protocol::PROTOCOL_VERSION {
                        tracing::warn!(
                            peer_version = version,
                            our_version = viyv_protocol::PROTOCOL_VERSION,
                            "protocol version mismatch"
                        );
                    }
                }
                self.sessions
                    .init_or_revive(session.agent_id, self.default_agent.name.clone())
                    .await;
            }
            Record::SessionHeartbeat(session) => {
                self.sessions.touch(session.agent_id).await;
            }
            Record::SessionClose(session) => {
                self.sessions.close(session.agent_id).await;
                self.events.purge_agent(session.agent_id);
            }
            Record::Chunk(chunk) => {
                let agent_id = chunk.agent_id;
                let reassembled = self.chunks.lock().await.accept(chunk);
                match reassembled {
                    Ok(Some(value)) => {
                        Box::pin(self.handle_incoming(Record::from_value(value))).await;
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, agent_id = %agent_id, "chunk reassembly failed"),
                }
            }
            Record::ToolCall(_) | Record::Compressed(_) | Record::Unknown(_) => {}
        }
    }

    /// Mirror a successful `browser_event_subscribe`/`unsubscribe` result
    /// into the event table.
    async fn sync_subscription(self: &Arc<Self>, tool: &str, result: &Value) {
        match tool {
            "browser_event_subscribe" => {
                let Some(id) = result.get("subscriptionId").and_then(Value::as_str) else {
                    return;
                };
                // input isn't threaded through the tool_result; the worker
                // echoes what it subscribed to back in the result payload.
                let event_types = result
                    .get("eventTypes")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let url_pattern = result.get("urlPattern").and_then(Value::as_str).map(str::to_string);
                self.events.insert(Subscription {
                    id: id.to_string(),
                    agent_id: self.default_agent.id,
                    event_types,
                    url_pattern,
                    created_at: Instant::now(),
                });
            }
            "browser_event_unsubscribe" => {
                if let Some(id) = result.get("subscriptionId").and_then(Value::as_str) {
                    self.events.remove(id);
                }
            }
            _ => {}
        }
    }

    async fn write_to_extension(&self, value: Value) -> Result<(), ToolError> {
        let mut guard = self.connection.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Err(ToolError::new(ErrorCode::ExtensionNotConnected, "extension socket is not connected"));
        };
        if conn.writer.write_record(&value).await.is_err() {
            drop(guard);
            self.destroy_connection().await;
            return Err(ToolError::new(ErrorCode::ExtensionNotConnected, "extension socket write failed"));
        }
        Ok(())
    }

    /// Entry point for an MCP `tools/call` invocation.
    pub async fn call_tool(self: &Arc<Self>, tool: &str, input: Value) -> Result<Value, ToolError> {
        if let Some(tab_id) = input.get("tabId") {
            if TabId::from_json(tab_id).is_none() {
                return Err(ToolError::new(ErrorCode::InvalidParams, "tabId must be a finite non-negative number"));
            }
        }

        if tool == "switch_browser" {
            return self.switch_browser().await;
        }

        if !catalogue::catalogue().iter().any(|t| t.name == tool) {
            return Err(ToolError::new(ErrorCode::UnknownTool, format!("no dispatcher for tool '{tool}'")));
        }

        if !self.is_connected().await {
            return Err(ToolError::new(ErrorCode::ExtensionNotConnected, "extension socket is not connected"));
        }

        let call = ToolCall::new(self.default_agent.id, tool, input.clone());
        let id = call.id;
        let deadline = deadline_for(tool, &input);
        let rx = self.pending.insert(id).await;
        self.pending_tools.lock().await.insert(id, tool.to_string());

        if let Err(e) = self.write_to_extension(Record::ToolCall(call).into_value()).await {
            self.pending.remove(&id).await;
            self.pending_tools.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(ToolError::new(ErrorCode::InternalError, "pending call dropped without resolution")),
            Err(_elapsed) => {
                self.pending.remove(&id).await;
                self.pending_tools.lock().await.remove(&id);
                Err(ToolError::new(
                    ErrorCode::Timeout,
                    format!("Tool '{tool}' timed out after {}ms", deadline.as_millis()),
                ))
            }
        }
    }

    /// `switch_browser` never reaches the Worker: destroy the current
    /// extension socket, then poll every 500ms for up to 60s for a fresh
    /// one to be accepted.
    async fn switch_browser(self: &Arc<Self>) -> Result<Value, ToolError> {
        self.destroy_connection().await;

        let started = Instant::now();
        loop {
            if self.is_connected().await {
                return Ok(serde_json::json!({"switched": true}));
            }
            if started.elapsed() >= SWITCH_BROWSER_TIMEOUT {
                return Err(ToolError::new(ErrorCode::Timeout, "switch_browser timed out waiting for a new browser"));
            }
            tokio::time::sleep(SWITCH_BROWSER_POLL).await;
        }
    }

    /// Run the 60s sweeper that prunes idle sessions and expired chunk sets.
    /// Intended to be spawned alongside the accept loop.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let expired_sessions = self.sessions.sweep(Instant::now()).await;
            for agent_id in expired_sessions {
                self.events.purge_agent(agent_id);
            }
            let expired_chunks = self.chunks.lock().await.sweep_expired(Instant::now());
            for request_id in expired_chunks {
                tracing::warn!(request_id = %request_id, "chunk reassembly timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn core() -> Arc<ServerCore> {
        ServerCore::new(DefaultAgent {
            id: AgentId::new(),
            name: "test-agent".to_string(),
        })
    }

    #[tokio::test]
    async fn install_connection_immediately_sends_session_init() {
        let core = core();
        let (server_side, worker_side) = UnixStream::pair().unwrap();
        core.clone().install_connection(server_side).await;

        let mut reader = LineReader::new(worker_side);
        let value = reader.next_record().await.unwrap().unwrap();
        assert_eq!(value["type"], "session_init");
        assert_eq!(value["agentId"], core.default_agent.id.to_string());
        assert_eq!(value["protocolVersion"], viyv_protocol::PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn call_tool_without_connection_fails_extension_not_connected() {
        let core = core();
        let err = core.call_tool("navigate", json!({"tabId": 1, "url": "https://x"})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExtensionNotConnected);
    }

    #[tokio::test]
    async fn call_tool_rejects_negative_tab_id() {
        let core = core();
        let err = core.call_tool("navigate", json!({"tabId": -1, "url": "https://x"})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn call_tool_rejects_unknown_tool_name() {
        let core = core();
        let err = core.call_tool("not_a_real_tool", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownTool);
    }

    #[tokio::test]
    async fn browser_event_dispatch_touches_the_session() {
        let core = core();
        let agent = core.default_agent.id;
        core.sessions.init_or_revive(agent, "a".to_string()).await;
        let event = viyv_protocol::BrowserEvent {
            id: RequestId::new(),
            agent_id: agent,
            event_type: "browser.page_load".to_string(),
            payload: json!({}),
            tab_id: None,
            url: None,
            timestamp: 0,
            sequence_number: 1,
        };
        core.handle_incoming(Record::BrowserEvent(event)).await;
        assert!(core.sessions.get(agent).await.is_some());
    }
}
