// SPDX-License-Identifier: MIT
//!
//! Exercises the Server, Bridge and a real (CDP-less) worker dispatcher
//! wired together over a temp Unix socket and an in-memory duplex stream,
//! following `sven-mcp/tests/integration.rs`'s pattern of driving the real
//! stack end to end instead of mocking each crate's neighbor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};

use viyv_bridge::Bridge;
use viyv_protocol::{AgentId, ErrorCode, Record, RequestId, SessionRecord, TabId, ToolError, ToolResult};
use viyv_server::{DefaultAgent, ServerCore};
use viyv_transport::chunk::frame_tool_result;
use viyv_transport::{FrameReader, FrameWriter, LineReader, LineWriter};
use viyv_worker::{BrowserDriver, Dispatcher};

/// Answers each CDP-dependent tool with whatever was scripted for it,
/// defaulting to `{"ok": true}`. `wait_for` never resolves on its own,
/// standing in for a selector that never appears.
#[derive(Default)]
struct ScriptedDriver {
    scripted: HashMap<&'static str, Value>,
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn attach(&self, _tab_id: TabId) -> Result<(), ToolError> {
        Ok(())
    }
    async fn detach(&self, _tab_id: TabId) -> Result<(), ToolError> {
        Ok(())
    }
    async fn dispatch(&self, _tab_id: Option<TabId>, tool: &str, _input: Value) -> Result<Value, ToolError> {
        if tool == "wait_for" {
            std::future::pending::<()>().await;
        }
        Ok(self.scripted.get(tool).cloned().unwrap_or_else(|| json!({"ok": true})))
    }
}

struct Stack {
    core: Arc<ServerCore>,
    inject: tokio::sync::mpsc::UnboundedSender<Value>,
    _dir: tempfile::TempDir,
}

/// Wires a real `ServerCore` (bound to a temp socket), a real `Bridge`
/// (over an in-memory duplex standing in for the browser host's stdio) and
/// a real `Dispatcher` together, mirroring `viyv-xtask`'s harness.
async fn spawn_stack(dispatcher: Arc<Dispatcher>, agent_id: AgentId) -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("viyv-browser.sock");

    let core = ServerCore::new(DefaultAgent {
        id: agent_id,
        name: "test-agent".to_string(),
    });
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(Arc::clone(&core).run_sweeper());
    let accept_core = Arc::clone(&core);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => accept_core.install_connection(stream).await,
                Err(_) => break,
            }
        }
    });

    let (bridge_side, worker_side) = tokio::io::duplex(8 * 1024 * 1024);
    let (bridge_in, bridge_out) = tokio::io::split(bridge_side);
    let (worker_read, worker_write) = tokio::io::split(worker_side);

    let bridge = Bridge::new(socket_path.clone());
    tokio::spawn(bridge.run(bridge_in, bridge_out));

    let (inject, inject_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(run_worker(worker_read, worker_write, agent_id, dispatcher, inject_rx));

    // Give the bridge time to connect and the worker its session_init.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Stack { core, inject, _dir: dir }
}

/// Plays the Extension worker's part over C1: answers `tool_call`s through
/// a real `Dispatcher`, and forwards anything pushed onto `inject` (used by
/// tests to simulate a `browser_event` firing independent of a tool call).
async fn run_worker<R, W>(
    reader: R,
    writer: W,
    agent_id: AgentId,
    dispatcher: Arc<Dispatcher>,
    mut inject: tokio::sync::mpsc::UnboundedReceiver<Value>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frame_reader = FrameReader::new(reader);
    let mut frame_writer = FrameWriter::new(writer);
    let init = SessionRecord::new(agent_id).with_protocol_version(viyv_protocol::PROTOCOL_VERSION);
    if frame_writer.write_frame(&Record::SessionInit(init).into_value()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = frame_reader.next_frame() => {
                match frame {
                    Ok(Some(value)) => {
                        if let Record::ToolCall(call) = Record::from_value(value) {
                            let resolution = dispatcher.dispatch(call.agent_id, &call.tool, call.input).await;
                            let result = match resolution {
                                Ok(value) => ToolResult::ok(call.id, call.agent_id, value),
                                Err(error) => ToolResult::err(call.id, call.agent_id, error),
                            };
                            let Ok(frames) = frame_tool_result(result) else { continue };
                            for frame in frames {
                                if frame_writer.write_frame(&frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) | Err(_) => return,
                }
            }
            Some(event_value) = inject.recv() => {
                if frame_writer.write_frame(&event_value).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// A pseudo-random 64-symbol string, too high-entropy for gzip to collapse
/// a multi-megabyte body down to a single chunk.
fn noisy_payload(len: usize) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut state: u64 = 0x9e3779b97f4a7c15;
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        out.push(ALPHABET[((state >> 56) & 0x3f) as usize] as char);
    }
    out
}

#[tokio::test]
async fn s1_happy_path_navigate_resolves_with_the_drivers_result() {
    let mut scripted = HashMap::new();
    scripted.insert("navigate", json!({"url": "https://example.com/", "title": "Example Domain"}));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(ScriptedDriver { scripted })));
    let agent_id = AgentId::new();
    let stack = spawn_stack(dispatcher, agent_id).await;

    let result = stack
        .core
        .call_tool("navigate", json!({"tabId": 42, "url": "https://example.com/"}))
        .await
        .unwrap();
    assert_eq!(result["url"], "https://example.com/");
    assert_eq!(result["title"], "Example Domain");
}

#[tokio::test]
async fn s2_tab_owned_by_another_agent_is_access_denied() {
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(ScriptedDriver::default())));
    let other_agent = AgentId::new();
    dispatcher.groups.bind(other_agent, "other-agent", TabId(99)).await;

    let agent_id = AgentId::new();
    let stack = spawn_stack(dispatcher, agent_id).await;

    let err = stack
        .core
        .call_tool("navigate", json!({"tabId": 99, "url": "https://example.com/"}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TabAccessDenied);
}

#[tokio::test]
async fn s3_wait_for_times_out_after_input_timeout_plus_grace() {
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(ScriptedDriver::default())));
    let agent_id = AgentId::new();
    let stack = spawn_stack(dispatcher, agent_id).await;

    let started = std::time::Instant::now();
    let err = stack
        .core
        .call_tool("wait_for", json!({"tabId": 42, "selector": "#never", "timeout": 100}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
    assert!(err.message.contains("5100ms"));
    assert!(started.elapsed() >= Duration::from_millis(5100));
}

/// `Bridge` itself has no public hook to force a disconnect, and
/// `ServerCore::install_connection` doesn't hand its accepted stream back
/// out either — so this scenario stands in for the Bridge directly with a
/// raw `LineReader`/`LineWriter` client, giving the test the deterministic
/// control over connect/close timing the scenario needs while still
/// exercising the real `ServerCore` connection lifecycle.
#[tokio::test]
async fn s4_socket_disconnect_fails_pending_call_then_reconnect_restores_service() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("viyv-browser.sock");
    let agent_id = AgentId::new();

    let core = ServerCore::new(DefaultAgent {
        id: agent_id,
        name: "test-agent".to_string(),
    });
    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(Arc::clone(&core).run_sweeper());

    let first_client = UnixStream::connect(&socket_path).await.unwrap();
    let (first_stream, _) = listener.accept().await.unwrap();
    core.install_connection(first_stream).await;
    let (first_rh, first_wh) = first_client.into_split();
    let mut first_reader = LineReader::new(first_rh);
    let first_writer = LineWriter::new(first_wh);

    let init = first_reader.next_record().await.unwrap().unwrap();
    assert_eq!(init["type"], "session_init");

    let core_for_call = Arc::clone(&core);
    let call_task = tokio::spawn(async move { core_for_call.call_tool("navigate", json!({"tabId": 1, "url": "https://x"})).await });

    // Let the call register before severing the connection, standing in
    // for "the Bridge closes the local socket".
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(first_reader);
    drop(first_writer);

    let err = call_task.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::ExtensionNotConnected);

    // A fresh connection restores service.
    let second_client = UnixStream::connect(&socket_path).await.unwrap();
    let (second_stream, _) = listener.accept().await.unwrap();
    core.install_connection(second_stream).await;
    let (second_rh, second_wh) = second_client.into_split();
    let mut second_reader = LineReader::new(second_rh);
    let mut second_writer = LineWriter::new(second_wh);
    let init2 = second_reader.next_record().await.unwrap().unwrap();
    assert_eq!(init2["type"], "session_init");

    let core_for_call2 = Arc::clone(&core);
    let call2 = tokio::spawn(async move { core_for_call2.call_tool("navigate", json!({"tabId": 1, "url": "https://y"})).await });

    let call = second_reader.next_record().await.unwrap().unwrap();
    assert_eq!(call["type"], "tool_call");
    let request_id: RequestId = serde_json::from_value(call["id"].clone()).unwrap();
    let result = ToolResult::ok(request_id, agent_id, json!({"ok": true}));
    second_writer.write_record(&Record::ToolResult(result).into_value()).await.unwrap();

    let resolved = call2.await.unwrap().unwrap();
    assert_eq!(resolved["ok"], true);
}

#[tokio::test]
async fn s5_oversized_tool_result_arrives_as_one_reassembled_value() {
    let payload = noisy_payload(3 * 1024 * 1024);
    let mut scripted = HashMap::new();
    scripted.insert("click", json!({"data": payload.clone()}));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(ScriptedDriver { scripted })));
    let agent_id = AgentId::new();
    let stack = spawn_stack(dispatcher, agent_id).await;

    let result = stack
        .core
        .call_tool("click", json!({"tabId": 1, "ref": "ref_1"}))
        .await
        .unwrap();
    assert_eq!(result["data"], payload);
}

#[tokio::test]
async fn s6_subscription_fan_out_delivers_only_the_matching_event() {
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(ScriptedDriver::default())));
    let agent_id = AgentId::new();
    let stack = spawn_stack(Arc::clone(&dispatcher), agent_id).await;

    stack
        .core
        .call_tool(
            "browser_event_subscribe",
            json!({"eventTypes": ["browser.page_load"], "urlPattern": "example.com"}),
        )
        .await
        .unwrap();

    let mut notifications = stack.core.events().subscribe_to_notifications();

    let matching = dispatcher
        .emit_event(agent_id, "browser.page_load", json!({}), None, Some("https://example.com/x".to_string()))
        .await;
    let other = dispatcher
        .emit_event(agent_id, "browser.page_load", json!({}), None, Some("https://other.com/y".to_string()))
        .await;

    stack.inject.send(Record::BrowserEvent(other).into_value()).unwrap();
    stack.inject.send(Record::BrowserEvent(matching.clone()).into_value()).unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(2), notifications.recv()).await.unwrap().unwrap();
    assert_eq!(delivered.event.id, matching.id);

    // No second notification should follow within a short window.
    let second = tokio::time::timeout(Duration::from_millis(300), notifications.recv()).await;
    assert!(second.is_err(), "unexpected second notification: {second:?}");
}
