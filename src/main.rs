// SPDX-License-Identifier: MIT
//!
//! Dev-only harness: wires a [`viyv_server::ServerCore`], a real
//! [`viyv_bridge::Bridge`], and a tiny in-process stand-in for the
//! Extension worker together over a temp Unix socket, so the C2/C3 wiring
//! can be exercised end to end without a real browser host. Not part of
//! the shipped process set.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use async_trait::async_trait;
use serde_json::Value;

use viyv_bridge::Bridge;
use viyv_protocol::{AgentId, Record, SessionRecord, TabId, ToolError, ToolResult};
use viyv_server::{DefaultAgent, ServerCore};
use viyv_transport::chunk::frame_tool_result;
use viyv_transport::{FrameReader, FrameWriter};
use viyv_worker::{BrowserDriver, Dispatcher};

/// Answers every dispatch with a canned success instead of a real CDP
/// round trip — there's no browser on the other end of this harness.
struct StubDriver;

#[async_trait]
impl BrowserDriver for StubDriver {
    async fn attach(&self, _tab_id: TabId) -> Result<(), ToolError> {
        Ok(())
    }
    async fn detach(&self, _tab_id: TabId) -> Result<(), ToolError> {
        Ok(())
    }
    async fn dispatch(&self, _tab_id: Option<TabId>, tool: &str, _input: Value) -> Result<Value, ToolError> {
        Ok(serde_json::json!({"tool": tool, "stub": true}))
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Answers every `tool_call` it sees with a canned success result, playing
/// the part a real Extension worker would over C1/C2.
async fn run_worker_stub<R, W>(reader: R, writer: W, agent_id: AgentId)
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut frame_reader = FrameReader::new(reader);
    let mut frame_writer = FrameWriter::new(writer);
    let dispatcher = Dispatcher::new(Arc::new(StubDriver));

    let init = SessionRecord::new(agent_id).with_protocol_version(viyv_protocol::PROTOCOL_VERSION);
    if let Err(e) = frame_writer.write_frame(&Record::SessionInit(init).into_value()).await {
        tracing::warn!(error = %e, "worker stub failed to send session_init");
        return;
    }

    loop {
        match frame_reader.next_frame().await {
            Ok(Some(value)) => {
                if let Record::ToolCall(call) = Record::from_value(value) {
                    tracing::info!(tool = %call.tool, "worker stub dispatching tool_call");
                    let resolution = dispatcher.dispatch(call.agent_id, &call.tool, call.input).await;
                    let result = match resolution {
                        Ok(value) => ToolResult::ok(call.id, call.agent_id, value),
                        Err(error) => ToolResult::err(call.id, call.agent_id, error),
                    };
                    match frame_tool_result(result) {
                        Ok(frames) => {
                            for frame in frames {
                                if let Err(e) = frame_writer.write_frame(&frame).await {
                                    tracing::warn!(error = %e, "worker stub failed to send tool_result");
                                }
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to frame oversized tool_result"),
                    }
                }
            }
            Ok(None) => {
                tracing::info!("bridge closed its end of the worker stub channel");
                return;
            }
            Err(e) => tracing::warn!(error = %e, "worker stub received a malformed frame"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let dir = tempfile::tempdir()?;
    let socket_path = dir.path().join("viyv-browser.sock");

    let agent_id = AgentId::new();
    let core = ServerCore::new(DefaultAgent {
        id: agent_id,
        name: "xtask-agent".to_string(),
    });

    let listener = tokio::net::UnixListener::bind(&socket_path)?;
    tracing::info!(socket = %socket_path.display(), "xtask server listening");

    tokio::spawn(Arc::clone(&core).run_sweeper());
    let accept_core = Arc::clone(&core);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => accept_core.install_connection(stream).await,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    });

    let (bridge_side, worker_side) = tokio::io::duplex(64 * 1024);
    let (bridge_in, bridge_out) = tokio::io::split(bridge_side);
    let (worker_read, worker_write) = tokio::io::split(worker_side);

    let bridge = Bridge::new(socket_path.clone());
    tokio::spawn(bridge.run(bridge_in, bridge_out));
    tokio::spawn(run_worker_stub(worker_read, worker_write, agent_id));

    // Give the bridge time to connect and the worker stub time to announce itself.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let navigate = core.call_tool("navigate", serde_json::json!({"tabId": 0, "url": "https://example.com"})).await;
    tracing::info!(?navigate, "navigate result");

    let unknown = core.call_tool("not_a_real_tool", serde_json::json!({})).await;
    tracing::info!(?unknown, "unknown tool result");

    Ok(())
}
