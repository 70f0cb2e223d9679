// SPDX-License-Identifier: MIT
//!
//! Standalone stand-in for the real browser extension worker, speaking the
//! same framed stdio protocol (C1) a Bridge expects from its host. Useful
//! for exercising the Bridge and Server without a real browser attached —
//! in CI, or for manual smoke testing against a real `viyv-bridge`.
//!
//! Every CDP action is a no-op; only the dispatch preamble (tab locks,
//! ownership, attach bookkeeping, ring buffers) is real.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use serde_json::json;
use viyv_protocol::{Record, SessionRecord, TabId, ToolError, ToolResult};
use viyv_transport::chunk::frame_tool_result;
use viyv_transport::{FrameReader, FrameWriter};
use viyv_worker::session::{load_state, restore_session, save_state, snapshot, PersistedSession};
use viyv_worker::{BrowserDriver, Dispatcher};

#[derive(Debug, Parser)]
#[command(name = "viyv-worker-sim", about = "Stand-in extension worker for testing the Bridge and Server")]
struct Args {
    /// Name this worker announces itself under in `session_init`.
    #[arg(long, env = "VIYV_AGENT_NAME", default_value = "viyv-worker-sim")]
    agent_name: String,

    /// Where to load/save the persisted tab-group session table.
    #[arg(long, env = "VIYV_WORKER_STATE")]
    state_path: Option<PathBuf>,
}

struct NoopDriver;

#[async_trait]
impl BrowserDriver for NoopDriver {
    async fn attach(&self, _tab_id: TabId) -> Result<(), ToolError> {
        Ok(())
    }
    async fn detach(&self, _tab_id: TabId) -> Result<(), ToolError> {
        Ok(())
    }
    async fn dispatch(&self, _tab_id: Option<TabId>, tool: &str, _input: Value) -> Result<Value, ToolError> {
        match tool {
            "screenshot" => Ok(serde_json::json!({"imageId": "sim-0", "data": ""})),
            _ => Ok(serde_json::json!({"tool": tool, "simulated": true})),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let dispatcher = Dispatcher::new(Arc::new(NoopDriver));
    let agent_id = viyv_protocol::AgentId::new();

    let mut persisted: Vec<PersistedSession> = Vec::new();
    if let Some(path) = &args.state_path {
        let state = load_state(path).await?;
        for session in &state.sessions.0 {
            restore_session(&dispatcher.groups, session).await;
        }
        tracing::info!(restored = state.sessions.0.len(), "restored persisted tab groups");
        persisted = state.sessions.0;
    }

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let mut reader = FrameReader::new(stdin);
    let mut writer = FrameWriter::new(stdout);

    tracing::info!(agent_name = %args.agent_name, "worker-sim announcing session");
    let init = SessionRecord::new(agent_id).with_protocol_version(viyv_protocol::PROTOCOL_VERSION);
    writer.write_frame(&Record::SessionInit(init).into_value()).await?;

    loop {
        match reader.next_frame().await {
            Ok(Some(value)) => match Record::from_value(value) {
                Record::ToolCall(call) => {
                    let resolution = dispatcher.dispatch(call.agent_id, &call.tool, call.input).await;
                    let result = match resolution {
                        Ok(value) => ToolResult::ok(call.id, call.agent_id, value),
                        Err(error) => ToolResult::err(call.id, call.agent_id, error),
                    };
                    for frame in frame_tool_result(result)? {
                        writer.write_frame(&frame).await?;
                    }
                }
                Record::SessionClose(session) => {
                    dispatcher.close_session(session.agent_id).await;
                    let reply = SessionRecord::new(session.agent_id).with_protocol_version(viyv_protocol::PROTOCOL_VERSION);
                    writer.write_frame(&Record::SessionClose(reply).into_value()).await?;
                }
                Record::SessionRecovery(session) => {
                    let restored = persisted.iter().find(|p| p.agent_id == session.agent_id);
                    if let Some(found) = restored {
                        restore_session(&dispatcher.groups, found).await;
                    }
                    let status = if restored.is_some() { "restored" } else { "none" };
                    let mut reply = SessionRecord::new(session.agent_id).with_protocol_version(viyv_protocol::PROTOCOL_VERSION);
                    reply.config = Some(json!({"status": status}));
                    writer.write_frame(&Record::SessionRecovery(reply).into_value()).await?;
                }
                _ => {}
            },
            Ok(None) => {
                tracing::info!("host closed stdin, shutting down");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "malformed frame from host"),
        }
    }

    if let Some(path) = &args.state_path {
        let state = snapshot(&dispatcher.groups).await;
        save_state(path, &state).await?;
    }

    Ok(())
}
