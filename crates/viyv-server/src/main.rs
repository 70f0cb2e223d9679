// SPDX-License-Identifier: MIT
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use viyv_config::ServerArgs;
use viyv_server::{DefaultAgent, ServerCore, ViyvMcpServer};

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
    let args = ServerArgs::parse();

    if args.socket_path.exists() {
        std::fs::remove_file(&args.socket_path)?;
    }
    let listener = tokio::net::UnixListener::bind(&args.socket_path)?;
    tracing::info!(socket = %args.socket_path.display(), agent = %args.agent_name, "listening for bridge connection");

    let core = ServerCore::new(DefaultAgent {
        id: viyv_protocol::AgentId::new(),
        name: args.agent_name,
    });

    tokio::spawn(Arc::clone(&core).run_sweeper());

    let accept_core = Arc::clone(&core);
    tokio::spawn(async move {
        loop {
            match accept_core_listener(&listener).await {
                Ok(stream) => accept_core.install_connection(stream).await,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    });

    let server = ViyvMcpServer::new(core);
    let running = rmcp::ServiceExt::serve(server, (tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| anyhow::anyhow!("MCP server init error: {e}"))?;
    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}

async fn accept_core_listener(listener: &tokio::net::UnixListener) -> std::io::Result<tokio::net::UnixStream> {
    let (stream, _addr) = listener.accept().await?;
    Ok(stream)
}
