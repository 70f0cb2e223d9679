// SPDX-License-Identifier: MIT
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use viyv_bridge::{Bridge, BridgeError};
use viyv_config::Config;

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
    let config = Config::from_env();
    tracing::info!(socket = %config.socket_path.display(), "starting bridge");

    let bridge = Bridge::new(config.socket_path);
    if let Err(e) = bridge.run(tokio::io::stdin(), tokio::io::stdout()).await {
        if matches!(e, BridgeError::InitialConnectTimeout(_)) {
            tracing::error!(error = %e, "giving up on initial discovery");
            std::process::exit(1);
        }
        return Err(e.into());
    }
    Ok(())
}
