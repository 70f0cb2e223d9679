// SPDX-License-Identifier: MIT
//!
//! Runtime configuration for the viyv-browser processes. There's no layered
//! config file here — the whole surface is one socket path and one agent
//! name, so a `Config::from_env()` plus a `clap`-derived CLI struct covers it.

use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

/// Default Unix socket path the Bridge listens on and the Server connects to.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/viyv-browser.sock";

/// Environment variable overriding [`DEFAULT_SOCKET_PATH`].
pub const SOCKET_ENV_VAR: &str = "VIYV_BROWSER_SOCKET";

/// Shared runtime configuration, resolved once at process startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub socket_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

impl Config {
    /// Resolve from `VIYV_BROWSER_SOCKET`, falling back to [`DEFAULT_SOCKET_PATH`].
    pub fn from_env() -> Self {
        match std::env::var(SOCKET_ENV_VAR) {
            Ok(path) if !path.is_empty() => {
                debug!(%path, "socket path from environment");
                Self {
                    socket_path: PathBuf::from(path),
                }
            }
            _ => Self::default(),
        }
    }
}

/// CLI surface for the Server binary. The Bridge reads [`Config::from_env`]
/// directly for its socket path; the worker simulator takes its own CLI args
/// (it isn't part of the Server/Bridge pair this crate's env vars target).
/// Only the Server needs an agent identity on the command line, carried
/// through to `session_init.agentId`.
#[derive(Debug, Parser)]
#[command(name = "viyv-server", about = "viyv-browser MCP server")]
pub struct ServerArgs {
    /// Human-readable name this server identifies itself as to the extension.
    #[arg(long, env = "VIYV_AGENT_NAME", default_value = "viyv-agent")]
    pub agent_name: String,

    /// Unix socket the Bridge is listening on.
    #[arg(long, env = "VIYV_BROWSER_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,
}
