// SPDX-License-Identifier: MIT
//!
//! Server core: the pending-request engine, session table, event fan-out
//! and MCP tool-catalogue surface the client process talks to.

pub mod catalogue;
pub mod core;
pub mod error;
pub mod events;
pub mod mcp;
pub mod pending;
pub mod session;

pub use core::{DefaultAgent, ServerCore};
pub use error::ServerError;
pub use mcp::ViyvMcpServer;
