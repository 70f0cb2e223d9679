// SPDX-License-Identifier: MIT
//!
//! The Bridge (C3): joins the browser host's framed stdio (C1) to the
//! Server's line-delimited Unix socket (C2), buffering and reconnecting
//! across restarts of either side.

pub mod bridge;
pub mod error;

pub use bridge::Bridge;
pub use error::BridgeError;
