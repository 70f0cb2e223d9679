// SPDX-License-Identifier: MIT
//!
//! Wire record types, id newtypes and the error taxonomy shared by the
//! Server, Bridge and Worker processes. This crate has no transport or I/O
//! code of its own — it is the vocabulary the other crates speak.

pub mod error;
pub mod ids;
pub mod record;

pub use error::{ErrorCode, ToolError};
pub use ids::{AgentId, RequestId, SessionToken, TabId};
pub use record::{BrowserEvent, Chunk, Compressed, Record, SessionRecord, ToolCall, ToolResult};

/// The protocol version this build speaks. A mismatch on `session_init` is
/// logged, never rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Records beyond this size switch a C2 line from a bare JSON line to a
/// `compressed` envelope.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 768 * 1024;

/// Single-frame cap on C1.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
