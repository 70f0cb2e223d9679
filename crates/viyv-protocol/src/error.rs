// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error taxonomy carried on the wire.
///
/// Serializes to the literal `SCREAMING_SNAKE_CASE` strings clients expect
/// in a `tool_result.error.code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[error("no live extension socket")]
    ExtensionNotConnected,
    #[error("tab does not exist")]
    TabNotFound,
    #[error("tab not owned by calling agent")]
    TabAccessDenied,
    #[error("tab lock held by another agent")]
    TabLocked,
    #[error("debugger attach failed")]
    DebuggerAttachFailed,
    #[error("browser-control command failed")]
    CdpError,
    #[error("deadline exceeded")]
    Timeout,
    #[error("frame exceeds 1 MiB")]
    MessageTooLarge,
    #[error("chunk set incomplete or malformed")]
    ChunkReassemblyFailed,
    /// Enumerated but never raised by this implementation — reserved for a
    /// session pruned by the 5-minute sweeper while something still held a
    /// reference to it.
    #[error("session pruned while still referenced")]
    SessionExpired,
    #[error("input fails schema or ref-format check")]
    InvalidParams,
    #[error("no dispatcher for the named tool")]
    UnknownTool,
    #[error("internal error")]
    InternalError,
}

/// `{code, message}` as carried inside `tool_result.error`.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
