// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FrameError {
    #[error("frame body of {0} bytes exceeds the 1 MiB cap")]
    TooLarge(usize),

    #[error("invalid JSON in frame body: {0}")]
    InvalidJson(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e.to_string())
    }
}

#[derive(Debug, Error, Clone)]
pub enum LineError {
    #[error("invalid JSON in line: {0}")]
    InvalidJson(String),

    #[error("compressed envelope was not valid base64: {0}")]
    InvalidBase64(String),

    #[error("compressed envelope did not inflate: {0}")]
    InvalidGzip(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LineError {
    fn from(e: std::io::Error) -> Self {
        LineError::Io(e.to_string())
    }
}

#[derive(Debug, Error, Clone)]
pub enum ChunkError {
    #[error("chunk {index} declares totalChunks={declared} but set already has {seen}")]
    TotalChunksMismatch {
        index: u32,
        declared: u32,
        seen: u32,
    },

    #[error("chunk set for request {0} timed out before completion")]
    ReassemblyTimeout(String),

    #[error("chunk set for request {0} reassembled to invalid JSON")]
    InvalidJson(String),
}
