// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("driver error: {0}")]
    Driver(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session state failed to (de)serialize: {0}")]
    Persistence(#[from] serde_json::Error),
}
