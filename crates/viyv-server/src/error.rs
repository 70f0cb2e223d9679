// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Socket(#[from] viyv_transport::LineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
