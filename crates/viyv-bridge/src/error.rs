// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host stdio error: {0}")]
    Host(#[from] viyv_transport::FrameError),

    #[error("socket error: {0}")]
    Socket(#[from] viyv_transport::LineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server socket not found after {0:?}")]
    InitialConnectTimeout(std::time::Duration),
}
