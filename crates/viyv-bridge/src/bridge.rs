// SPDX-License-Identifier: MIT
//!
//! The C3 state machine: one framed C1 stream to the browser host's stdio,
//! one reconnecting line-delimited C2 stream to the Server's Unix socket.
//!
//! Grounded on the reconnect-loop shape of
//! `sven-node::p2p::handler::P2pControlNode::run` (a single `tokio::select!`
//! owning all mutable connection state) and the buffering discipline implicit
//! in `sven-mcp::node_proxy::NodeProxyServer`, generalized from "open one
//! connection per call" to "hold one persistent connection with a bounded
//! pending queue".

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use viyv_transport::{FrameReader, FrameWriter, LineReader, LineWriter};

use crate::error::BridgeError;

const MAX_PENDING: usize = 1000;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Interval between initial-discovery connect attempts, distinct from the
/// exponential-backoff reconnect used once a connection has been held at
/// least once. The Server may simply not have started its listener yet.
const INITIAL_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Total time budget for initial discovery. Absence of the socket past this
/// is treated as fatal, not as something to keep backing off against forever.
const INITIAL_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection state — `nil | connecting | open`. Kept mostly for
/// observability; the `Option<LineReader/LineWriter>` pair is what the loop
/// actually branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    Nil,
    Connecting,
    Open,
}

pub struct Bridge {
    socket_path: PathBuf,
    pending: VecDeque<Value>,
    retry: u32,
    state: SocketState,
}

impl Bridge {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            pending: VecDeque::new(),
            retry: 0,
            state: SocketState::Nil,
        }
    }

    fn backoff(&self) -> Duration {
        let secs = 1u64.saturating_mul(1u64 << self.retry.min(5));
        Duration::from_secs(secs).min(MAX_BACKOFF)
    }

    /// Wait `min(1s·2^retry, 30s)`, then bump retry for the *next* failure.
    /// `retry` itself only resets on the first record after a connect —
    /// a bare successful accept doesn't reset it.
    fn schedule_reconnect(&mut self) -> Instant {
        let at = Instant::now() + self.backoff();
        self.retry = self.retry.saturating_add(1);
        self.state = SocketState::Nil;
        at
    }

    fn enqueue(&mut self, record: Value) {
        if self.pending.len() >= MAX_PENDING {
            self.pending.pop_front();
            warn!(max = MAX_PENDING, "pending queue full, dropped oldest buffered record");
        }
        self.pending.push_back(record);
    }

    /// Polls for the Server's socket every [`INITIAL_POLL_INTERVAL`], giving
    /// up after [`INITIAL_DISCOVERY_TIMEOUT`] total. This is the one-time
    /// discovery phase a fresh Bridge goes through before it has ever held a
    /// connection; once connected, later drops fall back to
    /// [`Self::schedule_reconnect`]'s exponential backoff instead.
    async fn connect_initial(&self) -> Result<UnixStream, BridgeError> {
        let deadline = Instant::now() + INITIAL_DISCOVERY_TIMEOUT;
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => {
                    debug!(path = %self.socket_path.display(), "connected to server socket");
                    return Ok(stream);
                }
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(BridgeError::InitialConnectTimeout(INITIAL_DISCOVERY_TIMEOUT));
                    }
                    debug!(error = %e, "server socket not yet available, retrying");
                    tokio::time::sleep(INITIAL_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Peek-before-pop flush: a buffered record is only removed once its
    /// write actually succeeds, so a write failure mid-flush leaves the
    /// queue intact for the next connection.
    async fn flush_pending(&mut self, writer: &mut LineWriter<OwnedWriteHalf>) {
        while let Some(record) = self.pending.front() {
            match writer.write_record(record).await {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(e) => {
                    warn!(error = %e, "flush failed, remaining records kept for next connect");
                    break;
                }
            }
        }
    }

    /// Runs until the host side closes (`onClose` on C1) or signaled to stop
    /// externally. Socket disconnects are absorbed by reconnect/backoff and
    /// never end the loop on their own.
    pub async fn run<HR, HW>(mut self, host_in: HR, host_out: HW) -> Result<(), BridgeError>
    where
        HR: AsyncRead + Unpin,
        HW: AsyncWrite + Unpin,
    {
        let mut host_reader = FrameReader::new(host_in);
        let mut host_writer = FrameWriter::new(host_out);

        let mut socket_reader: Option<LineReader<OwnedReadHalf>> = None;
        let mut socket_writer: Option<LineWriter<OwnedWriteHalf>> = None;
        let mut reconnect_at: Option<Instant> = None;
        let mut awaiting_first_record = false;

        self.state = SocketState::Connecting;
        let stream = self.connect_initial().await?;
        let (rh, wh) = stream.into_split();
        socket_reader = Some(LineReader::new(rh));
        socket_writer = Some(LineWriter::new(wh));
        self.state = SocketState::Open;
        awaiting_first_record = true;

        loop {
            let reconnect_sleep = async {
                match reconnect_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                frame = host_reader.next_frame() => {
                    match frame {
                        Ok(Some(value)) => self.forward_to_socket(value, &mut socket_writer, &mut socket_reader, &mut reconnect_at).await,
                        Ok(None) => {
                            info!("host stdio closed, shutting down bridge");
                            return Ok(());
                        }
                        Err(e) => warn!(error = %e, "malformed frame from host, continuing"),
                    }
                }

                record = async {
                    match socket_reader.as_mut() {
                        Some(r) => r.next_record().await,
                        None => std::future::pending().await,
                    }
                }, if socket_reader.is_some() => {
                    match record {
                        Ok(Some(value)) => {
                            if awaiting_first_record {
                                self.retry = 0;
                                awaiting_first_record = false;
                            }
                            if let Err(e) = host_writer.write_frame(&value).await {
                                warn!(error = %e, "record from socket too large for C1, dropping but keeping channel open");
                            }
                        }
                        Ok(None) => {
                            warn!("socket closed, scheduling reconnect");
                            socket_reader = None;
                            socket_writer = None;
                            reconnect_at = Some(self.schedule_reconnect());
                        }
                        Err(e) => {
                            warn!(error = %e, "socket read error, scheduling reconnect");
                            socket_reader = None;
                            socket_writer = None;
                            reconnect_at = Some(self.schedule_reconnect());
                        }
                    }
                }

                _ = reconnect_sleep, if reconnect_at.is_some() && socket_reader.is_none() => {
                    reconnect_at = None;
                    self.state = SocketState::Connecting;
                    match UnixStream::connect(&self.socket_path).await {
                        Ok(stream) => {
                            debug!(path = %self.socket_path.display(), "connected to server socket");
                            let (rh, wh) = stream.into_split();
                            socket_reader = Some(LineReader::new(rh));
                            let mut writer = LineWriter::new(wh);
                            self.flush_pending(&mut writer).await;
                            socket_writer = Some(writer);
                            self.state = SocketState::Open;
                            awaiting_first_record = true;
                        }
                        Err(e) => {
                            warn!(error = %e, retry = self.retry, "connect failed, backing off");
                            reconnect_at = Some(self.schedule_reconnect());
                        }
                    }
                }
            }
        }
    }

    async fn forward_to_socket(
        &mut self,
        value: Value,
        socket_writer: &mut Option<LineWriter<OwnedWriteHalf>>,
        socket_reader: &mut Option<LineReader<OwnedReadHalf>>,
        reconnect_at: &mut Option<Instant>,
    ) {
        let Some(writer) = socket_writer.as_mut() else {
            self.enqueue(value);
            return;
        };
        if let Err(e) = writer.write_record(&value).await {
            warn!(error = %e, "socket write failed, scheduling reconnect");
            *socket_reader = None;
            *socket_writer = None;
            *reconnect_at = Some(self.schedule_reconnect());
            self.enqueue(value);
        }
    }
}
