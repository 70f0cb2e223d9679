// SPDX-License-Identifier: MIT
//!
//! C1: the 4-byte length-prefixed JSON transport used between the Bridge and
//! the browser host process's stdio. Grounded on the big-endian framing in
//! `sven-p2p::protocol::codec::{read_framed, write_framed}`, adapted to the
//! little-endian length prefix the browser host protocol uses and to a plain
//! bidirectional record stream instead of libp2p's request/response codec
//! trait — C1 has no request/response pairing of its own.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use viyv_protocol::MAX_FRAME_BYTES;

use crate::error::FrameError;

const READ_CHUNK: usize = 8192;

/// Pulls records off an [`AsyncRead`] stream framed as `[u32 LE len][JSON]`.
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next record. `Ok(None)` is a clean close (`onClose`).
    ///
    /// A declared length over the 1 MiB cap discards whatever is currently
    /// buffered and returns `Err`, matching the documented (lossy) recovery
    /// from a corrupt header rather than attempting to skip the declared
    /// length. An invalid-JSON body also returns `Err`, but the already-
    /// consumed bytes stay consumed, so the next call resumes at the next
    /// frame.
    pub async fn next_frame(&mut self) -> Result<Option<Value>, FrameError> {
        loop {
            if self.buf.len() >= 4 {
                let len = u32::from_le_bytes(self.buf[..4].try_into().unwrap()) as usize;
                if len > MAX_FRAME_BYTES {
                    self.buf.clear();
                    return Err(FrameError::TooLarge(len));
                }
                if self.buf.len() >= 4 + len {
                    self.buf.advance(4);
                    let payload = self.buf.split_to(len);
                    return match serde_json::from_slice(&payload) {
                        Ok(v) => Ok(Some(v)),
                        Err(e) => Err(FrameError::InvalidJson(e.to_string())),
                    };
                }
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Writes records onto an [`AsyncWrite`] stream in the same framing.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encode and flush one record. Fails with [`FrameError::TooLarge`]
    /// before writing anything if the serialized body exceeds the cap.
    pub async fn write_frame(&mut self, value: &Value) -> Result<(), FrameError> {
        let body = encode(value)?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Serialize `value` into `[len LE][json]`, failing if the body exceeds the cap.
pub fn encode(value: &Value) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(value)
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}
