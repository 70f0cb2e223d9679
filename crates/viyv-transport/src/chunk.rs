// SPDX-License-Identifier: MIT
//!
//! Protocol-level chunking for records too large for the framed transport's
//! 1 MiB cap. A chunk set shares a
//! `requestId`; the receiver accumulates fragments keyed by `chunkIndex`
//! and reassembles in ascending order once all arrive, discarding the set
//! if 10 s pass without completion.
//!
//! Grounded on the same per-session accumulator shape as
//! `sven-node::control::service::ControlService`'s session table, generalized
//! from "one entry per session" to "one entry per in-flight chunk set".

use std::collections::HashMap;

use base64::Engine;
use serde_json::Value;
use tokio::time::{Duration, Instant};

use viyv_protocol::{AgentId, Chunk, Record, RequestId, ToolResult};

use crate::error::ChunkError;

/// A chunk set is discarded if it hasn't completed within this long.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fragments never individually exceed this many raw bytes before base64
/// encoding. Deliberately smaller than the 768 KiB C2 compression threshold:
/// base64 alone expands 768 KiB to exactly 1 MiB, leaving no room for the
/// `Chunk` envelope itself once framed for C1, so a maximal fragment would
/// blow the frame cap it exists to stay under.
pub const CHUNK_SIZE_BYTES: usize = 700 * 1024;

struct Accumulator {
    agent_id: AgentId,
    total_chunks: u32,
    total_size: u64,
    compressed: bool,
    parts: HashMap<u32, Vec<u8>>,
    deadline: Instant,
}

/// Reassembles inbound chunk sets. Not thread-safe on its own; callers hold
/// it behind the same lock or task that owns the rest of a connection's
/// mutable state.
#[derive(Default)]
pub struct ChunkReassembler {
    sets: HashMap<RequestId, Accumulator>,
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk into its set. Returns the reassembled JSON value once
    /// the set is complete.
    pub fn accept(&mut self, chunk: Chunk) -> Result<Option<Value>, ChunkError> {
        let entry = self.sets.entry(chunk.request_id).or_insert_with(|| Accumulator {
            agent_id: chunk.agent_id,
            total_chunks: chunk.total_chunks,
            total_size: chunk.total_size,
            compressed: chunk.compressed,
            parts: HashMap::new(),
            deadline: Instant::now() + REASSEMBLY_TIMEOUT,
        });

        if entry.total_chunks != chunk.total_chunks {
            return Err(ChunkError::TotalChunksMismatch {
                index: chunk.chunk_index,
                declared: chunk.total_chunks,
                seen: entry.total_chunks,
            });
        }

        let raw = base64::engine::general_purpose::STANDARD
            .decode(&chunk.data)
            .map_err(|e| ChunkError::InvalidJson(e.to_string()))?;
        entry.parts.insert(chunk.chunk_index, raw);

        if entry.parts.len() < entry.total_chunks as usize {
            return Ok(None);
        }

        let accumulator = self.sets.remove(&chunk.request_id).expect("just inserted");
        reassemble(accumulator, chunk.request_id)
    }

    /// Drop any set whose deadline has passed, returning their request ids
    /// so a caller can surface `CHUNK_REASSEMBLY_FAILED` to whoever is
    /// waiting on them. Intended to run off the same periodic tick a caller
    /// already uses for other sweeping (e.g. the session table's).
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<RequestId> {
        let expired: Vec<RequestId> = self
            .sets
            .iter()
            .filter(|(_, acc)| acc.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.sets.remove(id);
        }
        expired
    }
}

fn reassemble(accumulator: Accumulator, request_id: RequestId) -> Result<Option<Value>, ChunkError> {
    let mut buf = Vec::with_capacity(accumulator.total_size as usize);
    for i in 0..accumulator.total_chunks {
        match accumulator.parts.get(&i) {
            Some(part) => buf.extend_from_slice(part),
            None => {
                return Err(ChunkError::ReassemblyTimeout(request_id.to_string()));
            }
        }
    }
    let json_bytes = if accumulator.compressed {
        let mut dec = flate2::read::GzDecoder::new(buf.as_slice());
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut dec, &mut out)
            .map_err(|e| ChunkError::InvalidJson(e.to_string()))?;
        out
    } else {
        buf
    };
    let _ = accumulator.agent_id;
    serde_json::from_slice(&json_bytes)
        .map(Some)
        .map_err(|e| ChunkError::InvalidJson(e.to_string()))
}

/// Split a serialized record into a chunk set no fragment of which exceeds
/// [`CHUNK_SIZE_BYTES`] raw bytes, optionally gzip-compressing first. Used by
/// whichever side produces an oversized `tool_result` before handing it to C1.
pub fn split(request_id: RequestId, agent_id: AgentId, value: &Value, compress: bool) -> Result<Vec<Chunk>, ChunkError> {
    let json = serde_json::to_vec(value).map_err(|e| ChunkError::InvalidJson(e.to_string()))?;
    let (payload, compressed) = if compress {
        let gz = {
            use std::io::Write;
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(&json).expect("in-memory gzip never fails");
            enc.finish().expect("in-memory gzip never fails")
        };
        (gz, true)
    } else {
        (json, false)
    };
    let total_size = payload.len() as u64;
    let chunks: Vec<&[u8]> = payload.chunks(CHUNK_SIZE_BYTES).collect();
    let total_chunks = chunks.len().max(1) as u32;
    Ok(chunks
        .iter()
        .enumerate()
        .map(|(i, part)| Chunk {
            request_id,
            agent_id,
            chunk_index: i as u32,
            total_chunks,
            total_size,
            compressed,
            data: base64::engine::general_purpose::STANDARD.encode(part),
        })
        .collect())
}

/// Whether `value`, serialized raw (C1 carries no compression of its own —
/// that's a C2-only concept), would cross the 1 MiB frame cap.
pub fn needs_chunking(value: &Value) -> bool {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len() > viyv_protocol::MAX_FRAME_BYTES)
        .unwrap_or(true)
}

/// Prepares a `tool_result` for C1 emission: a single `tool_result` record
/// if it fits under the frame cap, or a gzip-compressed chunk set otherwise.
/// Each returned value is one record to write as its own frame, in order.
pub fn frame_tool_result(result: ToolResult) -> Result<Vec<Value>, ChunkError> {
    let value = Record::ToolResult(result.clone()).into_value();
    if !needs_chunking(&value) {
        return Ok(vec![value]);
    }
    let chunks = split(result.id, result.agent_id, &value, true)?;
    Ok(chunks.into_iter().map(|c| Record::Chunk(c).into_value()).collect())
}
