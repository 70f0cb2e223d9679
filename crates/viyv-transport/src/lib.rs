// SPDX-License-Identifier: MIT
//!
//! The two wire transports viyv-browser runs on top of: [`framed`] (C1, the
//! browser host's stdio) and [`line`] (C2, the Bridge/Server Unix socket),
//! plus protocol-level [`chunk`] reassembly shared by whichever side needs it.

pub mod chunk;
pub mod error;
pub mod framed;
pub mod line;

pub use error::{ChunkError, FrameError, LineError};
pub use framed::{FrameReader, FrameWriter};
pub use line::{LineReader, LineWriter};
