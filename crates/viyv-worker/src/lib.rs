// SPDX-License-Identifier: MIT
//!
//! The Extension worker side of viyv-browser: tab locking, the CDP attach
//! state machine, bounded screenshot/console/network ring buffers,
//! element-reference validation, session lifecycle, and the dispatch
//! preamble that ties them together ahead of a [`driver::BrowserDriver`]
//! implementation.

pub mod attach;
pub mod driver;
pub mod error;
pub mod events;
pub mod refs;
pub mod registry;
pub mod ring;
pub mod session;
pub mod tab_group;
pub mod tab_lock;

pub use driver::BrowserDriver;
pub use error::WorkerError;
pub use registry::Dispatcher;
