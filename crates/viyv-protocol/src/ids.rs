// SPDX-License-Identifier: MIT
//!
//! Newtype wrappers around [`Uuid`] so a request id can never be compared
//! against an agent id by accident at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

uuid_newtype!(RequestId);
uuid_newtype!(AgentId);
uuid_newtype!(SessionToken);

/// Identifies a browser tab. The browser's own tab id space is a plain
/// non-negative integer, so this is not a UUID newtype like the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TabId {
    /// Validate the on-wire `input.tabId` shape: a finite, non-negative number.
    ///
    /// `tabId` arrives as a `serde_json::Value` from untyped tool input, so
    /// this is where the worker's "finite non-negative number" dispatch
    /// guard lives.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let n = value.as_f64()?;
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        Some(TabId(n as u64))
    }
}
