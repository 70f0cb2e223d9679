// SPDX-License-Identifier: MIT
//!
//! Bounded ring buffers for screenshots and console/network entries. Plain
//! `VecDeque`/`HashMap` over a ring-buffer crate, the same way
//! `GdbSessionState` and `ControlService`'s session table handle bounded
//! history elsewhere in this codebase.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use viyv_protocol::TabId;

const SCREENSHOT_CAPACITY: usize = 10;
const PER_TAB_CAPACITY: usize = 500;
const GLOBAL_CAPACITY: usize = 5000;

/// `{imageId -> base64 data}`, oldest evicted first, so `upload_image` can
/// refer back to a prior capture by id.
#[derive(Default)]
pub struct ScreenshotRing {
    order: VecDeque<String>,
    data: HashMap<String, String>,
}

impl ScreenshotRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, image_id: impl Into<String>, base64_data: impl Into<String>) {
        let image_id = image_id.into();
        if !self.data.contains_key(&image_id) {
            self.order.push_back(image_id.clone());
        }
        self.data.insert(image_id, base64_data.into());
        while self.order.len() > SCREENSHOT_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.data.remove(&oldest);
            }
        }
    }

    pub fn get(&self, image_id: &str) -> Option<&str> {
        self.data.get(image_id).map(String::as_str)
    }
}

struct RingEntry {
    tab_id: TabId,
    data: Value,
}

/// Console/network entries, capped per-tab at 500 and globally at 5000;
/// a push past either cap evicts the globally oldest entry that holds the
/// buffer over budget.
#[derive(Default)]
pub struct EntryBuffers {
    entries: VecDeque<RingEntry>,
    per_tab_counts: HashMap<TabId, usize>,
}

impl EntryBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tab_id: TabId, data: Value) {
        self.entries.push_back(RingEntry { tab_id, data });
        *self.per_tab_counts.entry(tab_id).or_insert(0) += 1;

        if *self.per_tab_counts.get(&tab_id).unwrap_or(&0) > PER_TAB_CAPACITY {
            self.evict_oldest_for_tab(tab_id);
        }
        if self.entries.len() > GLOBAL_CAPACITY {
            self.evict_global_oldest();
        }
    }

    fn evict_oldest_for_tab(&mut self, tab_id: TabId) {
        if let Some(pos) = self.entries.iter().position(|e| e.tab_id == tab_id) {
            self.entries.remove(pos);
            if let Some(count) = self.per_tab_counts.get_mut(&tab_id) {
                *count -= 1;
            }
        }
    }

    fn evict_global_oldest(&mut self) {
        if let Some(entry) = self.entries.pop_front() {
            if let Some(count) = self.per_tab_counts.get_mut(&entry.tab_id) {
                *count -= 1;
            }
        }
    }

    /// Closed tabs purge their buffers entirely.
    pub fn purge_tab(&mut self, tab_id: TabId) {
        self.entries.retain(|e| e.tab_id != tab_id);
        self.per_tab_counts.remove(&tab_id);
    }

    pub fn for_tab(&self, tab_id: TabId, limit: usize) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|e| e.tab_id == tab_id)
            .map(|e| e.data.clone())
            .rev()
            .take(limit)
            .collect()
    }

    pub fn len_for_tab(&self, tab_id: TabId) -> usize {
        self.per_tab_counts.get(&tab_id).copied().unwrap_or(0)
    }

    pub fn total_len(&self) -> usize {
        self.entries.len()
    }
}
