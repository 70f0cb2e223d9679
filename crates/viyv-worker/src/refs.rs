// SPDX-License-Identifier: MIT
//!
//! Element reference validation. Grounded on
//! `sven-image`'s `static CACHE: OnceLock<...>` pattern for process-wide
//! lazy state, `std::sync::OnceLock` over an external lazy-static crate.

use std::sync::OnceLock;

use regex::Regex;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(find_|page_)?ref_\d+$").expect("ref pattern is valid"))
}

/// Whether `reference` has the literal syntactic shape the worker assigns
/// to DOM element handles. Rejecting anything else before use prevents
/// selector injection through a forged ref string.
pub fn is_valid_ref(reference: &str) -> bool {
    pattern().is_match(reference)
}
