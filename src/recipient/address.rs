//! Address module.
//!
//! Recipient cells often hold more than a bare address (display
//! names, stray spaces, several values). The classifier keeps the
//! first address-shaped substring and nothing else.

use log::debug;
use regex::Regex;
use std::sync::OnceLock;

fn address_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").unwrap())
}

/// Extracts the first address found in the given raw cell value.
pub fn extract_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let addr = address_regex().find(raw).map(|m| m.as_str().to_owned());
    debug!("address extracted from {:?}: {:?}", raw, addr);
    addr
}
