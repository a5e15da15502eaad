//! Shared utilities for the cache library.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between segments of a storage key.
pub const KEY_SEPARATOR: char = ':';

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Percent-encode a key segment so it never contains the separator.
///
/// Unreserved characters (letters, digits, `-_.~`) are kept as they are.
pub fn escape_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Reverse of [`escape_segment`]. Returns `None` when the decoded bytes
/// are not UTF-8.
pub fn unescape_segment(segment: &str) -> Option<String> {
    urlencoding::decode(segment).ok().map(Cow::into_owned)
}
