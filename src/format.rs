//! Display helpers shared by the console and the list store.

use crate::api::FileRecord;
use std::cmp::Ordering;

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Placeholder for sizes that cannot be shown.
pub const SIZE_PLACEHOLDER: &str = "-";

/// Base-1024 size with one decimal place, e.g. `1.5 KB`.
///
/// Zero, negative and non-finite sizes render as [`SIZE_PLACEHOLDER`].
pub fn format_bytes(size: f64) -> String {
    if !size.is_finite() || size <= 0.0 {
        return SIZE_PLACEHOLDER.to_string();
    }

    let mut value = size;
    let mut exponent = 0;
    while value >= 1024.0 && exponent < UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }

    format!("{:.1} {}", value, UNITS[exponent])
}

/// Newest first by `created_at`; ties (and unparseable timestamps, which
/// sort last) fall back to ascending id so the order is deterministic.
pub fn compare_newest_first(a: &FileRecord, b: &FileRecord) -> Ordering {
    match (a.created_at_utc(), b.created_at_utc()) {
        (Some(a_time), Some(b_time)) => b_time.cmp(&a_time).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

pub fn sort_newest_first(files: &mut [FileRecord]) {
    files.sort_by(compare_newest_first);
}
