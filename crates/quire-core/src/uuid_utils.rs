//! Sortable identifiers.
//!
//! Notes and tags are keyed by UUIDv7 (RFC 9562): the first 48 bits carry a
//! millisecond Unix timestamp, so identifiers generated later sort after
//! identifiers generated earlier. Listings use the id as the final tie-breaker
//! of every ORDER BY, which keeps pages stable for rows sharing a sort value.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use quire_core::uuid_utils::new_v7;
///
/// let first = new_v7();
/// let second = new_v7();
/// assert!(second > first);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Extract the creation timestamp embedded in a UUIDv7.
///
/// Returns `None` if the UUID is not version 7.
pub fn extract_timestamp(uuid: &Uuid) -> Option<DateTime<Utc>> {
    if !is_v7(uuid) {
        return None;
    }
    let bytes = uuid.as_bytes();
    let millis = bytes[..6]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));

    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Check if a UUID is version 7.
#[inline]
pub fn is_v7(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 7
}
