//! Centralized default constants for quire.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// PAGINATION
// =============================================================================

/// Page number used when a request omits it.
pub const PAGE: i64 = 1;

/// Page size used when a request omits it or passes a non-positive value.
pub const PAGE_LIMIT: i64 = 10;

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Default maximum number of connections in the pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default minimum number of idle connections kept open.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Default acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds.
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// NOTES
// =============================================================================

/// Maximum length of a tag name in characters.
pub const TAG_NAME_MAX_LEN: usize = 100;

/// Title used when a synced document has neither front matter nor heading
/// nor a usable file name.
pub const UNTITLED: &str = "Untitled";
