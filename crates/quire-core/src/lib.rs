//! # quire-core
//!
//! Core types, traits, and abstractions for the quire note store.
//!
//! This crate provides the domain models (notes, tags, pages), the error
//! taxonomy shared by every store operation, the pure pagination and sort
//! helpers, and the trait definitions that `quire-db` implements.
//!
//! ## Logging
//!
//! All crates log through `tracing` with structured fields: `subsystem`
//! ("database", "sync"), `component` ("pool", "notes", "tags", "aggregate",
//! "migrate"), `op`, entity ids (`note_id`, `book_id`, `tag_id`, `path`) and
//! measurements (`duration_ms`, `result_count`, `rows_affected`, `tag_count`).
//! Failures carry `error_code` and `error`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Command failed, requires operator attention |
//! | WARN  | Write rolled back, document skipped, pool exhausted |
//! | INFO  | Pool, migrations, sweep and sync completions |
//! | DEBUG | Resolved sort and window, upsert outcomes, sort-key fallback |
//! | TRACE | Per-row join folding |

pub mod defaults;
pub mod error;
pub mod models;
pub mod pagination;
pub mod sync;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorCode, Result};
pub use models::*;
pub use pagination::{
    resolve_sort, resolve_window, PageWindow, Pagination, SortField, SortOrder,
};
pub use sync::{
    parse_markdown, ContentProvider, NoteSyncService, ParsedNote, SyncFailure, SyncReport,
    SyncTarget,
};
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
