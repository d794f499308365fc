//! Core traits for quire abstractions.
//!
//! These traits define the interfaces that concrete stores must satisfy,
//! enabling the PostgreSQL implementation in `quire-db` and in-memory fakes
//! in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::pagination::Pagination;

// =============================================================================
// NOTE REPOSITORY TRAITS
// =============================================================================

/// Repository for notes and their tag associations.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert or update the note keyed by (book_id, path) and replace its tag
    /// set, atomically.
    async fn create_or_update(&self, input: NoteInput) -> Result<Note>;

    /// Fetch a note with all its tags.
    async fn find_by_id(&self, id: Uuid) -> Result<Note>;

    /// List the notes of a book.
    async fn find_by_book_id(&self, book_id: Uuid, pagination: Pagination) -> Result<NotePage>;

    /// List the notes of a book carrying the given tag.
    async fn find_by_tag(
        &self,
        book_id: Uuid,
        tag_id: Uuid,
        pagination: Pagination,
    ) -> Result<NotePage>;

    /// Case-insensitive substring search over title and body.
    async fn search(&self, book_id: Uuid, query: &str, pagination: Pagination)
        -> Result<NotePage>;

    /// Delete a note. Deleting a missing note succeeds.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Delete every note of the book whose path is listed. Returns rows removed.
    async fn delete_by_path(&self, book_id: Uuid, paths: &[String]) -> Result<u64>;
}

// =============================================================================
// TAG REPOSITORY TRAITS
// =============================================================================

/// Repository for book-scoped tags.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create the tag or touch the existing one.
    async fn upsert(&self, book_id: Uuid, name: &str) -> Result<Tag>;

    /// Tags attached to a note, ordered by name.
    async fn find_by_note_id(&self, note_id: Uuid) -> Result<Vec<Tag>>;

    /// Tags of a book with their note counts, ordered by name.
    async fn find_by_book_id(&self, book_id: Uuid) -> Result<Vec<TagSummary>>;

    /// Delete tags no note references. Returns rows removed.
    async fn delete_unused(&self) -> Result<u64>;
}
