//! # quire-db
//!
//! PostgreSQL persistence for quire notes and tags.
//!
//! This crate provides:
//! - Connection pool management
//! - The note store: upsert by (book, path) with full tag-set replacement,
//!   lookups, paginated listings, substring search, deletion
//! - The tag store: book-scoped tags and the unused-tag sweep
//! - Folding of note/tag join rows into note aggregates
//!
//! ## Example
//!
//! ```rust,ignore
//! use quire_db::{Database, NoteInput, NoteRepository, NoteScope, Pagination};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/quire").await?;
//!
//!     let note = db.notes.create_or_update(NoteInput {
//!         book_id,
//!         user_id: "user-1".to_string(),
//!         path: "docs/intro.md".to_string(),
//!         title: "Intro".to_string(),
//!         body: "# Intro".to_string(),
//!         scope: NoteScope::Public,
//!         tags: vec!["guide".to_string()],
//!     }).await?;
//!
//!     let page = db.notes.find_by_book_id(book_id, Pagination::new(1, 20)).await?;
//!     println!("{} of {} notes", page.items.len(), page.count);
//!     Ok(())
//! }
//! ```
pub mod aggregate;
pub mod notes;
pub mod pool;
pub mod tags;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use quire_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// Re-export repository implementations
pub use aggregate::{fold_note_rows, NoteTagRow};
pub use notes::PgNoteRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tags::PgTagRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Note store.
    pub notes: PgNoteRepository,
    /// Tag store.
    pub tags: PgTagRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        tracing::info!(
            subsystem = "database",
            component = "migrate",
            op = "run",
            "Migrations applied"
        );
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
