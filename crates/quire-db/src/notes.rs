//! Note repository implementation.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use quire_core::{
    new_v7, resolve_sort, resolve_window, Error, Note, NoteInput, NotePage, NoteRepository,
    NoteScope, Pagination, Result,
};

use crate::aggregate::{fold_note_rows, NoteTagRow, NOTE_TAG_COLUMNS, TAG_NAME_ORDER};
use crate::escape_like;
use crate::tags::upsert_tag_tx;

/// PostgreSQL implementation of NoteRepository.
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

// =============================================================================
// HELPER FUNCTIONS FOR LIST QUERY BUILDING
// =============================================================================

/// Which notes of a book a listing returns.
#[derive(Debug, Clone)]
enum NoteFilter {
    Book { book_id: Uuid },
    Tag { book_id: Uuid, tag_id: Uuid },
    Search { book_id: Uuid, pattern: String },
}

impl NoteFilter {
    fn op(&self) -> &'static str {
        match self {
            NoteFilter::Book { .. } => "find_by_book_id",
            NoteFilter::Tag { .. } => "find_by_tag",
            NoteFilter::Search { .. } => "search",
        }
    }

    fn book_id(&self) -> Uuid {
        match self {
            NoteFilter::Book { book_id }
            | NoteFilter::Tag { book_id, .. }
            | NoteFilter::Search { book_id, .. } => *book_id,
        }
    }

    /// WHERE clause over `note n`; binds start at `$1`.
    fn where_clause(&self) -> &'static str {
        match self {
            NoteFilter::Book { .. } => "n.book_id = $1",
            NoteFilter::Tag { .. } => {
                "n.book_id = $1 AND EXISTS (SELECT 1 FROM note_tag f WHERE f.note_id = n.id AND f.tag_id = $2)"
            }
            NoteFilter::Search { .. } => {
                "n.book_id = $1 AND (n.title ILIKE $2 ESCAPE '\\' OR n.body ILIKE $2 ESCAPE '\\')"
            }
        }
    }

    fn param_count(&self) -> usize {
        match self {
            NoteFilter::Book { .. } => 1,
            NoteFilter::Tag { .. } | NoteFilter::Search { .. } => 2,
        }
    }
}

/// Macro to bind NoteFilter parameters to a query, in `where_clause` order.
macro_rules! bind_filter_params {
    ($query:expr, $filter:expr) => {{
        match $filter {
            NoteFilter::Book { book_id } => $query.bind(*book_id),
            NoteFilter::Tag { book_id, tag_id } => $query.bind(*book_id).bind(*tag_id),
            NoteFilter::Search { book_id, pattern } => $query.bind(*book_id).bind(pattern.as_str()),
        }
    }};
}

/// Map a note row without tag columns to a Note.
fn map_row_to_note(row: &sqlx::postgres::PgRow) -> Result<Note> {
    let scope: String = row.get("scope");
    Ok(Note {
        id: row.get("id"),
        book_id: row.get("book_id"),
        user_id: row.get("user_id"),
        path: row.get("path"),
        title: row.get("title"),
        body: row.get("body"),
        scope: scope.parse::<NoteScope>()?,
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
        tags: Vec::new(),
    })
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create_or_update(&self, input: NoteInput) -> Result<Note> {
        input.validate()?;
        let book_id = input.book_id;
        let path = input.path.clone();

        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        // On error the transaction is dropped uncommitted and rolls back.
        let note = match self.create_or_update_tx(&mut tx, input).await {
            Ok(note) => note,
            Err(e) => {
                warn!(
                    subsystem = "database",
                    component = "notes",
                    op = "create_or_update",
                    book_id = %book_id,
                    path = %path,
                    error_code = %e.code(),
                    error = %e,
                    "Note write rolled back"
                );
                return Err(e);
            }
        };
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(note)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Note> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let result = self.find_by_id_tx(&mut tx, id).await?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(result)
    }

    async fn find_by_book_id(&self, book_id: Uuid, pagination: Pagination) -> Result<NotePage> {
        self.list_page(NoteFilter::Book { book_id }, pagination).await
    }

    async fn find_by_tag(
        &self,
        book_id: Uuid,
        tag_id: Uuid,
        pagination: Pagination,
    ) -> Result<NotePage> {
        self.list_page(NoteFilter::Tag { book_id, tag_id }, pagination)
            .await
    }

    async fn search(&self, book_id: Uuid, query: &str, pagination: Pagination) -> Result<NotePage> {
        let pattern = format!("%{}%", escape_like(query));
        self.list_page(NoteFilter::Search { book_id, pattern }, pagination)
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "delete",
            note_id = %id,
            rows_affected = result.rows_affected(),
            "Note deleted"
        );
        Ok(())
    }

    async fn delete_by_path(&self, book_id: Uuid, paths: &[String]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM note WHERE book_id = $1 AND path = ANY($2)")
            .bind(book_id)
            .bind(paths)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "delete_by_path",
            book_id = %book_id,
            requested = paths.len(),
            rows_affected = result.rows_affected(),
            "Notes deleted by path"
        );
        Ok(result.rows_affected())
    }
}

/// Transaction-aware variants.
///
/// These accept an existing transaction so a caller can compose several
/// store operations into one atomic unit.
impl PgNoteRepository {
    /// Upsert a note and replace its tag set within an existing transaction.
    ///
    /// The caller is expected to have validated `input`.
    pub async fn create_or_update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: NoteInput,
    ) -> Result<Note> {
        let now = Utc::now();
        // Sorted so concurrent writers lock shared tag rows in the same order.
        // Byte order, the same order TAG_NAME_ORDER gives the reads.
        let mut tag_names = input.normalized_tags();
        tag_names.sort();

        let row = sqlx::query(
            "INSERT INTO note (id, book_id, user_id, path, title, body, scope, created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             ON CONFLICT (book_id, path) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                title = EXCLUDED.title,
                body = EXCLUDED.body,
                scope = EXCLUDED.scope,
                updated_at_utc = EXCLUDED.updated_at_utc
             RETURNING id, book_id, user_id, path, title, body, scope,
                       created_at_utc, updated_at_utc, (xmax = 0) AS inserted",
        )
        .bind(new_v7())
        .bind(input.book_id)
        .bind(&input.user_id)
        .bind(&input.path)
        .bind(&input.title)
        .bind(&input.body)
        .bind(input.scope.as_str())
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::from_sqlx)?;

        let inserted: bool = row.get("inserted");
        let mut note = map_row_to_note(&row)?;

        // Full replacement: prior associations go on create and update alike.
        let cleared = sqlx::query("DELETE FROM note_tag WHERE note_id = $1")
            .bind(note.id)
            .execute(&mut **tx)
            .await
            .map_err(Error::from_sqlx)?
            .rows_affected();

        for name in &tag_names {
            let tag = upsert_tag_tx(tx, note.book_id, name, now).await?;

            sqlx::query(
                "INSERT INTO note_tag (note_id, tag_id) VALUES ($1, $2)
                 ON CONFLICT (note_id, tag_id) DO NOTHING",
            )
            .bind(note.id)
            .bind(tag.id)
            .execute(&mut **tx)
            .await
            .map_err(Error::from_sqlx)?;

            note.tags.push(tag);
        }

        debug!(
            subsystem = "database",
            component = "notes",
            op = "create_or_update",
            note_id = %note.id,
            book_id = %note.book_id,
            path = %note.path,
            inserted,
            tags_cleared = cleared,
            tag_count = note.tags.len(),
            "Note upserted"
        );
        Ok(note)
    }

    /// Fetch a note with its tags within an existing transaction.
    pub async fn find_by_id_tx(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Note> {
        let query = format!(
            "SELECT {}
             FROM note n
             LEFT JOIN note_tag nt ON nt.note_id = n.id
             LEFT JOIN tag t ON t.id = nt.tag_id
             WHERE n.id = $1
             ORDER BY {}",
            NOTE_TAG_COLUMNS, TAG_NAME_ORDER
        );

        let rows: Vec<NoteTagRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::from_sqlx)?;

        fold_note_rows(rows)?
            .into_iter()
            .next()
            .ok_or(Error::NoteNotFound(id))
    }

    async fn list_page(&self, filter: NoteFilter, pagination: Pagination) -> Result<NotePage> {
        let start = Instant::now();

        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        // Count and page must describe the same snapshot.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(Error::from_sqlx)?;
        let page = self.list_page_tx(&mut tx, &filter, &pagination).await?;
        tx.commit().await.map_err(Error::from_sqlx)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = filter.op(),
            book_id = %filter.book_id(),
            result_count = page.items.len(),
            total = page.count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Note listing served"
        );
        Ok(page)
    }

    /// Count matches, then page over note ids, then join tags and fold.
    ///
    /// LIMIT/OFFSET apply to the id subquery only; applied after the tag join
    /// a note with three tags would take three page slots.
    async fn list_page_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filter: &NoteFilter,
        pagination: &Pagination,
    ) -> Result<NotePage> {
        let (field, order) = resolve_sort(pagination);
        let window = resolve_window(pagination);
        let where_clause = filter.where_clause();

        let count_query = format!("SELECT COUNT(*) FROM note n WHERE {}", where_clause);
        let count: i64 = {
            let q = sqlx::query_scalar(&count_query);
            let q = bind_filter_params!(q, filter);
            q.fetch_one(&mut **tx).await.map_err(Error::from_sqlx)?
        };

        if count == 0 || window.offset >= count {
            return Ok(NotePage {
                items: Vec::new(),
                count,
            });
        }

        let order_clause = format!(
            "{} {dir}, n.id {dir}",
            field.column(),
            dir = order.as_sql()
        );
        let limit_idx = filter.param_count() + 1;
        let page_query = format!(
            r#"
            WITH page AS (
                SELECT n.id FROM note n
                WHERE {where_clause}
                ORDER BY {order_clause}
                LIMIT ${limit_idx} OFFSET ${offset_idx}
            )
            SELECT {columns}
            FROM page p
            JOIN note n ON n.id = p.id
            LEFT JOIN note_tag nt ON nt.note_id = n.id
            LEFT JOIN tag t ON t.id = nt.tag_id
            ORDER BY {order_clause}, {tag_order}
            "#,
            offset_idx = limit_idx + 1,
            columns = NOTE_TAG_COLUMNS,
            tag_order = TAG_NAME_ORDER,
        );

        debug!(
            subsystem = "database",
            component = "notes",
            sort_column = field.column(),
            sort_order = order.as_sql(),
            limit = window.limit,
            offset = window.offset,
            "Resolved page window"
        );

        let rows: Vec<NoteTagRow> = {
            let q = sqlx::query_as(&page_query);
            let q = bind_filter_params!(q, filter);
            q.bind(window.limit)
                .bind(window.offset)
                .fetch_all(&mut **tx)
                .await
                .map_err(Error::from_sqlx)?
        };

        Ok(NotePage {
            items: fold_note_rows(rows)?,
            count,
        })
    }
}
