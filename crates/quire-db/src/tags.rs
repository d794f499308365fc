//! Tag repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use quire_core::{new_v7, validate_tag_name, Error, Result, Tag, TagRepository, TagSummary};

/// PostgreSQL implementation of TagRepository.
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    /// Create a new PgTagRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn map_row_to_tag(row: &sqlx::postgres::PgRow) -> Tag {
    Tag {
        id: row.get("id"),
        book_id: row.get("book_id"),
        name: row.get("name"),
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
    }
}

/// Insert the tag, or touch `updated_at_utc` of the existing (book_id, name)
/// row, and return it.
///
/// The conflict update takes the row lock, so a concurrent sweep skips the
/// tag until this transaction ends.
pub(crate) async fn upsert_tag_tx(
    tx: &mut Transaction<'_, Postgres>,
    book_id: Uuid,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Tag> {
    let row = sqlx::query(
        "INSERT INTO tag (id, book_id, name, created_at_utc, updated_at_utc)
         VALUES ($1, $2, $3, $4, $4)
         ON CONFLICT (book_id, name) DO UPDATE SET updated_at_utc = EXCLUDED.updated_at_utc
         RETURNING id, book_id, name, created_at_utc, updated_at_utc",
    )
    .bind(new_v7())
    .bind(book_id)
    .bind(name)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::from_sqlx)?;

    Ok(map_row_to_tag(&row))
}

/// Delete unreferenced tags within an existing transaction.
///
/// Candidates are locked first; tags locked by an in-flight note write are
/// skipped. The delete re-checks the join table with a fresh snapshot, so a
/// reference committed between the two statements keeps its tag.
pub(crate) async fn delete_unused_tx(tx: &mut Transaction<'_, Postgres>) -> Result<u64> {
    let candidates: Vec<Uuid> = sqlx::query_scalar(
        "SELECT t.id FROM tag t
         LEFT JOIN note_tag nt ON nt.tag_id = t.id
         WHERE nt.tag_id IS NULL
         FOR UPDATE OF t SKIP LOCKED",
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(Error::from_sqlx)?;

    if candidates.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "DELETE FROM tag t
         WHERE t.id = ANY($1)
           AND NOT EXISTS (SELECT 1 FROM note_tag nt WHERE nt.tag_id = t.id)",
    )
    .bind(&candidates)
    .execute(&mut **tx)
    .await
    .map_err(Error::from_sqlx)?;

    debug!(
        subsystem = "database",
        component = "tags",
        op = "delete_unused",
        candidates = candidates.len(),
        rows_affected = result.rows_affected(),
        "Swept unused tags"
    );
    Ok(result.rows_affected())
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn upsert(&self, book_id: Uuid, name: &str) -> Result<Tag> {
        let name = name.trim();
        validate_tag_name(name).map_err(Error::InvalidInput)?;

        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let tag = upsert_tag_tx(&mut tx, book_id, name, Utc::now()).await?;
        tx.commit().await.map_err(Error::from_sqlx)?;
        Ok(tag)
    }

    async fn find_by_note_id(&self, note_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"SELECT t.id, t.book_id, t.name, t.created_at_utc, t.updated_at_utc
             FROM tag t
             JOIN note_tag nt ON nt.tag_id = t.id
             WHERE nt.note_id = $1
             ORDER BY t.name COLLATE "C""#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;

        Ok(rows.iter().map(map_row_to_tag).collect())
    }

    async fn find_by_book_id(&self, book_id: Uuid) -> Result<Vec<TagSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                t.id, t.book_id, t.name, t.created_at_utc, t.updated_at_utc,
                COUNT(nt.note_id) AS note_count
            FROM tag t
            LEFT JOIN note_tag nt ON nt.tag_id = t.id
            WHERE t.book_id = $1
            GROUP BY t.id
            ORDER BY t.name COLLATE "C"
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;

        Ok(rows
            .iter()
            .map(|row| TagSummary {
                tag: map_row_to_tag(row),
                note_count: row.get("note_count"),
            })
            .collect())
    }

    async fn delete_unused(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::from_sqlx)?;
        let removed = delete_unused_tx(&mut tx).await?;
        tx.commit().await.map_err(Error::from_sqlx)?;

        info!(
            subsystem = "database",
            component = "tags",
            op = "delete_unused",
            rows_affected = removed,
            "Unused tag sweep finished"
        );
        Ok(removed)
    }
}
