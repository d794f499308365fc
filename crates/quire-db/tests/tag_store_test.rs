//! Integration tests for the PostgreSQL tag store and the unused-tag sweep.
//!
//! The sweep is database-wide, so assertions only look at the test's own book.

use std::sync::Arc;

use async_trait::async_trait;
use quire_db::test_fixtures::{TestDataBuilder, TestDatabase};
use quire_db::{
    ContentProvider, Error, ErrorCode, NoteRepository, NoteSyncService, Pagination,
    PgNoteRepository, PgTagRepository, Result, SyncTarget, TagRepository,
};

async fn tag_names(db: &TestDatabase) -> Vec<String> {
    db.tags
        .find_by_book_id(db.book_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.tag.name)
        .collect()
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_upsert_is_idempotent_per_book_and_name() {
    let db = TestDatabase::new().await;

    let first = db.tags.upsert(db.book_id, "rust").await.unwrap();
    let again = db.tags.upsert(db.book_id, "  rust ").await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(again.name, "rust");
    assert!(again.updated_at_utc >= first.updated_at_utc);
    assert_eq!(db.tag_row_count().await, 1);

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_upsert_rejects_blank_name() {
    let db = TestDatabase::new().await;

    let err = db.tags.upsert(db.book_id, "   ").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_same_name_in_two_books_is_two_tags() {
    let db = TestDatabase::new().await;
    let other = TestDatabase::new().await;

    let a = db.tags.upsert(db.book_id, "shared").await.unwrap();
    let b = other.tags.upsert(other.book_id, "shared").await.unwrap();

    assert_ne!(a.id, b.id);

    db.cleanup().await;
    other.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_find_by_book_id_reports_note_counts() {
    let db = TestDatabase::new().await;
    TestDataBuilder::new(&db)
        .with_tagged_note("a.md", "A", &["x", "y"])
        .await
        .with_tagged_note("b.md", "B", &["x"])
        .await
        .build();

    let summaries = db.tags.find_by_book_id(db.book_id).await.unwrap();
    let counts: Vec<(&str, i64)> = summaries
        .iter()
        .map(|s| (s.tag.name.as_str(), s.note_count))
        .collect();

    assert_eq!(counts, vec![("x", 2), ("y", 1)]);

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_delete_unused_removes_orphans_and_keeps_referenced() {
    let db = TestDatabase::new().await;
    TestDataBuilder::new(&db)
        .with_tagged_note("a.md", "A", &["keep", "drop"])
        .await
        .build();
    db.notes
        .create_or_update(db.note_input("a.md", "A", &["keep"]))
        .await
        .unwrap();
    db.tags.upsert(db.book_id, "never-used").await.unwrap();

    let removed = db.tags.delete_unused().await.unwrap();

    assert!(removed >= 2, "removed {}", removed);
    assert_eq!(tag_names(&db).await, vec!["keep"]);

    // Nothing left to sweep for this book.
    db.tags.delete_unused().await.unwrap();
    assert_eq!(tag_names(&db).await, vec!["keep"]);

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_sweep_after_note_delete() {
    let db = TestDatabase::new().await;
    let data = TestDataBuilder::new(&db)
        .with_tagged_note("a.md", "A", &["solo"])
        .await
        .build();

    db.notes.delete(data.notes[0].id).await.unwrap();
    db.tags.delete_unused().await.unwrap();

    assert!(tag_names(&db).await.is_empty());

    db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_sweep_concurrent_with_writes_keeps_referenced_tags() {
    let db = TestDatabase::new().await;

    for round in 0..5 {
        let (write, sweep) = tokio::join!(
            db.notes
                .create_or_update(db.note_input("a.md", "A", &["hot"])),
            db.tags.delete_unused(),
        );
        let note = write.unwrap();
        sweep.unwrap();

        let stored = db.notes.find_by_id(note.id).await.unwrap();
        assert_eq!(stored.tag_names(), vec!["hot"], "round {}", round);
    }

    db.cleanup().await;
}

struct StaticProvider;

#[async_trait]
impl ContentProvider for StaticProvider {
    async fn fetch_markdown(&self, _: &str, _: &str, path: &str) -> Result<String> {
        match path {
            "guide.md" => Ok("---\ntags: [docs, rust]\n---\n# Guide\n\nHello".to_string()),
            "faq.md" => Ok("# FAQ\n\nQuestions".to_string()),
            other => Err(Error::Provider(format!("no such file: {}", other))),
        }
    }
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_sync_service_against_postgres() {
    let db = TestDatabase::new().await;
    let service = NoteSyncService::new(
        Arc::new(StaticProvider),
        Arc::new(PgNoteRepository::new(db.pool.clone())),
        Arc::new(PgTagRepository::new(db.pool.clone())),
    );
    let target = SyncTarget {
        book_id: db.book_id,
        user_id: "sync-user".to_string(),
        source: "owner/repo".to_string(),
        credentials: "token".to_string(),
    };

    let report = service
        .sync_paths(
            &target,
            &["guide.md".to_string(), "faq.md".to_string(), "gone.md".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(report.synced.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].code, ErrorCode::ProviderError);

    let guide = db.notes.find_by_id(report.synced[0]).await.unwrap();
    assert_eq!(guide.title, "Guide");
    assert_eq!(guide.tag_names(), vec!["docs", "rust"]);

    let removed = service
        .remove_paths(db.book_id, &["guide.md".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(tag_names(&db).await.is_empty());

    let page = db
        .notes
        .find_by_book_id(db.book_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].title, "FAQ");

    db.cleanup().await;
}
