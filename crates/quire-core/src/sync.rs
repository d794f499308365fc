//! Note synchronisation from an external content provider.
//!
//! A book mirrors a source repository. The provider hands back raw markdown
//! for a path; this module turns it into a [`NoteInput`] and drives the note
//! store. Removal of paths is followed by the unused-tag sweep so tags only
//! referenced by the removed notes disappear with them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::defaults::UNTITLED;
use crate::error::{Error, ErrorCode, Result};
use crate::models::{normalize_tag_names, NoteInput, NoteScope};
use crate::traits::{NoteRepository, TagRepository};

/// Source of raw markdown documents (e.g. a GitHub contents adapter).
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Fetch the raw markdown stored at `path` in `source`.
    async fn fetch_markdown(&self, credentials: &str, source: &str, path: &str) -> Result<String>;
}

/// Where synced notes come from and whom they belong to.
#[derive(Clone)]
pub struct SyncTarget {
    pub book_id: Uuid,
    pub user_id: String,
    /// Provider-specific source locator, e.g. `owner/repo`.
    pub source: String,
    pub credentials: String,
}

impl fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTarget")
            .field("book_id", &self.book_id)
            .field("user_id", &self.user_id)
            .field("source", &self.source)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

/// Markdown split into the fields a note stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNote {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub scope: NoteScope,
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    title: Option<String>,
    tags: Option<TagsField>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Csv(String),
}

impl TagsField {
    fn into_names(self) -> Vec<String> {
        match self {
            TagsField::List(names) => normalize_tag_names(&names),
            TagsField::Csv(csv) => normalize_tag_names(&csv.split(',').collect::<Vec<_>>()),
        }
    }
}

/// Split a leading `---` delimited front matter block from the body.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let rest = match raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, raw),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    // No closing delimiter: the whole document is body.
    (None, raw)
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim_start)
        .find(|line| line.starts_with('#') && line.trim_start_matches('#').starts_with(' '))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}

fn file_stem(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => name,
    };
    let stem = stem.trim();
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Parse a markdown document fetched from `path`.
///
/// Front matter may set `title`, `tags` (YAML list or comma separated
/// string) and `scope`. The title otherwise comes from the first heading,
/// then from the file name.
pub fn parse_markdown(path: &str, raw: &str) -> Result<ParsedNote> {
    let (yaml, body) = split_front_matter(raw);
    let front: FrontMatter = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml).map_err(|e| {
            Error::InvalidInput(format!("Invalid front matter in {}: {}", path, e))
        })?,
        _ => FrontMatter::default(),
    };

    let scope = match front.scope.as_deref() {
        Some(scope) => scope
            .parse::<NoteScope>()
            .map_err(|_| Error::InvalidInput(format!("Invalid scope '{}' in {}", scope, path)))?,
        None => NoteScope::default(),
    };

    let title = front
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| first_heading(body))
        .or_else(|| file_stem(path))
        .unwrap_or_else(|| UNTITLED.to_string());

    Ok(ParsedNote {
        title,
        body: body.to_string(),
        tags: front.tags.map(TagsField::into_names).unwrap_or_default(),
        scope,
    })
}

/// A path that could not be synced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub path: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Outcome of [`NoteSyncService::sync_paths`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: Vec<Uuid>,
    pub failures: Vec<SyncFailure>,
}

/// Drives the note store from provider content.
pub struct NoteSyncService {
    provider: Arc<dyn ContentProvider>,
    notes: Arc<dyn NoteRepository>,
    tags: Arc<dyn TagRepository>,
}

impl NoteSyncService {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        notes: Arc<dyn NoteRepository>,
        tags: Arc<dyn TagRepository>,
    ) -> Self {
        Self {
            provider,
            notes,
            tags,
        }
    }

    /// Fetch, parse and store each path.
    ///
    /// Fetch and parse failures are recorded per path and do not stop the
    /// run. A store failure aborts the run and is returned.
    pub async fn sync_paths(&self, target: &SyncTarget, paths: &[String]) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        for path in paths {
            let parsed = match self.fetch_and_parse(target, path).await {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(
                        subsystem = "sync",
                        book_id = %target.book_id,
                        path = %path,
                        error_code = %e.code(),
                        error = %e,
                        "Skipping document"
                    );
                    report.failures.push(SyncFailure {
                        path: path.clone(),
                        code: e.code(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let note = self
                .notes
                .create_or_update(NoteInput {
                    book_id: target.book_id,
                    user_id: target.user_id.clone(),
                    path: path.clone(),
                    title: parsed.title,
                    body: parsed.body,
                    scope: parsed.scope,
                    tags: parsed.tags,
                })
                .await?;
            debug!(
                subsystem = "sync",
                note_id = %note.id,
                path = %path,
                tag_count = note.tags.len(),
                "Document synced"
            );
            report.synced.push(note.id);
        }

        info!(
            subsystem = "sync",
            op = "sync_paths",
            book_id = %target.book_id,
            result_count = report.synced.len(),
            failures = report.failures.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Sync finished"
        );
        Ok(report)
    }

    /// Delete the notes at `paths` and sweep tags left without notes.
    pub async fn remove_paths(&self, book_id: Uuid, paths: &[String]) -> Result<u64> {
        let removed = self.notes.delete_by_path(book_id, paths).await?;
        let swept = self.tags.delete_unused().await?;
        info!(
            subsystem = "sync",
            op = "remove_paths",
            book_id = %book_id,
            rows_affected = removed,
            tags_swept = swept,
            "Removed documents"
        );
        Ok(removed)
    }

    async fn fetch_and_parse(&self, target: &SyncTarget, path: &str) -> Result<ParsedNote> {
        let raw = self
            .provider
            .fetch_markdown(&target.credentials, &target.source, path)
            .await?;
        parse_markdown(path, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Note, NotePage, Tag, TagSummary};
    use crate::pagination::Pagination;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ── parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_front_matter_sets_title_tags_and_scope() {
        let raw = "---\ntitle: Release notes\ntags: [rust, sql]\nscope: public\n---\n# Heading\n\nBody";
        let parsed = parse_markdown("notes/release.md", raw).unwrap();
        assert_eq!(parsed.title, "Release notes");
        assert_eq!(parsed.tags, vec!["rust", "sql"]);
        assert_eq!(parsed.scope, NoteScope::Public);
        assert_eq!(parsed.body, "# Heading\n\nBody");
    }

    #[test]
    fn test_comma_separated_tags() {
        let raw = "---\ntags: \"a, b ,a\"\n---\ntext";
        let parsed = parse_markdown("x.md", raw).unwrap();
        assert_eq!(parsed.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_title_falls_back_to_first_heading() {
        let parsed = parse_markdown("x.md", "intro\n## Getting Started\nmore").unwrap();
        assert_eq!(parsed.title, "Getting Started");
        assert_eq!(parsed.scope, NoteScope::Private);
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_hashtag_is_not_a_heading() {
        let parsed = parse_markdown("docs/setup-guide.md", "#rust is fun").unwrap();
        assert_eq!(parsed.title, "setup-guide");
    }

    #[test]
    fn test_title_falls_back_to_untitled() {
        let parsed = parse_markdown("", "").unwrap();
        assert_eq!(parsed.title, UNTITLED);
    }

    #[test]
    fn test_unterminated_front_matter_is_body() {
        let raw = "---\ntitle: nope\nbody";
        let parsed = parse_markdown("a.md", raw).unwrap();
        assert_eq!(parsed.body, raw);
        assert_eq!(parsed.title, "a");
    }

    #[test]
    fn test_invalid_scope_is_invalid_input() {
        let err = parse_markdown("a.md", "---\nscope: secret\n---\n").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_invalid_yaml_is_invalid_input() {
        let err = parse_markdown("a.md", "---\ntitle: [unclosed\n---\n").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_target_debug_redacts_credentials() {
        let target = SyncTarget {
            book_id: Uuid::nil(),
            user_id: "u".to_string(),
            source: "owner/repo".to_string(),
            credentials: "ghp_secret".to_string(),
        };
        let debug = format!("{:?}", target);
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("<redacted>"));
    }

    // ── service ───────────────────────────────────────────────────────────

    struct MapProvider(HashMap<String, String>);

    #[async_trait]
    impl ContentProvider for MapProvider {
        async fn fetch_markdown(&self, _: &str, _: &str, path: &str) -> Result<String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| Error::Provider(format!("{} not found upstream", path)))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        notes: Mutex<Vec<Note>>,
        sweeps: Mutex<u32>,
    }

    #[async_trait]
    impl NoteRepository for MemoryStore {
        async fn create_or_update(&self, input: NoteInput) -> Result<Note> {
            let now = Utc::now();
            let tags = input
                .normalized_tags()
                .into_iter()
                .map(|name| Tag {
                    id: Uuid::new_v4(),
                    book_id: input.book_id,
                    name,
                    created_at_utc: now,
                    updated_at_utc: now,
                })
                .collect();
            let mut notes = self.notes.lock().unwrap();
            notes.retain(|n| !(n.book_id == input.book_id && n.path == input.path));
            let note = Note {
                id: Uuid::new_v4(),
                book_id: input.book_id,
                user_id: input.user_id,
                path: input.path,
                title: input.title,
                body: input.body,
                scope: input.scope,
                created_at_utc: now,
                updated_at_utc: now,
                tags,
            };
            notes.push(note.clone());
            Ok(note)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Note> {
            self.notes
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.id == id)
                .cloned()
                .ok_or(Error::NoteNotFound(id))
        }

        async fn find_by_book_id(&self, _: Uuid, _: Pagination) -> Result<NotePage> {
            unimplemented!()
        }

        async fn find_by_tag(&self, _: Uuid, _: Uuid, _: Pagination) -> Result<NotePage> {
            unimplemented!()
        }

        async fn search(&self, _: Uuid, _: &str, _: Pagination) -> Result<NotePage> {
            unimplemented!()
        }

        async fn delete(&self, id: Uuid) -> Result<()> {
            self.notes.lock().unwrap().retain(|n| n.id != id);
            Ok(())
        }

        async fn delete_by_path(&self, book_id: Uuid, paths: &[String]) -> Result<u64> {
            let mut notes = self.notes.lock().unwrap();
            let before = notes.len();
            notes.retain(|n| !(n.book_id == book_id && paths.contains(&n.path)));
            Ok((before - notes.len()) as u64)
        }
    }

    #[async_trait]
    impl TagRepository for MemoryStore {
        async fn upsert(&self, _: Uuid, _: &str) -> Result<Tag> {
            unimplemented!()
        }

        async fn find_by_note_id(&self, _: Uuid) -> Result<Vec<Tag>> {
            unimplemented!()
        }

        async fn find_by_book_id(&self, _: Uuid) -> Result<Vec<TagSummary>> {
            unimplemented!()
        }

        async fn delete_unused(&self) -> Result<u64> {
            *self.sweeps.lock().unwrap() += 1;
            Ok(0)
        }
    }

    fn target() -> SyncTarget {
        SyncTarget {
            book_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            source: "owner/repo".to_string(),
            credentials: "token".to_string(),
        }
    }

    fn service(docs: &[(&str, &str)], store: Arc<MemoryStore>) -> NoteSyncService {
        let provider = MapProvider(
            docs.iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        );
        NoteSyncService::new(Arc::new(provider), store.clone(), store)
    }

    #[tokio::test]
    async fn test_sync_stores_documents_and_records_failures() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(
            &[
                ("a.md", "---\ntags: [x]\n---\n# A"),
                ("bad.md", "---\nscope: nope\n---\n"),
            ],
            store.clone(),
        );

        let paths = vec!["a.md".to_string(), "missing.md".to_string(), "bad.md".to_string()];
        let report = svc.sync_paths(&target(), &paths).await.unwrap();

        assert_eq!(report.synced.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].path, "missing.md");
        assert_eq!(report.failures[0].code, ErrorCode::ProviderError);
        assert_eq!(report.failures[1].code, ErrorCode::InvalidInput);

        let note = store.find_by_id(report.synced[0]).await.unwrap();
        assert_eq!(note.title, "A");
        assert_eq!(note.tag_names(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_resync_replaces_note_for_same_path() {
        let store = Arc::new(MemoryStore::default());
        let t = target();
        let paths = vec!["a.md".to_string()];

        service(&[("a.md", "# One")], store.clone())
            .sync_paths(&t, &paths)
            .await
            .unwrap();
        service(&[("a.md", "# Two")], store.clone())
            .sync_paths(&t, &paths)
            .await
            .unwrap();

        let notes = store.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Two");
    }

    #[tokio::test]
    async fn test_remove_paths_deletes_then_sweeps() {
        let store = Arc::new(MemoryStore::default());
        let t = target();
        let svc = service(&[("a.md", "# A"), ("b.md", "# B")], store.clone());
        svc.sync_paths(&t, &["a.md".to_string(), "b.md".to_string()])
            .await
            .unwrap();

        let removed = svc.remove_paths(t.book_id, &["a.md".to_string()]).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(*store.sweeps.lock().unwrap(), 1);
        assert_eq!(store.notes.lock().unwrap().len(), 1);
    }
}
