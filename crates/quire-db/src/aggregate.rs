//! Folding of flattened note/tag join rows into note aggregates.
//!
//! `note LEFT JOIN note_tag LEFT JOIN tag` yields one row per (note, tag)
//! pair, or a single tag-less row for a note without tags. Listings select
//! [`NOTE_TAG_COLUMNS`] into [`NoteTagRow`] and fold them here, one pass, in
//! the order the query returned them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::trace;
use uuid::Uuid;

use quire_core::{Note, NoteScope, Result, Tag};

/// Select list shared by every note/tag join. Expects aliases `n`, `t`.
pub const NOTE_TAG_COLUMNS: &str = "n.id, n.book_id, n.user_id, n.path, n.title, n.body, \
     n.scope, n.created_at_utc, n.updated_at_utc, \
     t.id AS tag_id, t.book_id AS tag_book_id, t.name AS tag_name, \
     t.created_at_utc AS tag_created_at_utc, t.updated_at_utc AS tag_updated_at_utc";

/// Tag ordering for every read. Byte order, independent of the database
/// collation, so it matches the order `create_or_update` returns.
pub const TAG_NAME_ORDER: &str = "t.name COLLATE \"C\"";

/// One flattened row of a note/tag join.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NoteTagRow {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: String,
    pub path: String,
    pub title: String,
    pub body: String,
    pub scope: String,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
    pub tag_id: Option<Uuid>,
    pub tag_book_id: Option<Uuid>,
    pub tag_name: Option<String>,
    pub tag_created_at_utc: Option<DateTime<Utc>>,
    pub tag_updated_at_utc: Option<DateTime<Utc>>,
}

impl NoteTagRow {
    /// The tag half of the row, if the left join matched one.
    fn take_tag(&mut self) -> Option<Tag> {
        match (
            self.tag_id,
            self.tag_book_id,
            self.tag_name.take(),
            self.tag_created_at_utc,
            self.tag_updated_at_utc,
        ) {
            (Some(id), Some(book_id), Some(name), Some(created_at_utc), Some(updated_at_utc)) => {
                Some(Tag {
                    id,
                    book_id,
                    name,
                    created_at_utc,
                    updated_at_utc,
                })
            }
            _ => None,
        }
    }

    fn into_note(self, tags: Vec<Tag>) -> Result<Note> {
        Ok(Note {
            scope: self.scope.parse::<NoteScope>()?,
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            path: self.path,
            title: self.title,
            body: self.body,
            created_at_utc: self.created_at_utc,
            updated_at_utc: self.updated_at_utc,
            tags,
        })
    }
}

/// Fold join rows into one note per id.
///
/// Notes keep the order in which their first row appeared, so the SQL
/// ORDER BY carries through. A tag already present on a note is not appended
/// again.
pub fn fold_note_rows(rows: Vec<NoteTagRow>) -> Result<Vec<Note>> {
    let mut notes: Vec<Note> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for mut row in rows {
        let tag = row.take_tag();
        trace!(
            subsystem = "database",
            component = "aggregate",
            note_id = %row.id,
            tag_id = ?tag.as_ref().map(|t| t.id),
            "Folding join row"
        );

        match index.get(&row.id) {
            Some(&pos) => {
                if let Some(tag) = tag {
                    let tags = &mut notes[pos].tags;
                    if !tags.iter().any(|t| t.id == tag.id) {
                        tags.push(tag);
                    }
                }
            }
            None => {
                index.insert(row.id, notes.len());
                notes.push(row.into_note(tag.into_iter().collect())?);
            }
        }
    }

    Ok(notes)
}
