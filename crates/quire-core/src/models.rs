//! Core data models for quire.
//!
//! These types are shared across all quire crates and represent the note
//! persistence domain: notes, book-scoped tags and paginated note listings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::TAG_NAME_MAX_LEN;
use crate::error::{Error, Result};

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Visibility of a note once published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteScope {
    Public,
    #[default]
    Private,
    Limited,
}

impl NoteScope {
    /// Value stored in the `note.scope` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteScope::Public => "public",
            NoteScope::Private => "private",
            NoteScope::Limited => "limited",
        }
    }
}

impl fmt::Display for NoteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(NoteScope::Public),
            "private" => Ok(NoteScope::Private),
            "limited" => Ok(NoteScope::Limited),
            other => Err(Error::Serialization(format!(
                "unknown note scope '{}'",
                other
            ))),
        }
    }
}

/// A markdown document with its resolved tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: String,
    pub path: String,
    pub title: String,
    pub body: String,
    pub scope: NoteScope,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

impl Note {
    /// Tag names in the order they were attached to this aggregate.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Input for `create_or_update`.
///
/// `tags` is the complete desired tag set of the note, not a delta: names
/// missing from the list are detached, an empty list detaches everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    pub book_id: Uuid,
    pub user_id: String,
    pub path: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub scope: NoteScope,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NoteInput {
    /// Reject input that can never be stored.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::InvalidInput("Note path cannot be empty".to_string()));
        }
        for name in self.normalized_tags() {
            validate_tag_name(&name).map_err(Error::InvalidInput)?;
        }
        Ok(())
    }

    /// Distinct trimmed tag names, first occurrence wins, empties dropped.
    pub fn normalized_tags(&self) -> Vec<String> {
        normalize_tag_names(&self.tags)
    }
}

/// One page of notes plus the number of notes matching without pagination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePage {
    pub items: Vec<Note>,
    pub count: i64,
}

// =============================================================================
// TAG TYPES
// =============================================================================

/// A label scoped to a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub book_id: Uuid,
    pub name: String,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

/// A tag with the number of notes currently referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSummary {
    #[serde(flatten)]
    pub tag: Tag,
    pub note_count: i64,
}

/// Validate a tag name after trimming.
///
/// Rules:
/// - Not empty
/// - At most [`TAG_NAME_MAX_LEN`] characters
/// - No control characters
pub fn validate_tag_name(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("Tag name cannot be empty".to_string());
    }
    if tag.chars().count() > TAG_NAME_MAX_LEN {
        return Err(format!(
            "Tag name must be {} characters or less",
            TAG_NAME_MAX_LEN
        ));
    }
    if tag.chars().any(char::is_control) {
        return Err(format!("Tag '{}' contains control characters", tag.escape_debug()));
    }
    Ok(())
}

/// Trim, drop empties and collapse exact duplicates, keeping input order.
pub fn normalize_tag_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_string()))
        .map(str::to_string)
        .collect()
}
