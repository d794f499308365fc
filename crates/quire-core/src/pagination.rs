//! Page and sort resolution for note listings.
//!
//! Requests arrive with optional, loosely typed fields. These helpers turn
//! them into a whitelisted sort column and a non-negative LIMIT/OFFSET window
//! without touching the database, so the SQL layer only ever interpolates
//! values produced here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults::{PAGE, PAGE_LIMIT};

/// Page request as accepted from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size.
    pub limit: Option<i64>,
    /// Sort key: "title", "updatedAt" or "createdAt".
    pub order_by: Option<String>,
    /// Sort direction: "asc" or "desc".
    pub order: Option<String>,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, order_by: &str, order: &str) -> Self {
        self.order_by = Some(order_by.to_string());
        self.order = Some(order.to_string());
        self
    }
}

/// Sortable note columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    Title,
    UpdatedAt,
    #[default]
    CreatedAt,
}

impl SortField {
    /// Parse a request key; unknown keys yield `None`.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "title" => Some(SortField::Title),
            "updatedAt" => Some(SortField::UpdatedAt),
            "createdAt" => Some(SortField::CreatedAt),
            _ => None,
        }
    }

    /// Qualified column for queries aliasing `note` as `n`.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Title => "n.title",
            SortField::UpdatedAt => "n.updated_at_utc",
            SortField::CreatedAt => "n.created_at_utc",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// LIMIT/OFFSET pair derived from a [`Pagination`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

/// Resolve the sort column and direction.
///
/// An unknown `order_by` falls back to the default field and an unknown
/// `order` to the default direction, independently of each other.
pub fn resolve_sort(pagination: &Pagination) -> (SortField, SortOrder) {
    let field = match pagination.order_by.as_deref() {
        Some(key) => SortField::parse(key).unwrap_or_else(|| {
            debug!(
                subsystem = "database",
                component = "pagination",
                requested = key,
                "Unsupported sort key, using default"
            );
            SortField::default()
        }),
        None => SortField::default(),
    };
    let order = pagination
        .order
        .as_deref()
        .and_then(SortOrder::parse)
        .unwrap_or_default();

    (field, order)
}

/// Resolve LIMIT/OFFSET with `offset = (page - 1) * limit`.
///
/// Pages below 1 are treated as page 1; limits below 1 use the default and
/// any positive limit is honoured as given.
pub fn resolve_window(pagination: &Pagination) -> PageWindow {
    let page = pagination.page.unwrap_or(PAGE).max(1);
    let limit = match pagination.limit {
        Some(limit) if limit >= 1 => limit,
        _ => PAGE_LIMIT,
    };
    PageWindow {
        limit,
        offset: (page - 1).saturating_mul(limit),
    }
}
