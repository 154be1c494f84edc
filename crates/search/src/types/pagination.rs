//! Paging and sorting parameters for queries.

use serde::{Deserialize, Serialize};

/// Caller-supplied paging and sorting parameters.
///
/// `count` is an output: queries write the backend's total hit count back
/// into the cursor so callers can render pagination.
///
/// # Offsets
///
/// Offsets are clamped against runaway deep paging: a page outside
/// `1..=max_pages` always starts at offset 0.
///
/// ```
/// use kestrel_search::PageCursor;
///
/// assert_eq!(PageCursor::new(3, 10).offset(1000), 20);
/// assert_eq!(PageCursor::new(0, 10).offset(1000), 0);
/// assert_eq!(PageCursor::new(1001, 10).offset(1000), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// 1-based page number.
    pub page: u32,

    /// Page size; 0 means the configured default.
    pub limit: u32,

    /// Field to sort by; relevance score when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    /// Sort direction for `sort_by`.
    #[serde(default = "default_descending")]
    pub descending: bool,

    /// Total number of matches reported by the last query.
    #[serde(default)]
    pub count: u64,
}

fn default_descending() -> bool {
    true
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 0,
            sort_by: None,
            descending: true,
            count: 0,
        }
    }
}

impl PageCursor {
    /// Creates a cursor for the given page and page size.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }

    /// Creates a cursor for the first page with the given page size.
    pub fn first(limit: u32) -> Self {
        Self::new(1, limit)
    }

    /// Sorts by a field instead of relevance.
    pub fn with_sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort_by = Some(field.into());
        self.descending = descending;
        self
    }

    /// Returns the page size, substituting `default_size` for 0 and capping
    /// at `max_size`.
    pub fn size(&self, default_size: u32, max_size: u32) -> u32 {
        let limit = if self.limit == 0 {
            default_size
        } else {
            self.limit
        };
        limit.clamp(1, max_size.max(1))
    }

    /// Returns the result offset for this cursor's page and limit.
    pub fn offset(&self, max_pages: u32) -> u64 {
        self.offset_for(self.limit, max_pages)
    }

    /// Returns the result offset for this cursor's page and an explicit size.
    pub fn offset_for(&self, size: u32, max_pages: u32) -> u64 {
        if self.page < 1 || self.page > max_pages {
            0
        } else {
            u64::from(self.page - 1) * u64::from(size)
        }
    }

    /// Returns `true` if the cursor sorts by relevance score.
    pub fn sorts_by_score(&self) -> bool {
        self.sort_by
            .as_deref()
            .is_none_or(|field| field.trim().is_empty())
    }
}
