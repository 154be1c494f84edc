//! Search index engine trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageResult;
use crate::query::NativeQuery;
use crate::types::fields;

/// A document to write into an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Physical index name.
    pub index: String,
    /// Document id (the object's storage key).
    pub id: String,
    /// Document source.
    pub source: Value,
}

/// One operation of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BulkOperation {
    /// Index (create or replace) a document.
    Index(IndexDocument),
    /// Delete a document.
    Delete {
        /// Physical index name.
        index: String,
        /// Document id.
        id: String,
    },
}

impl BulkOperation {
    /// Returns the document id the operation targets.
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index(doc) => &doc.id,
            BulkOperation::Delete { id, .. } => id,
        }
    }
}

/// A failed item of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// Document id.
    pub id: String,
    /// Failure reason reported by the engine.
    pub reason: String,
}

/// Outcome of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Time the engine spent on the request.
    pub took_ms: u64,
    /// Number of items in the request.
    pub items: usize,
    /// Items that failed.
    pub failures: Vec<BulkFailure>,
}

impl BulkResponse {
    /// Returns `true` if any item failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns a one-line summary of the failures.
    pub fn failure_message(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}]: {}", f.id, f.reason))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Result ordering of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Relevance score, descending.
    #[default]
    Score,
    /// A document field.
    Field {
        /// Field name.
        field: String,
        /// Sort direction.
        descending: bool,
    },
}

/// A paged search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Physical index name.
    pub index: String,
    /// Native query.
    pub query: NativeQuery,
    /// Result ordering.
    pub sort: SortOrder,
    /// Offset of the first hit.
    pub from: u64,
    /// Maximum number of hits; 0 only counts.
    pub size: u32,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Document id.
    pub id: String,
    /// Relevance score.
    pub score: f64,
    /// Document source.
    pub source: Value,
}

impl Hit {
    /// Returns the object id recorded in the source, falling back to the
    /// document id.
    pub fn object_id(&self) -> &str {
        self.source
            .get(fields::ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }

    /// Returns a source field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.source.get(name)
    }
}

/// Hits of a search together with the total match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    /// Total number of matching documents.
    pub total: u64,
    /// Hits of the requested page.
    pub hits: Vec<Hit>,
}

impl SearchHits {
    /// Returns `true` if the page has no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// One page of a scroll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPage {
    /// Cursor for the next page.
    pub scroll_id: Option<String>,
    /// Hits of this page.
    pub hits: Vec<Hit>,
}

/// Client of the search index engine.
///
/// Index names are physical names resolved by the
/// [`TenantResourceMapper`](crate::tenant::TenantResourceMapper).
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Checks whether an index exists.
    async fn index_exists(&self, index: &str) -> StorageResult<bool>;

    /// Creates an index with the document mapping.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation(ResourceAlreadyExists)` - If the index exists
    async fn create_index(&self, index: &str) -> StorageResult<()>;

    /// Deletes an index and all of its documents.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation(ResourceNotFound)` - If the index doesn't exist
    async fn delete_index(&self, index: &str) -> StorageResult<()>;

    /// Indexes (creates or replaces) a document.
    async fn index(&self, doc: IndexDocument) -> StorageResult<()>;

    /// Deletes a document. Deleting a missing document is not an error.
    async fn delete(&self, index: &str, id: &str) -> StorageResult<()>;

    /// Reads a document source by id.
    async fn get(&self, index: &str, id: &str) -> StorageResult<Option<Value>>;

    /// Reads the sources of the documents that exist, in request order.
    async fn multi_get(&self, index: &str, ids: &[String]) -> StorageResult<Vec<Value>>;

    /// Executes a bulk request. Per-item failures are reported in the
    /// response, not as an error.
    async fn bulk(&self, operations: Vec<BulkOperation>) -> StorageResult<BulkResponse>;

    /// Executes a paged search.
    async fn search(&self, request: SearchRequest) -> StorageResult<SearchHits>;

    /// Starts a scroll over all matches of a query.
    async fn scroll_start(
        &self,
        index: &str,
        query: &NativeQuery,
        size: u32,
        keep_alive: Duration,
    ) -> StorageResult<ScrollPage>;

    /// Fetches the next page of a scroll.
    ///
    /// # Errors
    ///
    /// * `StorageError::Search(InvalidScroll)` - If the cursor is unknown or expired
    async fn scroll_next(&self, scroll_id: &str, keep_alive: Duration)
    -> StorageResult<ScrollPage>;

    /// Releases a scroll cursor.
    async fn clear_scroll(&self, scroll_id: &str) -> StorageResult<()>;

    /// Makes recent writes visible to searches.
    async fn refresh(&self, index: &str) -> StorageResult<()>;
}
