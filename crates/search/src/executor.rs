//! Index mutations and raw queries.
//!
//! [`SearchExecutor`] is the only component that writes to or reads from the
//! [`IndexClient`]. Every public operation absorbs backend failures: they are
//! logged and degrade to "nothing happened", an empty page or zero.
//!
//! # Write modes
//!
//! | `async_indexing` | Behavior |
//! |------------------|----------|
//! | `false` | The call returns once the engine acknowledged the write |
//! | `true` | The write is spawned on the runtime; the call returns at once |
//!
//! In async mode callers must not expect read-after-write visibility.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::core::{
    BulkOperation, BulkResponse, IndexClient, IndexDocument, SearchHits, SearchRequest, SortOrder,
};
use crate::error::{StorageError, StorageResult};
use crate::query::{NativeQuery, QueryTranslator, TermFilter};
use crate::tenant::{TenantContext, TenantResourceMapper, is_blank};
use crate::types::{Indexable, PageCursor, fields};

/// What a bulk write achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Operations sent to the engine.
    pub submitted: u64,
    /// Operations the engine applied. In async mode every submitted
    /// operation counts, since the result is never awaited.
    pub acknowledged: u64,
}

impl BulkOutcome {
    fn from_response(submitted: u64, resp: &BulkResponse) -> Self {
        Self {
            submitted,
            acknowledged: submitted.saturating_sub(resp.failures.len() as u64),
        }
    }

    /// Operations that were rejected or never reached the engine.
    pub fn failed(&self) -> u64 {
        self.submitted.saturating_sub(self.acknowledged)
    }

    /// Returns `true` if every submitted operation was applied.
    pub fn is_complete(&self) -> bool {
        self.acknowledged == self.submitted
    }
}

/// Executes index mutations and queries for tenants.
#[derive(Clone)]
pub struct SearchExecutor {
    config: Arc<SearchConfig>,
    mapper: TenantResourceMapper,
    client: Arc<dyn IndexClient>,
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("backend", &self.client.backend_name())
            .field("async_indexing", &self.config.async_indexing)
            .finish_non_exhaustive()
    }
}

impl SearchExecutor {
    /// Creates an executor over an index client.
    pub fn new(config: Arc<SearchConfig>, client: Arc<dyn IndexClient>) -> Self {
        Self {
            mapper: TenantResourceMapper::from_config(&config),
            config,
            client,
        }
    }

    /// Returns the tenant mapper.
    pub fn mapper(&self) -> &TenantResourceMapper {
        &self.mapper
    }

    /// Returns the index client.
    pub fn client(&self) -> &Arc<dyn IndexClient> {
        &self.client
    }

    /// Indexes an object; a positive `ttl_seconds` makes the document expire.
    ///
    /// No-op for a blank tenant id or an object with a blank id.
    pub async fn index<T: Indexable + ?Sized>(&self, tenant_id: &str, object: &T, ttl_seconds: u64) {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return;
        };
        if is_blank(object.id()) {
            return;
        }
        let doc = IndexDocument {
            index: ctx.resource_name().to_string(),
            id: ctx.storage_key(object.id()),
            source: object.to_document(ttl_seconds),
        };
        let client = Arc::clone(&self.client);
        debug!(tenant = %tenant_id, id = %object.id(), "Search.index()");
        self.dispatch("index", tenant_id, async move { client.index(doc).await })
            .await;
    }

    /// Removes an object's document.
    ///
    /// No-op for a blank tenant id or an object with a blank id.
    pub async fn unindex<T: Indexable + ?Sized>(&self, tenant_id: &str, object: &T) {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return;
        };
        if is_blank(object.id()) {
            return;
        }
        let index = ctx.resource_name().to_string();
        let id = ctx.storage_key(object.id());
        let client = Arc::clone(&self.client);
        debug!(tenant = %tenant_id, id = %object.id(), "Search.unindex()");
        self.dispatch("unindex", tenant_id, async move {
            client.delete(&index, &id).await
        })
        .await;
    }

    /// Indexes many objects with one bulk request.
    pub async fn index_all<T: Indexable>(&self, tenant_id: &str, objects: &[T]) -> BulkOutcome {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return BulkOutcome::default();
        };
        let operations: Vec<BulkOperation> = objects
            .iter()
            .filter(|o| !is_blank(o.id()))
            .map(|o| {
                BulkOperation::Index(IndexDocument {
                    index: ctx.resource_name().to_string(),
                    id: ctx.storage_key(o.id()),
                    source: o.to_document(0),
                })
            })
            .collect();
        self.submit_bulk("indexAll", tenant_id, operations).await
    }

    /// Removes many objects' documents with one bulk request.
    pub async fn unindex_all<T: Indexable>(&self, tenant_id: &str, objects: &[T]) -> BulkOutcome {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return BulkOutcome::default();
        };
        let operations: Vec<BulkOperation> = objects
            .iter()
            .filter(|o| !is_blank(o.id()))
            .map(|o| BulkOperation::Delete {
                index: ctx.resource_name().to_string(),
                id: ctx.storage_key(o.id()),
            })
            .collect();
        self.submit_bulk("unindexAll", tenant_id, operations).await
    }

    /// Deletes every document of the tenant matching the filters, or every
    /// document when `filters` is empty.
    ///
    /// Scrolls through the matches and issues a single bulk delete once the
    /// scroll is exhausted. Blocks for the whole run regardless of the write
    /// mode. Returns the number of documents deleted.
    pub async fn unindex_matching(
        &self,
        tenant_id: &str,
        filters: &[TermFilter],
        must_match_all: bool,
    ) -> u64 {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return 0;
        };
        let query = if filters.is_empty() {
            NativeQuery::match_all()
        } else {
            match QueryTranslator::terms(filters, must_match_all) {
                Some(q) => q,
                None => {
                    debug!(tenant = %tenant_id, "No usable terms, nothing to unindex");
                    return 0;
                }
            }
        };
        let query = self.scope(&ctx, None, query, false);
        let index = ctx.resource_name();

        let operations = match self.scroll_ids(index, &query).await {
            Ok(ids) => ids
                .into_iter()
                .map(|id| BulkOperation::Delete {
                    index: index.to_string(),
                    id,
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(tenant = %tenant_id, index = %index, error = %e, "Scroll failed, nothing unindexed");
                return 0;
            }
        };
        if operations.is_empty() {
            return 0;
        }

        let count = operations.len() as u64;
        match self.client.bulk(operations).await {
            Ok(resp) if resp.has_failures() => {
                warn!(
                    tenant = %tenant_id,
                    count,
                    took_ms = resp.took_ms,
                    "Unindexed {} documents with failures ({})",
                    count,
                    resp.failure_message()
                );
                count.saturating_sub(resp.failures.len() as u64)
            }
            Ok(resp) => {
                info!(
                    tenant = %tenant_id,
                    count,
                    took_ms = resp.took_ms,
                    "Unindexed {} documents without failures",
                    count
                );
                count
            }
            Err(e) => {
                warn!(tenant = %tenant_id, count, error = %e, "Bulk unindex failed");
                0
            }
        }
    }

    /// Runs a query in the tenant's index.
    ///
    /// Returns `None` for a blank tenant id. A missing query matches every
    /// document. Hits are restricted to the tenant (on the shared index), to
    /// `object_type` when given, and to documents that have not expired. The
    /// total hit count is written back into the cursor. Backend failures
    /// yield an empty page.
    pub async fn raw_query(
        &self,
        tenant_id: &str,
        object_type: Option<&str>,
        query: Option<NativeQuery>,
        cursor: Option<&mut PageCursor>,
    ) -> Option<SearchHits> {
        let ctx = self.mapper.context(tenant_id)?;
        let mut fallback = PageCursor::default();
        let cursor = cursor.unwrap_or(&mut fallback);

        let size = cursor.size(self.config.default_page_size, self.config.max_limit());
        let from = cursor.offset_for(size, self.config.max_pages);
        let sort = match cursor.sort_by.as_deref() {
            Some(field) if !cursor.sorts_by_score() => SortOrder::Field {
                field: field.trim().to_string(),
                descending: cursor.descending,
            },
            _ => SortOrder::Score,
        };
        let query = self.scope(&ctx, object_type, query.unwrap_or_else(NativeQuery::match_all), true);
        debug!(tenant = %tenant_id, query = %query.as_json(), from, size, "Search query");

        let request = SearchRequest {
            index: ctx.resource_name().to_string(),
            query,
            sort,
            from,
            size,
        };
        match self.client.search(request).await {
            Ok(hits) => {
                cursor.count = hits.total;
                Some(hits)
            }
            Err(e) => {
                warn!(
                    tenant = %tenant_id,
                    object_type = object_type.unwrap_or_default(),
                    error = %e,
                    "No search results"
                );
                Some(SearchHits::default())
            }
        }
    }

    /// Counts the tenant's live documents of a type.
    pub async fn count(&self, tenant_id: &str, object_type: Option<&str>) -> u64 {
        self.count_query(tenant_id, object_type, NativeQuery::match_all())
            .await
    }

    /// Counts documents matching all filters; 0 when no filter is usable.
    pub async fn count_terms(
        &self,
        tenant_id: &str,
        object_type: Option<&str>,
        filters: &[TermFilter],
    ) -> u64 {
        match QueryTranslator::terms(filters, true) {
            Some(query) => self.count_query(tenant_id, object_type, query).await,
            None => 0,
        }
    }

    /// Reads a document source from the index by object id.
    pub async fn get_source(&self, tenant_id: &str, object_id: &str) -> Option<Value> {
        let ctx = self.mapper.context(tenant_id)?;
        if is_blank(object_id) {
            return None;
        }
        match self
            .client
            .get(ctx.resource_name(), &ctx.storage_key(object_id))
            .await
        {
            Ok(source) => source.filter(|s| owned_by(&ctx, s)),
            Err(e) => {
                warn!(tenant = %tenant_id, id = %object_id, error = %e, "Index read failed");
                None
            }
        }
    }

    /// Reads the document sources that exist, in request order.
    pub async fn get_sources(&self, tenant_id: &str, object_ids: &[String]) -> Vec<Value> {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return Vec::new();
        };
        let keys: Vec<String> = object_ids
            .iter()
            .filter(|id| !is_blank(id))
            .map(|id| ctx.storage_key(id))
            .collect();
        if keys.is_empty() {
            return Vec::new();
        }
        match self.client.multi_get(ctx.resource_name(), &keys).await {
            Ok(sources) => sources.into_iter().filter(|s| owned_by(&ctx, s)).collect(),
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "Index multi-read failed");
                Vec::new()
            }
        }
    }

    async fn count_query(&self, tenant_id: &str, object_type: Option<&str>, query: NativeQuery) -> u64 {
        let Some(ctx) = self.mapper.context(tenant_id) else {
            return 0;
        };
        let request = SearchRequest {
            index: ctx.resource_name().to_string(),
            query: self.scope(&ctx, object_type, query, true),
            sort: SortOrder::Score,
            from: 0,
            size: 0,
        };
        match self.client.search(request).await {
            Ok(hits) => hits.total,
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "Count failed");
                0
            }
        }
    }

    /// Restricts a query to the tenant, a type, and optionally live documents.
    fn scope(
        &self,
        ctx: &TenantContext,
        object_type: Option<&str>,
        query: NativeQuery,
        live_only: bool,
    ) -> NativeQuery {
        let mut filter = Vec::new();
        if let Some(object_type) = object_type.filter(|t| !is_blank(t)) {
            filter.push(json!({ "term": { (fields::TYPE): object_type } }));
        }
        if ctx.is_shared() {
            filter.push(json!({ "term": { (fields::APPID): ctx.tenant_id() } }));
        }
        let must_not = if live_only {
            vec![json!({
                "range": { (fields::EXPIRES): { "lte": Utc::now().timestamp_millis() } }
            })]
        } else {
            Vec::new()
        };
        if filter.is_empty() && must_not.is_empty() {
            return query;
        }
        NativeQuery::new(json!({
            "bool": {
                "must": [query.into_json()],
                "filter": filter,
                "must_not": must_not,
            }
        }))
    }

    /// Collects the ids of every document matching a query via scrolling.
    async fn scroll_ids(&self, index: &str, query: &NativeQuery) -> StorageResult<Vec<String>> {
        let started = Instant::now();
        let keep_alive = self.config.scroll_keep_alive();
        let mut ids = Vec::new();

        let mut page = self
            .client
            .scroll_start(index, query, self.config.scroll_page_size, keep_alive)
            .await?;
        let mut scroll_id = page.scroll_id.clone();
        while !page.hits.is_empty() {
            ids.extend(page.hits.drain(..).map(|hit| hit.id));
            let Some(current) = scroll_id.as_deref() else {
                break;
            };
            page = match self.client.scroll_next(current, keep_alive).await {
                Ok(next) => next,
                Err(e) => {
                    self.release_scroll(current).await;
                    return Err(e);
                }
            };
            if page.scroll_id.is_some() {
                scroll_id = page.scroll_id.clone();
            }
        }
        if let Some(current) = scroll_id.as_deref() {
            self.release_scroll(current).await;
        }

        debug!(
            index = %index,
            count = ids.len(),
            took_ms = started.elapsed().as_millis() as u64,
            "Scrolled matching documents"
        );
        Ok(ids)
    }

    async fn release_scroll(&self, scroll_id: &str) {
        if let Err(e) = self.client.clear_scroll(scroll_id).await {
            debug!(error = %e, "Failed to clear scroll");
        }
    }

    async fn submit_bulk(
        &self,
        op: &'static str,
        tenant_id: &str,
        operations: Vec<BulkOperation>,
    ) -> BulkOutcome {
        if operations.is_empty() {
            return BulkOutcome::default();
        }
        let count = operations.len() as u64;
        let client = Arc::clone(&self.client);
        let tenant = tenant_id.to_string();
        debug!(tenant = %tenant_id, count, "Search.{}()", op);
        let write = async move {
            let resp = client.bulk(operations).await?;
            if resp.has_failures() {
                warn!(tenant = %tenant, count, "Bulk {} had failures: {}", op, resp.failure_message());
            }
            Ok::<_, StorageError>(resp)
        };

        if self.config.async_indexing {
            self.dispatch(op, tenant_id, async move { write.await.map(|_| ()) })
                .await;
            return BulkOutcome {
                submitted: count,
                acknowledged: count,
            };
        }
        match write.await {
            Ok(resp) => BulkOutcome::from_response(count, &resp),
            Err(e) => {
                warn!(tenant = %tenant_id, op, error = %e, "Index write failed");
                BulkOutcome {
                    submitted: count,
                    acknowledged: 0,
                }
            }
        }
    }

    /// Runs a write either inline or detached, per the configured mode.
    async fn dispatch<F>(&self, op: &'static str, tenant_id: &str, write: F)
    where
        F: Future<Output = StorageResult<()>> + Send + 'static,
    {
        if self.config.async_indexing {
            let tenant = tenant_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = write.await {
                    warn!(tenant = %tenant, op, error = %e, "Async index write failed");
                }
            });
        } else if let Err(e) = write.await {
            warn!(tenant = %tenant_id, op, error = %e, "Index write failed");
        }
    }
}

/// On the shared index, documents must carry the tenant's id.
fn owned_by(ctx: &TenantContext, source: &Value) -> bool {
    !ctx.is_shared()
        || source.get(fields::APPID).and_then(Value::as_str) == Some(ctx.tenant_id())
}
