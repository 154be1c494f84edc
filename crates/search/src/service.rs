//! The public query, mutation and admin API.
//!
//! [`SearchService`] wires the components together:
//!
//! ```text
//! caller ──► TenantResourceMapper ──► QueryTranslator ──► SearchExecutor ──► IndexClient
//!                                                               │
//!                                   ConsistencyReconciler ◄─────┘ hits
//!                                             │
//!                                             ▼
//!                                       PrimaryStore
//! ```
//!
//! Every operation takes the tenant id first; [`SearchService::root`] and
//! [`SearchService::tenant`] return a [`TenantScope`] that fixes it. Nothing
//! here returns an error: invalid input and backend failures look exactly
//! like an empty result, zero or `false`, and are reported through logs.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::SearchConfig;
use crate::core::{IndexClient, PrimaryStore, TableAdmin};
use crate::executor::SearchExecutor;
use crate::lifecycle::IndexLifecycleManager;
use crate::query::{MATCH_ALL_QUERY, NativeQuery, QueryDescriptor, QueryTranslator, TermFilter};
use crate::reconcile::{ConsistencyReconciler, Reconciled};
use crate::reindex::{ReindexOptions, ReindexSummary, Reindexer};
use crate::tenant::{TenantResourceMapper, is_blank};
use crate::types::{Indexable, PageCursor, PhysicalResourceDescriptor, SearchableObject, fields};

/// Object type of addresses, the targets of geo queries.
pub const ADDRESS_TYPE: &str = "address";

/// Object type of tags.
pub const TAG_TYPE: &str = "tag";

/// Most addresses considered by a geo query.
const MAX_NEARBY_ADDRESSES: u32 = 10_000;

/// Multi-tenant search over an index engine and a primary store.
#[derive(Debug, Clone)]
pub struct SearchService {
    config: Arc<SearchConfig>,
    translator: QueryTranslator,
    executor: SearchExecutor,
    reconciler: ConsistencyReconciler,
    lifecycle: IndexLifecycleManager,
    reindexer: Reindexer,
}

impl SearchService {
    /// Creates a service over explicitly owned backend handles.
    pub fn new(
        config: SearchConfig,
        index: Arc<dyn IndexClient>,
        store: Arc<dyn PrimaryStore>,
        admin: Arc<dyn TableAdmin>,
    ) -> Self {
        let config = Arc::new(config);
        let executor = SearchExecutor::new(Arc::clone(&config), Arc::clone(&index));
        Self {
            translator: QueryTranslator::new(config.strict_query_syntax),
            reconciler: ConsistencyReconciler::new(
                Arc::clone(&store),
                config.read_from_index,
                config.consistent_reads,
            ),
            lifecycle: IndexLifecycleManager::new(&config, admin, index),
            reindexer: Reindexer::new(store, executor.clone()),
            executor,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Returns the tenant mapper.
    pub fn mapper(&self) -> &TenantResourceMapper {
        self.executor.mapper()
    }

    /// Returns the executor.
    pub fn executor(&self) -> &SearchExecutor {
        &self.executor
    }

    /// Returns the lifecycle manager.
    pub fn lifecycle(&self) -> &IndexLifecycleManager {
        &self.lifecycle
    }

    /// Operations on the root tenant.
    pub fn root(&self) -> TenantScope<'_> {
        self.tenant(self.mapper().root_tenant().to_string())
    }

    /// Operations on one tenant.
    pub fn tenant(&self, tenant_id: impl Into<String>) -> TenantScope<'_> {
        TenantScope {
            service: self,
            tenant_id: tenant_id.into(),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Indexes an object.
    pub async fn index<T: Indexable + ?Sized>(&self, tenant_id: &str, object: &T) {
        self.executor.index(tenant_id, object, 0).await;
    }

    /// Indexes an object that expires after `ttl_seconds`.
    pub async fn index_with_ttl<T: Indexable + ?Sized>(&self, tenant_id: &str, object: &T, ttl_seconds: u64) {
        self.executor.index(tenant_id, object, ttl_seconds).await;
    }

    /// Removes an object from the index.
    pub async fn unindex<T: Indexable + ?Sized>(&self, tenant_id: &str, object: &T) {
        self.executor.unindex(tenant_id, object).await;
    }

    /// Indexes many objects in one bulk request.
    pub async fn index_all<T: Indexable>(&self, tenant_id: &str, objects: &[T]) {
        self.executor.index_all(tenant_id, objects).await;
    }

    /// Removes many objects in one bulk request.
    pub async fn unindex_all<T: Indexable>(&self, tenant_id: &str, objects: &[T]) {
        self.executor.unindex_all(tenant_id, objects).await;
    }

    /// Removes every document matching the filters, or all documents when
    /// `filters` is empty. Returns the number removed.
    pub async fn unindex_matching(&self, tenant_id: &str, filters: &[TermFilter], must_match_all: bool) -> u64 {
        self.executor
            .unindex_matching(tenant_id, filters, must_match_all)
            .await
    }

    /// Rebuilds the tenant's index from the primary store.
    pub async fn reindex(&self, tenant_id: &str, options: ReindexOptions) -> ReindexSummary {
        self.reindexer.rebuild(tenant_id, options).await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Reads one object straight from the index.
    pub async fn find_by_id(&self, tenant_id: &str, id: &str) -> Option<SearchableObject> {
        let source = self.executor.get_source(tenant_id, id).await?;
        SearchableObject::from_source(&source).ok()
    }

    /// Reads the objects that exist straight from the index, in request order.
    pub async fn find_by_ids(&self, tenant_id: &str, ids: &[String]) -> Vec<SearchableObject> {
        self.executor
            .get_sources(tenant_id, ids)
            .await
            .iter()
            .filter_map(|source| SearchableObject::from_source(source).ok())
            .collect()
    }

    /// Objects whose `field` equals any of `terms`.
    pub async fn find_term_in_list(
        &self,
        tenant_id: &str,
        object_type: &str,
        field: &str,
        terms: Vec<Value>,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::TermsInList {
            field: field.to_string(),
            terms,
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects whose `field` starts with `prefix`.
    pub async fn find_prefix(
        &self,
        tenant_id: &str,
        object_type: &str,
        field: &str,
        prefix: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::Prefix {
            field: field.to_string(),
            prefix: prefix.to_string(),
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects matching a free-text query.
    pub async fn find_query(
        &self,
        tenant_id: &str,
        object_type: &str,
        query: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::FreeText {
            query: query.to_string(),
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects whose nested field matches a free-text query.
    pub async fn find_nested_query(
        &self,
        tenant_id: &str,
        object_type: &str,
        field: &str,
        query: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::NestedFreeText {
            field: field.to_string(),
            query: query.to_string(),
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects whose `field` matches a `*`/`?` pattern.
    pub async fn find_wildcard(
        &self,
        tenant_id: &str,
        object_type: &str,
        field: &str,
        wildcard: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::Wildcard {
            field: field.to_string(),
            pattern: wildcard.to_string(),
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects carrying every one of `tags`.
    pub async fn find_tagged(
        &self,
        tenant_id: &str,
        object_type: &str,
        tags: &[String],
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::TagsAll {
            tags: tags.to_vec(),
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects matching all (or any) of the filters.
    pub async fn find_terms(
        &self,
        tenant_id: &str,
        object_type: &str,
        filters: &[TermFilter],
        must_match_all: bool,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::Terms {
            filters: filters.to_vec(),
            must_match_all,
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Objects similar to `like_text` in `compare_fields` (all fields when
    /// empty), excluding the object `filter_key`.
    pub async fn find_similar(
        &self,
        tenant_id: &str,
        object_type: &str,
        filter_key: Option<&str>,
        compare_fields: &[String],
        like_text: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        let descriptor = QueryDescriptor::SimilarTo {
            fields: compare_fields.to_vec(),
            like_text: like_text.to_string(),
            exclude_id: filter_key.map(str::to_string),
        };
        self.search(tenant_id, object_type, &descriptor, cursor).await
    }

    /// Tags whose name starts with `keyword`.
    pub async fn find_tags(
        &self,
        tenant_id: &str,
        keyword: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        if is_blank(keyword) {
            return Vec::new();
        }
        let descriptor = QueryDescriptor::Wildcard {
            field: fields::TAG.to_string(),
            pattern: format!("{}*", keyword),
        };
        self.search(tenant_id, TAG_TYPE, &descriptor, cursor).await
    }

    /// Objects located within `radius_km` of a point.
    ///
    /// Addresses are found by distance first. Unless addresses were asked
    /// for, the objects returned are the addresses' parents of
    /// `object_type` that also match the free-text `query`.
    pub async fn find_nearby(
        &self,
        tenant_id: &str,
        object_type: &str,
        query: &str,
        radius_km: f64,
        lat: f64,
        lng: f64,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        if is_blank(object_type) {
            return Vec::new();
        }
        let Some(ctx) = self.mapper().context(tenant_id) else {
            return Vec::new();
        };
        let near = QueryDescriptor::GeoNearby {
            lat,
            lng,
            radius_km,
        };
        let Some(geo) = self.translator.translate(&near) else {
            return Vec::new();
        };
        if object_type == ADDRESS_TYPE {
            return self
                .search_native(tenant_id, ADDRESS_TYPE, geo, cursor)
                .await
                .objects;
        }

        let mut all = PageCursor::first(self.config.max_limit().min(MAX_NEARBY_ADDRESSES));
        let Some(addresses) = self
            .executor
            .raw_query(tenant_id, Some(ADDRESS_TYPE), Some(geo), Some(&mut all))
            .await
        else {
            return Vec::new();
        };
        let parent_keys: Vec<String> = addresses
            .hits
            .iter()
            .filter_map(|hit| hit.field(fields::PARENT_ID))
            .filter_map(|pid| match pid {
                Value::String(s) if !is_blank(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .map(|pid| ctx.storage_key(&pid))
            .collect();
        if parent_keys.is_empty() {
            return Vec::new();
        }

        let query = if is_blank(query) { MATCH_ALL_QUERY } else { query };
        let Some(text) = self.translator.free_text(query) else {
            return Vec::new();
        };
        let parents = NativeQuery::new(json!({
            "bool": {
                "must": [text.into_json()],
                "filter": [{ "ids": { "values": parent_keys } }],
            }
        }));
        self.search_native(tenant_id, object_type, parents, cursor)
            .await
            .objects
    }

    /// Runs any query descriptor.
    pub async fn search(
        &self,
        tenant_id: &str,
        object_type: &str,
        descriptor: &QueryDescriptor,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.search_reconciled(tenant_id, object_type, descriptor, cursor)
            .await
            .objects
    }

    /// Runs any query descriptor and also reports drift.
    pub async fn search_reconciled(
        &self,
        tenant_id: &str,
        object_type: &str,
        descriptor: &QueryDescriptor,
        cursor: Option<&mut PageCursor>,
    ) -> Reconciled {
        match self.translator.translate(descriptor) {
            Some(query) => self.search_native(tenant_id, object_type, query, cursor).await,
            None => Reconciled::default(),
        }
    }

    /// Counts the tenant's objects of a type.
    pub async fn count(&self, tenant_id: &str, object_type: &str) -> u64 {
        self.executor.count(tenant_id, Some(object_type)).await
    }

    /// Counts the tenant's objects of a type matching all filters.
    pub async fn count_terms(&self, tenant_id: &str, object_type: &str, filters: &[TermFilter]) -> u64 {
        self.executor
            .count_terms(tenant_id, Some(object_type), filters)
            .await
    }

    async fn search_native(
        &self,
        tenant_id: &str,
        object_type: &str,
        query: NativeQuery,
        cursor: Option<&mut PageCursor>,
    ) -> Reconciled {
        let Some(ctx) = self.mapper().context(tenant_id) else {
            return Reconciled::default();
        };
        match self
            .executor
            .raw_query(tenant_id, Some(object_type), Some(query), cursor)
            .await
        {
            Some(hits) => self.reconciler.materialize(&ctx, &hits.hits).await,
            None => Reconciled::default(),
        }
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    /// Returns `true` if the tenant's resources exist.
    pub async fn exists_resource(&self, tenant_id: &str) -> bool {
        self.lifecycle.exists(tenant_id).await
    }

    /// Creates a dedicated tenant's resources.
    pub async fn create_resource(&self, tenant_id: &str, read_capacity: i64, write_capacity: i64) -> bool {
        self.lifecycle
            .create(tenant_id, read_capacity, write_capacity)
            .await
    }

    /// Creates the resources shared by all shared tenants.
    pub async fn create_shared_resource(&self, read_capacity: i64, write_capacity: i64) -> bool {
        self.lifecycle
            .create_shared(read_capacity, write_capacity)
            .await
    }

    /// Changes the provisioned throughput of a tenant's table.
    pub async fn update_resource(&self, tenant_id: &str, read_capacity: i64, write_capacity: i64) -> bool {
        self.lifecycle
            .update(tenant_id, read_capacity, write_capacity)
            .await
    }

    /// Deletes a tenant's resources.
    pub async fn delete_resource(&self, tenant_id: &str) -> bool {
        self.lifecycle.delete(tenant_id).await
    }

    /// Describes a tenant's table.
    pub async fn describe_resource(&self, tenant_id: &str) -> PhysicalResourceDescriptor {
        self.lifecycle.describe(tenant_id).await
    }

    /// Lists every physical table.
    pub async fn list_all_resources(&self) -> Vec<String> {
        self.lifecycle.list_all().await
    }
}

/// The operations of a [`SearchService`] bound to one tenant.
#[derive(Debug, Clone)]
pub struct TenantScope<'a> {
    service: &'a SearchService,
    tenant_id: String,
}

impl TenantScope<'_> {
    /// Returns the bound tenant id.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// See [`SearchService::index`].
    pub async fn index<T: Indexable + ?Sized>(&self, object: &T) {
        self.service.index(&self.tenant_id, object).await;
    }

    /// See [`SearchService::index_with_ttl`].
    pub async fn index_with_ttl<T: Indexable + ?Sized>(&self, object: &T, ttl_seconds: u64) {
        self.service
            .index_with_ttl(&self.tenant_id, object, ttl_seconds)
            .await;
    }

    /// See [`SearchService::unindex`].
    pub async fn unindex<T: Indexable + ?Sized>(&self, object: &T) {
        self.service.unindex(&self.tenant_id, object).await;
    }

    /// See [`SearchService::index_all`].
    pub async fn index_all<T: Indexable>(&self, objects: &[T]) {
        self.service.index_all(&self.tenant_id, objects).await;
    }

    /// See [`SearchService::unindex_all`].
    pub async fn unindex_all<T: Indexable>(&self, objects: &[T]) {
        self.service.unindex_all(&self.tenant_id, objects).await;
    }

    /// See [`SearchService::unindex_matching`].
    pub async fn unindex_matching(&self, filters: &[TermFilter], must_match_all: bool) -> u64 {
        self.service
            .unindex_matching(&self.tenant_id, filters, must_match_all)
            .await
    }

    /// See [`SearchService::find_by_id`].
    pub async fn find_by_id(&self, id: &str) -> Option<SearchableObject> {
        self.service.find_by_id(&self.tenant_id, id).await
    }

    /// See [`SearchService::find_by_ids`].
    pub async fn find_by_ids(&self, ids: &[String]) -> Vec<SearchableObject> {
        self.service.find_by_ids(&self.tenant_id, ids).await
    }

    /// See [`SearchService::find_term_in_list`].
    pub async fn find_term_in_list(
        &self,
        object_type: &str,
        field: &str,
        terms: Vec<Value>,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_term_in_list(&self.tenant_id, object_type, field, terms, cursor)
            .await
    }

    /// See [`SearchService::find_prefix`].
    pub async fn find_prefix(
        &self,
        object_type: &str,
        field: &str,
        prefix: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_prefix(&self.tenant_id, object_type, field, prefix, cursor)
            .await
    }

    /// See [`SearchService::find_query`].
    pub async fn find_query(
        &self,
        object_type: &str,
        query: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_query(&self.tenant_id, object_type, query, cursor)
            .await
    }

    /// See [`SearchService::find_nested_query`].
    pub async fn find_nested_query(
        &self,
        object_type: &str,
        field: &str,
        query: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_nested_query(&self.tenant_id, object_type, field, query, cursor)
            .await
    }

    /// See [`SearchService::find_wildcard`].
    pub async fn find_wildcard(
        &self,
        object_type: &str,
        field: &str,
        wildcard: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_wildcard(&self.tenant_id, object_type, field, wildcard, cursor)
            .await
    }

    /// See [`SearchService::find_tagged`].
    pub async fn find_tagged(
        &self,
        object_type: &str,
        tags: &[String],
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_tagged(&self.tenant_id, object_type, tags, cursor)
            .await
    }

    /// See [`SearchService::find_terms`].
    pub async fn find_terms(
        &self,
        object_type: &str,
        filters: &[TermFilter],
        must_match_all: bool,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_terms(&self.tenant_id, object_type, filters, must_match_all, cursor)
            .await
    }

    /// See [`SearchService::find_similar`].
    pub async fn find_similar(
        &self,
        object_type: &str,
        filter_key: Option<&str>,
        compare_fields: &[String],
        like_text: &str,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_similar(
                &self.tenant_id,
                object_type,
                filter_key,
                compare_fields,
                like_text,
                cursor,
            )
            .await
    }

    /// See [`SearchService::find_tags`].
    pub async fn find_tags(&self, keyword: &str, cursor: Option<&mut PageCursor>) -> Vec<SearchableObject> {
        self.service.find_tags(&self.tenant_id, keyword, cursor).await
    }

    /// See [`SearchService::find_nearby`].
    pub async fn find_nearby(
        &self,
        object_type: &str,
        query: &str,
        radius_km: f64,
        lat: f64,
        lng: f64,
        cursor: Option<&mut PageCursor>,
    ) -> Vec<SearchableObject> {
        self.service
            .find_nearby(&self.tenant_id, object_type, query, radius_km, lat, lng, cursor)
            .await
    }

    /// See [`SearchService::count`].
    pub async fn count(&self, object_type: &str) -> u64 {
        self.service.count(&self.tenant_id, object_type).await
    }

    /// See [`SearchService::count_terms`].
    pub async fn count_terms(&self, object_type: &str, filters: &[TermFilter]) -> u64 {
        self.service
            .count_terms(&self.tenant_id, object_type, filters)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryIndex, MemoryStore};

    fn service() -> SearchService {
        let store = Arc::new(MemoryStore::new());
        SearchService::new(
            SearchConfig::default(),
            Arc::new(MemoryIndex::new()),
            store.clone(),
            store,
        )
    }

    #[tokio::test]
    async fn test_blank_inputs_yield_empty_results() {
        let svc = service();
        assert!(svc.find_prefix("", "note", "title", "x", None).await.is_empty());
        assert!(svc.find_prefix("acme", "note", " ", "x", None).await.is_empty());
        assert!(svc.find_query("acme", "note", "  ", None).await.is_empty());
        assert!(svc.find_tags("acme", "", None).await.is_empty());
        assert!(svc.find_nearby("acme", "", "*", 1.0, 0.0, 0.0, None).await.is_empty());
        assert!(svc.find_by_id("acme", "").await.is_none());
        assert_eq!(svc.count("", "note").await, 0);
    }

    #[tokio::test]
    async fn test_root_scope_uses_root_tenant() {
        let svc = service();
        let root = svc.root();
        assert_eq!(root.tenant_id(), "platform");
        assert_eq!(svc.mapper().resource_name(root.tenant_id()).as_deref(), Some("platform"));
        assert_eq!(svc.tenant("acme").tenant_id(), "acme");
    }

    #[tokio::test]
    async fn test_find_by_ids_reads_index() {
        let svc = service();
        let objects: Vec<_> = ["a", "b"]
            .iter()
            .map(|id| SearchableObject::new(*id, "note", "acme"))
            .collect();
        svc.index_all("acme", &objects).await;

        let found = svc
            .find_by_ids("acme", &["b".into(), "zz".into(), "a".into()])
            .await;
        let ids: Vec<_> = found.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(svc.find_by_id("acme", "a").await, Some(objects[0].clone()));
    }
}
