//! Shared test infrastructure for the search layer.
//!
//! Builds a [`SearchService`] over the in-memory backends and provides
//! object fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use kestrel_search::backends::memory::{MemoryIndex, MemoryStore};
use kestrel_search::{SearchConfig, SearchService, SearchableObject};

/// Routes log output to the test writer; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A service wired to in-memory backends that tests can inspect.
pub struct Harness {
    pub service: SearchService,
    pub index: Arc<MemoryIndex>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SearchConfig::default())
    }

    /// Creates a harness with a custom configuration.
    pub fn with_config(config: SearchConfig) -> Self {
        init_tracing();
        let index = Arc::new(MemoryIndex::new());
        let store = Arc::new(MemoryStore::new());
        let service = SearchService::new(config, index.clone(), store.clone(), store.clone());
        Self {
            service,
            index,
            store,
        }
    }

    /// Creates the tenant's resources (the shared ones for shared tenants).
    pub async fn provision(&self, tenant: &str) {
        let created = if self.service.mapper().is_shared(tenant) {
            self.service.exists_resource(tenant).await || self.service.create_shared_resource(1, 1).await
        } else {
            self.service.create_resource(tenant, 1, 1).await
        };
        assert!(created, "failed to provision tenant '{}'", tenant);
    }

    /// Writes objects to the primary store and indexes them.
    pub async fn save(&self, tenant: &str, objects: &[SearchableObject]) {
        let ctx = self
            .service
            .mapper()
            .context(tenant)
            .expect("tenant id must not be blank");
        for object in objects {
            self.store
                .put(&ctx, object.clone())
                .expect("failed to store object");
        }
        self.service.index_all(tenant, objects).await;
    }
}

/// A note with a title.
pub fn note(id: &str, tenant: &str, title: &str) -> SearchableObject {
    SearchableObject::new(id, "note", tenant).with_field("title", json!(title))
}

/// An address located at a point and owned by `parent`.
pub fn address(id: &str, tenant: &str, parent: &str, lat: f64, lng: f64) -> SearchableObject {
    SearchableObject::new(id, "address", tenant)
        .with_field("parentid", json!(parent))
        .with_field("latlng", json!(format!("{},{}", lat, lng)))
}

/// A tag object.
pub fn tag(name: &str, tenant: &str) -> SearchableObject {
    SearchableObject::new(format!("tag:{}", name), "tag", tenant).with_field("tag", json!(name))
}

/// Returns the ids of objects, in order.
pub fn ids(objects: &[SearchableObject]) -> Vec<&str> {
    objects.iter().map(|o| o.id.as_str()).collect()
}

/// Returns the ids of objects, sorted.
pub fn sorted_ids(objects: &[SearchableObject]) -> Vec<String> {
    let mut ids: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
    ids.sort();
    ids
}
