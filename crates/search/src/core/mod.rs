//! Backend traits.
//!
//! The search layer talks to three collaborators:
//!
//! - [`IndexClient`] - the search index engine (index, get, bulk, search, scroll)
//! - [`PrimaryStore`] - the primary key-value store (batch reads, scans)
//! - [`TableAdmin`] - physical table administration of the primary store
//!
//! Components hold them as `Arc<dyn Trait>` handles passed in at construction
//! time. Dropping the last handle releases the underlying client.
//!
//! # Example: Implementing a Primary Store
//!
//! ```ignore
//! use std::collections::HashMap;
//! use async_trait::async_trait;
//! use kestrel_search::core::{PrimaryStore, ScanPage};
//! use kestrel_search::error::StorageResult;
//! use kestrel_search::{SearchableObject, TenantContext};
//!
//! struct MyStore;
//!
//! #[async_trait]
//! impl PrimaryStore for MyStore {
//!     fn backend_name(&self) -> &'static str {
//!         "my-store"
//!     }
//!
//!     async fn batch_get(
//!         &self,
//!         tenant: &TenantContext,
//!         ids: &[String],
//!         consistent_read: bool,
//!     ) -> StorageResult<HashMap<String, SearchableObject>> {
//!         // Look up tenant.storage_key(id) for every id...
//!         todo!()
//!     }
//!
//!     // ... implement scan
//! }
//! ```

pub mod admin;
pub mod index;
pub mod store;

pub use admin::{KEY_ATTRIBUTE, SecondaryIndexSpec, TableAdmin, TableListPage, TableSpec, Throughput};
pub use index::{
    BulkFailure, BulkOperation, BulkResponse, Hit, IndexClient, IndexDocument, ScrollPage,
    SearchHits, SearchRequest, SortOrder,
};
pub use store::{PrimaryStore, ScanPage};
