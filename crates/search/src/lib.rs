//! Kestrel Search Layer
//!
//! This crate provides the multi-tenant object search layer of the Kestrel
//! platform. Tenants store domain objects in a primary key-value store and
//! mirror them into a secondary search index; this crate maps tenants onto
//! physical resources, translates a backend-agnostic query vocabulary into the
//! index engine's native query language, executes index mutations and queries,
//! and reconciles index hits against the primary store.
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! kestrel-search = { version = "0.1", features = ["elasticsearch", "dynamodb"] }
//! ```
//!
//! Available backend features:
//! - in-memory backends (always built) for tests and embedded use
//! - `elasticsearch` - Elasticsearch as the search index
//! - `dynamodb` - AWS DynamoDB as the primary store and table admin
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant to resource-name and storage-key mapping
//! - [`types`] - Searchable objects, page cursors and resource descriptors
//! - [`query`] - Query descriptors, free-text sanitation and translation
//! - [`core`] - Backend traits for the index, primary store and table admin
//! - [`executor`] - Index mutations and raw queries
//! - [`reconcile`] - Materialization of index hits with drift detection
//! - [`lifecycle`] - Table and index lifecycle management
//! - [`service`] - The public query, mutation and admin API
//! - [`backends`] - Backend implementations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use kestrel_search::backends::memory::{MemoryIndex, MemoryStore};
//! use kestrel_search::{SearchConfig, SearchService};
//!
//! # tokio_test_block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let service = SearchService::new(
//!     SearchConfig::default(),
//!     Arc::new(MemoryIndex::new()),
//!     store.clone(),
//!     store,
//! );
//!
//! assert!(service.create_resource("acct-42", 1, 1).await);
//! assert!(service.exists_resource("acct-42").await);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod query;
pub mod reconcile;
pub mod reindex;
pub mod service;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use config::SearchConfig;
pub use error::{StorageError, StorageResult};
pub use tenant::{TenantContext, TenantResourceMapper};
pub use types::{Indexable, PageCursor, PhysicalResourceDescriptor, SearchableObject};

// Re-export core traits
pub use core::{IndexClient, PrimaryStore, TableAdmin};

// Re-export components
pub use executor::{BulkOutcome, SearchExecutor};
pub use lifecycle::IndexLifecycleManager;
pub use query::{QueryDescriptor, QueryTranslator, TermFilter};
pub use reconcile::{ConsistencyReconciler, Reconciled};
pub use reindex::{ReindexOptions, ReindexSummary, Reindexer};
pub use service::{SearchService, TenantScope};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
