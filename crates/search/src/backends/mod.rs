//! Backend implementations.
//!
//! This module contains implementations of the [`IndexClient`](crate::core::IndexClient),
//! [`PrimaryStore`](crate::core::PrimaryStore) and [`TableAdmin`](crate::core::TableAdmin)
//! traits. Remote backends are gated behind feature flags.
//!
//! # Available Backends
//!
//! | Backend | Feature | Implements |
//! |---------|---------|------------|
//! | Memory | (always) | `IndexClient`, `PrimaryStore`, `TableAdmin` |
//! | Elasticsearch | `elasticsearch` | `IndexClient` |
//! | DynamoDB | `dynamodb` | `PrimaryStore`, `TableAdmin` |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "elasticsearch")]
//! use kestrel_search::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchIndex};
//!
//! # #[cfg(feature = "elasticsearch")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = ElasticsearchIndex::new(ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
