//! Elasticsearch index backend.
//!
//! [`ElasticsearchIndex`] implements [`IndexClient`](crate::core::IndexClient)
//! over the official client. One physical index exists per dedicated tenant
//! plus one shared by all shared tenants; documents of shared tenants are
//! told apart by their `appid` field.
//!
//! # Document Mapping
//!
//! - metadata fields (`id`, `type`, `appid`, `parentid`, `tags`, `tag`) are keywords
//! - `latlng` is a `geo_point` for distance queries
//! - `nstd` is a `nested` object for nested free-text queries
//! - other strings are analyzed text with a `keyword` subfield
//!
//! # Example
//!
//! ```ignore
//! use kestrel_search::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchIndex};
//!
//! let index = ElasticsearchIndex::new(ElasticsearchConfig {
//!     url: "http://localhost:9200".to_string(),
//!     ..Default::default()
//! })?;
//! index.health_check().await?;
//! ```

mod backend;
mod client;
mod schema;

pub use backend::{
    ClusterStatus, ElasticsearchAuth, ElasticsearchConfig, ElasticsearchIndex, IndexSettings,
};
