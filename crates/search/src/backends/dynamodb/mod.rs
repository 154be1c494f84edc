//! DynamoDB primary store backend.
//!
//! [`DynamoDbBackend`] implements [`PrimaryStore`](crate::core::PrimaryStore)
//! and [`TableAdmin`](crate::core::TableAdmin). Each dedicated tenant owns a
//! table; shared tenants share one table and their items are told apart by
//! the key prefix.
//!
//! ## Item Layout
//!
//! ```text
//! Table: <resource prefix>-<tenant> (or the shared table)
//!
//! Primary Key:
//!   - key (String, Partition Key): storage key, "<tenant>_<id>" on the shared table
//!
//! Attributes:
//!   - id, type, appid: String
//!   - stored: Boolean
//!   - every domain field, converted to the closest attribute type
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use kestrel_search::backends::dynamodb::{DynamoDbBackend, DynamoDbConfig};
//!
//! let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//! let store = DynamoDbBackend::new(&sdk_config, DynamoDbConfig {
//!     endpoint: Some("http://localhost:4566".to_string()),
//!     ..Default::default()
//! });
//! ```

mod backend;
mod codec;

pub use backend::{DynamoDbBackend, DynamoDbConfig};
