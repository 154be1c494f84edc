//! Physical table administration trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::types::PhysicalResourceDescriptor;

/// Hash key attribute of every table.
pub const KEY_ATTRIBUTE: &str = "key";

/// Provisioned throughput of a table or secondary index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    /// Read capacity units.
    pub read: i64,
    /// Write capacity units.
    pub write: i64,
}

impl Throughput {
    /// Creates a throughput setting.
    pub fn new(read: i64, write: i64) -> Self {
        Self { read, write }
    }
}

/// A global secondary index of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexSpec {
    /// Index name.
    pub name: String,
    /// Partition key attribute.
    pub hash_key: String,
    /// Sort key attribute.
    pub range_key: String,
    /// Provisioned throughput.
    pub throughput: Throughput,
}

/// Definition of a table to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Physical table name.
    pub name: String,
    /// String hash key attribute.
    pub key_attribute: String,
    /// Provisioned throughput.
    pub throughput: Throughput,
    /// Optional secondary index, projecting all attributes.
    pub secondary_index: Option<SecondaryIndexSpec>,
}

/// A page of table names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableListPage {
    /// Table names in this page.
    pub names: Vec<String>,
    /// Last name evaluated; `None` when the listing is complete.
    pub last_evaluated: Option<String>,
}

/// Administration of the primary store's physical tables.
#[async_trait]
pub trait TableAdmin: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Describes a table, or returns `None` if it doesn't exist.
    async fn describe_table(&self, name: &str) -> StorageResult<Option<PhysicalResourceDescriptor>>;

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation(ResourceAlreadyExists)` - If the table exists
    async fn create_table(&self, spec: &TableSpec) -> StorageResult<()>;

    /// Changes a table's provisioned throughput.
    ///
    /// Backends reject updates of tables that are not active.
    async fn update_throughput(&self, name: &str, throughput: Throughput) -> StorageResult<()>;

    /// Deletes a table.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation(ResourceNotFound)` - If the table doesn't exist
    async fn delete_table(&self, name: &str) -> StorageResult<()>;

    /// Lists table names in order, starting after `start_after`.
    async fn list_tables(&self, start_after: Option<&str>, limit: u32)
    -> StorageResult<TableListPage>;
}
