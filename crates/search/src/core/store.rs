//! Primary store trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::tenant::TenantContext;
use crate::types::SearchableObject;

/// A page of a primary store scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Objects of this page.
    pub objects: Vec<SearchableObject>,
    /// Cursor for the next page; `None` when the scan is complete.
    pub next_cursor: Option<String>,
}

/// The primary key-value store, source of truth for objects.
///
/// Implementations look objects up under
/// [`TenantContext::storage_key`] in the tenant's physical table, so shared
/// tenants never see each other's records.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Reads many objects at once.
    ///
    /// # Returns
    ///
    /// The objects found, keyed by object id. Missing ids are simply absent.
    async fn batch_get(
        &self,
        tenant: &TenantContext,
        ids: &[String],
        consistent_read: bool,
    ) -> StorageResult<HashMap<String, SearchableObject>>;

    /// Reads one page of the tenant's objects.
    ///
    /// Pass the previous page's `next_cursor` to continue.
    async fn scan(
        &self,
        tenant: &TenantContext,
        cursor: Option<&str>,
        limit: u32,
    ) -> StorageResult<ScanPage>;
}
