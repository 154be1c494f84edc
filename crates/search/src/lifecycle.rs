//! Physical table and index lifecycle.
//!
//! [`IndexLifecycleManager`] creates, resizes, describes and deletes the
//! physical table of a tenant in the primary store, together with the
//! matching search index. No operation returns an error: invalid tenant
//! ids and backend failures are logged and reported as `false` or as an
//! empty descriptor or list.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::SearchConfig;
use crate::core::{IndexClient, KEY_ATTRIBUTE, SecondaryIndexSpec, TableAdmin, TableSpec, Throughput};
use crate::error::{StorageError, TenantError, ValidationError};
use crate::tenant::{TenantResourceMapper, is_blank};
use crate::types::{PhysicalResourceDescriptor, ResourceStatus, fields};

/// Number of table names requested per listing page.
const LIST_PAGE_SIZE: u32 = 100;

/// Manages the physical resources of tenants.
#[derive(Clone)]
pub struct IndexLifecycleManager {
    mapper: TenantResourceMapper,
    admin: Arc<dyn TableAdmin>,
    index: Arc<dyn IndexClient>,
}

impl std::fmt::Debug for IndexLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLifecycleManager")
            .field("admin", &self.admin.backend_name())
            .field("index", &self.index.backend_name())
            .finish_non_exhaustive()
    }
}

impl IndexLifecycleManager {
    /// Creates a manager over the table admin and the index client.
    pub fn new(config: &SearchConfig, admin: Arc<dyn TableAdmin>, index: Arc<dyn IndexClient>) -> Self {
        Self {
            mapper: TenantResourceMapper::from_config(config),
            admin,
            index,
        }
    }

    /// Returns `true` if the tenant's table exists.
    pub async fn exists(&self, tenant_id: &str) -> bool {
        let Some(name) = self.mapper.resource_name(tenant_id) else {
            return false;
        };
        self.table_exists(&name).await
    }

    /// Creates a dedicated tenant's table and index.
    ///
    /// Rejects blank ids, ids containing whitespace (shared tenants included)
    /// and tenants whose table already exists.
    pub async fn create(&self, tenant_id: &str, read_capacity: i64, write_capacity: i64) -> bool {
        if let Err(e) = self.mapper.validate_dedicated(tenant_id) {
            if !matches!(e, TenantError::BlankTenant) {
                warn!(tenant = %tenant_id, error = %e, "Rejected table name");
            }
            return false;
        }
        let Some(name) = self.mapper.resource_name(tenant_id) else {
            return false;
        };
        if self.table_exists(&name).await {
            warn!(tenant = %tenant_id, "Table '{}' already exists.", name);
            return false;
        }

        let spec = TableSpec {
            name: name.clone(),
            key_attribute: KEY_ATTRIBUTE.to_string(),
            throughput: Throughput::new(read_capacity, write_capacity),
            secondary_index: None,
        };
        if let Err(e) = self.admin.create_table(&spec).await {
            error!(tenant = %tenant_id, table = %name, error = %e, "Failed to create table");
            return false;
        }
        info!(tenant = %tenant_id, table = %name, read_capacity, write_capacity, "Created table");
        self.ensure_index(&name).await;
        true
    }

    /// Creates the table and index shared by all shared tenants.
    ///
    /// The table carries a secondary index on `(appid, timestamp)` that
    /// projects every attribute, so records of all shared tenants can be
    /// range-queried by time.
    pub async fn create_shared(&self, read_capacity: i64, write_capacity: i64) -> bool {
        let name = self.mapper.shared_resource_name();
        if is_blank(&name) || name.chars().any(char::is_whitespace) {
            return false;
        }
        if self.table_exists(&name).await {
            warn!(table = %name, "Shared table already exists.");
            return false;
        }

        let spec = TableSpec {
            name: name.clone(),
            key_attribute: KEY_ATTRIBUTE.to_string(),
            throughput: Throughput::new(read_capacity, write_capacity),
            secondary_index: Some(SecondaryIndexSpec {
                name: self.mapper.shared_index_name(),
                hash_key: fields::APPID.to_string(),
                range_key: fields::TIMESTAMP.to_string(),
                throughput: Throughput::new(1, 1),
            }),
        };
        if let Err(e) = self.admin.create_table(&spec).await {
            error!(table = %name, error = %e, "Failed to create shared table");
            return false;
        }
        info!(table = %name, read_capacity, write_capacity, "Created shared table");
        self.ensure_index(&name).await;
        true
    }

    /// Changes the provisioned throughput of a tenant's table.
    ///
    /// Only active tables are updated, and only when the capacity actually
    /// changes; the backend rejects both other cases.
    pub async fn update(&self, tenant_id: &str, read_capacity: i64, write_capacity: i64) -> bool {
        if self.mapper.validate_dedicated(tenant_id).is_err() {
            return false;
        }
        let Some(name) = self.mapper.resource_name(tenant_id) else {
            return false;
        };
        let current = self.describe(tenant_id).await;
        if current.is_empty() || current.status != ResourceStatus::Active {
            debug!(tenant = %tenant_id, status = %current.status, "Table is not active, not updated");
            return false;
        }
        let throughput = Throughput::new(read_capacity, write_capacity);
        if current.read_capacity == read_capacity && current.write_capacity == write_capacity {
            debug!(tenant = %tenant_id, "Throughput unchanged, not updated");
            return false;
        }

        match self.admin.update_throughput(&name, throughput).await {
            Ok(()) => {
                info!(tenant = %tenant_id, table = %name, read_capacity, write_capacity, "Updated table throughput");
                true
            }
            Err(e) => {
                error!(tenant = %tenant_id, table = %name, error = %e, "Failed to update table");
                false
            }
        }
    }

    /// Deletes a tenant's table and index.
    pub async fn delete(&self, tenant_id: &str) -> bool {
        let Some(name) = self.mapper.resource_name(tenant_id) else {
            return false;
        };
        if !self.table_exists(&name).await {
            return false;
        }
        if let Err(e) = self.admin.delete_table(&name).await {
            error!(tenant = %tenant_id, table = %name, error = %e, "Failed to delete table");
            return false;
        }
        info!(tenant = %tenant_id, table = %name, "Deleted table");

        match self.index.delete_index(&name).await {
            Ok(()) | Err(StorageError::Validation(ValidationError::ResourceNotFound { .. })) => {}
            Err(e) => warn!(index = %name, error = %e, "Failed to delete index"),
        }
        true
    }

    /// Describes a tenant's table; the zeroed descriptor on any failure.
    pub async fn describe(&self, tenant_id: &str) -> PhysicalResourceDescriptor {
        let Some(name) = self.mapper.resource_name(tenant_id) else {
            return PhysicalResourceDescriptor::default();
        };
        match self.admin.describe_table(&name).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => PhysicalResourceDescriptor::default(),
            Err(e) => {
                warn!(tenant = %tenant_id, error = %e, "Failed to describe table");
                PhysicalResourceDescriptor::default()
            }
        }
    }

    /// Lists every table name, following the backend's pagination.
    ///
    /// A failing page ends the listing with the names gathered so far.
    pub async fn list_all(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut start_after: Option<String> = None;
        loop {
            let page = match self.admin.list_tables(start_after.as_deref(), LIST_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, "Failed to list tables");
                    break;
                }
            };
            if page.names.is_empty() {
                break;
            }
            names.extend(page.names);
            match page.last_evaluated {
                Some(last) => start_after = Some(last),
                None => break,
            }
        }
        names
    }

    async fn table_exists(&self, name: &str) -> bool {
        matches!(self.admin.describe_table(name).await, Ok(Some(_)))
    }

    async fn ensure_index(&self, name: &str) {
        let exists = self.index.index_exists(name).await.unwrap_or(false);
        if exists {
            return;
        }
        match self.index.create_index(name).await {
            Ok(()) => debug!(index = %name, "Created index"),
            Err(e) => warn!(index = %name, error = %e, "Failed to create index"),
        }
    }
}
