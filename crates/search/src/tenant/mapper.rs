//! Mapping from tenant ids to physical resource names and storage keys.

use crate::config::SearchConfig;
use crate::error::TenantError;

use super::context::{TenancyModel, TenantContext};

/// Leading character that marks a tenant id as shared.
pub const SHARED_TENANT_SENTINEL: char = ' ';

/// Maps tenant ids onto physical tables, indices and storage keys.
///
/// All functions are pure and total: a blank tenant id maps to no resource
/// (`None`) rather than an error.
///
/// # Naming
///
/// - Shared tenants (id starts with [`SHARED_TENANT_SENTINEL`]) all map to the
///   same shared resource, whichever shared tenant asks.
/// - Dedicated tenants map to `{prefix}-{tenant}`, unless the id already
///   carries the prefix or is the root tenant. Prefixing is idempotent.
#[derive(Debug, Clone)]
pub struct TenantResourceMapper {
    resource_prefix: String,
    shared_resource_name: String,
    root_tenant: String,
}

impl TenantResourceMapper {
    /// Creates a mapper with explicit naming parameters.
    pub fn new(
        resource_prefix: impl Into<String>,
        shared_resource_name: impl Into<String>,
        root_tenant: impl Into<String>,
    ) -> Self {
        Self {
            resource_prefix: resource_prefix.into(),
            shared_resource_name: shared_resource_name.into(),
            root_tenant: root_tenant.into(),
        }
    }

    /// Creates a mapper from the search configuration.
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.resource_prefix.clone(),
            config.shared_resource_name.clone(),
            config.root_tenant.clone(),
        )
    }

    /// Returns the root tenant id used by tenant-implicit operations.
    pub fn root_tenant(&self) -> &str {
        &self.root_tenant
    }

    /// Returns `true` if the tenant id designates a shared tenant.
    pub fn is_shared(&self, tenant_id: &str) -> bool {
        tenant_id.starts_with(SHARED_TENANT_SENTINEL)
    }

    /// Returns the physical resource name for a tenant, or `None` for a blank id.
    pub fn resource_name(&self, tenant_id: &str) -> Option<String> {
        if is_blank(tenant_id) {
            return None;
        }
        let name = if self.is_shared(tenant_id) {
            self.shared_resource_name.as_str()
        } else {
            tenant_id
        };
        Some(self.namespaced(name))
    }

    /// Returns the physical name of the shared resource.
    pub fn shared_resource_name(&self) -> String {
        self.namespaced(&self.shared_resource_name)
    }

    /// Returns the name of the shared table's tenant/time secondary index.
    pub fn shared_index_name(&self) -> String {
        format!("Index_{}", self.shared_resource_name)
    }

    /// Returns the storage key prefix for a tenant (empty for dedicated tenants).
    pub fn key_prefix(&self, tenant_id: &str) -> String {
        if self.is_shared(tenant_id) {
            format!("{}_", tenant_id.trim())
        } else {
            String::new()
        }
    }

    /// Returns the key under which an object is stored for a tenant.
    ///
    /// Blank ids or tenant ids return the object id unchanged.
    pub fn storage_key(&self, object_id: &str, tenant_id: &str) -> String {
        if is_blank(object_id) || is_blank(tenant_id) {
            return object_id.to_string();
        }
        format!("{}{}", self.key_prefix(tenant_id), object_id)
    }

    /// Resolves the full context for a tenant, or `None` for a blank id.
    pub fn context(&self, tenant_id: &str) -> Option<TenantContext> {
        self.resolve(tenant_id).ok()
    }

    /// Resolves the full context for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`TenantError::BlankTenant`] for an empty or whitespace-only id.
    pub fn resolve(&self, tenant_id: &str) -> Result<TenantContext, TenantError> {
        let resource_name = self
            .resource_name(tenant_id)
            .ok_or(TenantError::BlankTenant)?;
        let tenancy = if self.is_shared(tenant_id) {
            TenancyModel::Shared
        } else {
            TenancyModel::Dedicated
        };
        Ok(TenantContext::new(
            tenant_id,
            tenancy,
            resource_name,
            self.key_prefix(tenant_id),
        ))
    }

    /// Checks that a tenant id may get a dedicated resource of its own.
    ///
    /// Any whitespace is rejected, so shared ids never pass.
    pub fn validate_dedicated(&self, tenant_id: &str) -> Result<(), TenantError> {
        if is_blank(tenant_id) {
            return Err(TenantError::BlankTenant);
        }
        if tenant_id.chars().any(char::is_whitespace) {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant_id.to_string(),
                reason: "contains whitespace".to_string(),
            });
        }
        Ok(())
    }

    fn namespaced(&self, name: &str) -> String {
        let prefix = format!("{}-", self.resource_prefix);
        if name == self.root_tenant || name.starts_with(&prefix) {
            name.to_string()
        } else {
            format!("{}{}", prefix, name)
        }
    }
}

impl Default for TenantResourceMapper {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

pub(crate) fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
