//! Resolved tenant context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a tenant's objects are laid out physically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenancyModel {
    /// The tenant owns its table and index.
    #[default]
    Dedicated,

    /// The tenant shares one table and index with other shared tenants.
    /// Storage keys carry a tenant prefix and queries are filtered by tenant.
    Shared,
}

impl fmt::Display for TenancyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenancyModel::Dedicated => write!(f, "dedicated"),
            TenancyModel::Shared => write!(f, "shared"),
        }
    }
}

/// The physical resolution of one tenant id.
///
/// Derived deterministically from the tenant id by
/// [`TenantResourceMapper::context`](super::TenantResourceMapper::context)
/// and never persisted. A context only exists for non-blank tenant ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: String,
    tenancy: TenancyModel,
    resource_name: String,
    key_prefix: String,
}

impl TenantContext {
    pub(crate) fn new(
        tenant_id: impl Into<String>,
        tenancy: TenancyModel,
        resource_name: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenancy,
            resource_name: resource_name.into(),
            key_prefix: key_prefix.into(),
        }
    }

    /// Returns the tenant id exactly as supplied by the caller.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the tenancy model.
    pub fn tenancy(&self) -> TenancyModel {
        self.tenancy
    }

    /// Returns `true` if this tenant lives in the shared resource.
    pub fn is_shared(&self) -> bool {
        self.tenancy == TenancyModel::Shared
    }

    /// Returns the physical table/index name.
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Returns the storage key prefix (empty for dedicated tenants).
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Returns the storage key for an object id.
    ///
    /// Blank ids are returned unchanged.
    pub fn storage_key(&self, object_id: &str) -> String {
        if object_id.trim().is_empty() || !self.is_shared() {
            object_id.to_string()
        } else {
            format!("{}{}", self.key_prefix, object_id)
        }
    }
}

impl fmt::Display for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.tenant_id.trim(), self.tenancy, self.resource_name)
    }
}
