//! Tenant-to-resource mapping.
//!
//! Every tenant ("app") owns a set of objects that live in a physical table of
//! the primary store and a physical index of the search engine. A tenant is
//! either **dedicated** (its own resources) or **shared** (one physical
//! resource holding many tenants, disambiguated by a key prefix).
//!
//! - [`TenantResourceMapper`] - pure functions from a tenant id to physical
//!   names and storage keys
//! - [`TenantContext`] - the resolved view of one tenant
//! - [`TenancyModel`] - dedicated vs. shared
//!
//! # Examples
//!
//! ```
//! use kestrel_search::SearchConfig;
//! use kestrel_search::tenant::TenantResourceMapper;
//!
//! let mapper = TenantResourceMapper::from_config(&SearchConfig::default());
//!
//! assert_eq!(mapper.resource_name("acct-42").as_deref(), Some("platform-acct-42"));
//! assert_eq!(mapper.resource_name(" alpha").as_deref(), Some("platform-0"));
//! assert_eq!(mapper.storage_key("n1", " alpha"), "alpha_n1");
//! assert_eq!(mapper.storage_key("n1", "acct-42"), "n1");
//! ```

mod context;
mod mapper;

pub use context::{TenancyModel, TenantContext};
pub use mapper::{SHARED_TENANT_SENTINEL, TenantResourceMapper};

pub(crate) use mapper::is_blank;
