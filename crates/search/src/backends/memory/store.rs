//! In-memory primary store and table admin.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::core::{PrimaryStore, ScanPage, SecondaryIndexSpec, TableAdmin, TableListPage, TableSpec, Throughput};
use crate::error::{BackendError, StorageError, StorageResult, ValidationError};
use crate::tenant::TenantContext;
use crate::types::{PhysicalResourceDescriptor, ResourceStatus, SearchableObject};

const BACKEND_NAME: &str = "memory-store";

#[derive(Debug)]
struct Table {
    status: ResourceStatus,
    created_at: chrono::DateTime<Utc>,
    throughput: Throughput,
    secondary_index: Option<SecondaryIndexSpec>,
    /// Objects keyed by storage key.
    items: BTreeMap<String, SearchableObject>,
}

/// A [`PrimaryStore`] and [`TableAdmin`] keeping tables in process memory.
///
/// Objects are keyed by their storage key inside the tenant's physical
/// table, so shared tenants occupy one table with prefixed keys.
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
    unavailable: AtomicBool,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tables", &self.tables.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store without tables.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail with `BackendError::Unavailable`
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Writes an object into the tenant's table under its storage key.
    pub fn put(&self, tenant: &TenantContext, object: SearchableObject) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(tenant.resource_name())
            .ok_or_else(|| table_not_found(tenant.resource_name()))?;
        table.items.insert(tenant.storage_key(&object.id), object);
        Ok(())
    }

    /// Removes an object; returns `true` if it existed.
    pub fn remove(&self, tenant: &TenantContext, object_id: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(tenant.resource_name())
            .ok_or_else(|| table_not_found(tenant.resource_name()))?;
        Ok(table.items.remove(&tenant.storage_key(object_id)).is_some())
    }

    /// Returns `true` if the table holds the given storage key.
    pub fn contains_key(&self, table: &str, storage_key: &str) -> bool {
        self.tables
            .read()
            .get(table)
            .is_some_and(|t| t.items.contains_key(storage_key))
    }

    /// Forces a table into a status; returns `false` if it doesn't exist.
    pub fn set_status(&self, table: &str, status: ResourceStatus) -> bool {
        match self.tables.write().get_mut(table) {
            Some(t) => {
                t.status = status;
                true
            }
            None => false,
        }
    }

    /// Returns the secondary index a table was created with.
    pub fn secondary_index(&self, table: &str) -> Option<SecondaryIndexSpec> {
        self.tables
            .read()
            .get(table)
            .and_then(|t| t.secondary_index.clone())
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: "primary store is unavailable".to_string(),
            }));
        }
        Ok(())
    }
}

fn table_not_found(name: &str) -> StorageError {
    StorageError::Validation(ValidationError::ResourceNotFound {
        name: name.to_string(),
    })
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn batch_get(
        &self,
        tenant: &TenantContext,
        ids: &[String],
        _consistent_read: bool,
    ) -> StorageResult<HashMap<String, SearchableObject>> {
        self.check_available()?;
        let tables = self.tables.read();
        let table = tables
            .get(tenant.resource_name())
            .ok_or_else(|| table_not_found(tenant.resource_name()))?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                table
                    .items
                    .get(&tenant.storage_key(id))
                    .map(|obj| (id.clone(), obj.clone()))
            })
            .collect())
    }

    async fn scan(
        &self,
        tenant: &TenantContext,
        cursor: Option<&str>,
        limit: u32,
    ) -> StorageResult<ScanPage> {
        self.check_available()?;
        let tables = self.tables.read();
        let table = tables
            .get(tenant.resource_name())
            .ok_or_else(|| table_not_found(tenant.resource_name()))?;

        let start = cursor.map_or(Bound::Unbounded, |c| Bound::Excluded(c.to_string()));
        let mut matching = table
            .items
            .range((start, Bound::Unbounded))
            .filter(|(key, obj)| {
                !tenant.is_shared()
                    || (key.starts_with(tenant.key_prefix()) && obj.tenant_id == tenant.tenant_id())
            });

        let mut objects = Vec::new();
        let mut last_key = None;
        for (key, obj) in matching.by_ref().take(limit.max(1) as usize) {
            objects.push(obj.clone());
            last_key = Some(key.clone());
        }
        let next_cursor = if matching.next().is_some() { last_key } else { None };

        Ok(ScanPage {
            objects,
            next_cursor,
        })
    }
}

#[async_trait]
impl TableAdmin for MemoryStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn describe_table(&self, name: &str) -> StorageResult<Option<PhysicalResourceDescriptor>> {
        self.check_available()?;
        Ok(self.tables.read().get(name).map(|t| PhysicalResourceDescriptor {
            name: name.to_string(),
            status: t.status,
            created_at: Some(t.created_at),
            size_bytes: t
                .items
                .values()
                .map(|o| serde_json::to_vec(o).map_or(0, |v| v.len() as i64))
                .sum(),
            item_count: t.items.len() as i64,
            read_capacity: t.throughput.read,
            write_capacity: t.throughput.write,
        }))
    }

    async fn create_table(&self, spec: &TableSpec) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables.contains_key(&spec.name) {
            return Err(StorageError::Validation(
                ValidationError::ResourceAlreadyExists {
                    name: spec.name.clone(),
                },
            ));
        }
        tables.insert(
            spec.name.clone(),
            Table {
                status: ResourceStatus::Active,
                created_at: Utc::now(),
                throughput: spec.throughput,
                secondary_index: spec.secondary_index.clone(),
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn update_throughput(&self, name: &str, throughput: Throughput) -> StorageResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let table = tables.get_mut(name).ok_or_else(|| table_not_found(name))?;
        if table.status != ResourceStatus::Active {
            return Err(BackendError::internal(
                BACKEND_NAME,
                format!("table {} is {}, not ACTIVE", name, table.status),
            )
            .into());
        }
        if table.throughput == throughput {
            return Err(BackendError::internal(
                BACKEND_NAME,
                format!("table {} already has the requested throughput", name),
            )
            .into());
        }
        table.throughput = throughput;
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> StorageResult<()> {
        self.check_available()?;
        match self.tables.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(table_not_found(name)),
        }
    }

    async fn list_tables(&self, start_after: Option<&str>, limit: u32) -> StorageResult<TableListPage> {
        self.check_available()?;
        let tables = self.tables.read();
        let start = start_after.map_or(Bound::Unbounded, |s| Bound::Excluded(s.to_string()));
        let mut names = tables.range::<String, _>((start, Bound::Unbounded)).map(|(k, _)| k.clone());

        let page: Vec<String> = names.by_ref().take(limit.max(1) as usize).collect();
        let last_evaluated = if names.next().is_some() {
            page.last().cloned()
        } else {
            None
        };
        Ok(TableListPage {
            names: page,
            last_evaluated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantResourceMapper;
    use serde_json::json;

    fn spec(name: &str) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            key_attribute: "key".to_string(),
            throughput: Throughput::new(1, 1),
            secondary_index: None,
        }
    }

    #[tokio::test]
    async fn test_shared_tenants_use_prefixed_keys() {
        let store = MemoryStore::new();
        let mapper = TenantResourceMapper::default();
        let alpha = mapper.context(" alpha").unwrap();
        let beta = mapper.context(" beta").unwrap();
        store.create_table(&spec(alpha.resource_name())).await.unwrap();

        store
            .put(&alpha, SearchableObject::new("1", "note", " alpha"))
            .unwrap();
        store
            .put(&beta, SearchableObject::new("1", "note", " beta").with_field("x", json!(2)))
            .unwrap();

        assert!(store.contains_key(alpha.resource_name(), "alpha_1"));
        assert!(store.contains_key(alpha.resource_name(), "beta_1"));

        let found = store.batch_get(&beta, &["1".into()], true).await.unwrap();
        assert_eq!(found["1"].field("x"), Some(&json!(2)));

        let page = store.scan(&alpha, None, 10).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].tenant_id, " alpha");
    }

    #[tokio::test]
    async fn test_scan_skips_tenants_sharing_a_key_prefix() {
        let store = MemoryStore::new();
        let mapper = TenantResourceMapper::default();
        let short = mapper.context(" a").unwrap();
        let long = mapper.context(" a_b").unwrap();
        store.create_table(&spec(short.resource_name())).await.unwrap();

        store.put(&short, SearchableObject::new("0", "note", " a")).unwrap();
        store.put(&long, SearchableObject::new("0", "note", " a_b")).unwrap();
        assert!(store.contains_key(short.resource_name(), "a_b_0"));

        let page = store.scan(&short, None, 10).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].tenant_id, " a");

        let page = store.scan(&long, None, 10).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].tenant_id, " a_b");
    }

    #[tokio::test]
    async fn test_scan_pages() {
        let store = MemoryStore::new();
        let ctx = TenantResourceMapper::default().context("acme").unwrap();
        store.create_table(&spec(ctx.resource_name())).await.unwrap();
        for id in ["a", "b", "c"] {
            store.put(&ctx, SearchableObject::new(id, "note", "acme")).unwrap();
        }

        let first = store.scan(&ctx, None, 2).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        let cursor = first.next_cursor.unwrap();
        let second = store.scan(&ctx, Some(&cursor), 2).await.unwrap();
        assert_eq!(second.objects.len(), 1);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_update_requires_active_and_change() {
        let store = MemoryStore::new();
        store.create_table(&spec("t")).await.unwrap();
        assert!(store.update_throughput("t", Throughput::new(1, 1)).await.is_err());
        assert!(store.update_throughput("t", Throughput::new(5, 5)).await.is_ok());

        store.set_status("t", ResourceStatus::Updating);
        assert!(store.update_throughput("t", Throughput::new(6, 6)).await.is_err());

        let desc = store.describe_table("t").await.unwrap().unwrap();
        assert_eq!(desc.read_capacity, 5);
        assert_eq!(desc.status, ResourceStatus::Updating);
    }

    #[tokio::test]
    async fn test_list_tables_pages() {
        let store = MemoryStore::new();
        for name in ["c", "a", "b"] {
            store.create_table(&spec(name)).await.unwrap();
        }
        let first = store.list_tables(None, 2).await.unwrap();
        assert_eq!(first.names, ["a", "b"]);
        assert_eq!(first.last_evaluated.as_deref(), Some("b"));
        let second = store.list_tables(Some("b"), 2).await.unwrap();
        assert_eq!(second.names, ["c"]);
        assert!(second.last_evaluated.is_none());
    }

    #[tokio::test]
    async fn test_create_and_delete_errors() {
        let store = MemoryStore::new();
        store.create_table(&spec("t")).await.unwrap();
        assert!(matches!(
            store.create_table(&spec("t")).await,
            Err(StorageError::Validation(ValidationError::ResourceAlreadyExists { .. }))
        ));
        store.delete_table("t").await.unwrap();
        assert!(matches!(
            store.delete_table("t").await,
            Err(StorageError::Validation(ValidationError::ResourceNotFound { .. }))
        ));
    }
}
