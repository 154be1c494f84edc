//! Materialization of index hits into domain objects.
//!
//! The index is a secondary copy; the primary store is the source of truth.
//! [`ConsistencyReconciler::materialize`] turns a page of hits into objects,
//! either straight from the indexed sources or by re-reading them from the
//! primary store. Hits the store does not know are still returned (from
//! their indexed source) and, when they claim to be stored objects of the
//! querying tenant, reported as drift.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{Hit, PrimaryStore};
use crate::tenant::TenantContext;
use crate::types::SearchableObject;

/// Objects materialized from a page of hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// Objects in hit order.
    pub objects: Vec<SearchableObject>,
    /// Ids present in the index but missing from the primary store.
    pub drift: Vec<String>,
}

impl Reconciled {
    /// Returns `true` if drift was detected.
    pub fn has_drift(&self) -> bool {
        !self.drift.is_empty()
    }
}

/// Merges index hits with primary-store lookups.
#[derive(Clone)]
pub struct ConsistencyReconciler {
    store: Arc<dyn PrimaryStore>,
    read_from_index: bool,
    consistent_reads: bool,
}

impl std::fmt::Debug for ConsistencyReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyReconciler")
            .field("store", &self.store.backend_name())
            .field("read_from_index", &self.read_from_index)
            .field("consistent_reads", &self.consistent_reads)
            .finish()
    }
}

impl ConsistencyReconciler {
    /// Creates a reconciler over the primary store.
    pub fn new(store: Arc<dyn PrimaryStore>, read_from_index: bool, consistent_reads: bool) -> Self {
        Self {
            store,
            read_from_index,
            consistent_reads,
        }
    }

    /// Turns hits into objects, preserving hit order.
    ///
    /// Never fails. Hits with malformed sources are skipped; a store failure
    /// is logged and yields an empty result.
    pub async fn materialize(&self, tenant: &TenantContext, hits: &[Hit]) -> Reconciled {
        if hits.is_empty() {
            return Reconciled::default();
        }
        for hit in hits {
            debug!(
                tenant = %tenant.tenant_id(),
                appid = ?hit.source.get("appid"),
                id = %hit.id,
                "Search result"
            );
        }

        if self.read_from_index {
            return Reconciled {
                objects: hits.iter().filter_map(from_hit).collect(),
                drift: Vec::new(),
            };
        }

        let ids: Vec<String> = hits.iter().map(|h| h.object_id().to_string()).collect();
        let from_store = match self
            .store
            .batch_get(tenant, &ids, self.consistent_reads)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    tenant = %tenant.tenant_id(),
                    error = %e,
                    "Search query failed for app '{}'",
                    tenant.tenant_id()
                );
                return Reconciled::default();
            }
        };

        let mut result = Reconciled {
            objects: Vec::with_capacity(hits.len()),
            drift: Vec::new(),
        };
        for (hit, id) in hits.iter().zip(ids) {
            if let Some(object) = from_store.get(&id) {
                result.objects.push(object.clone());
                continue;
            }
            let Some(object) = from_hit(hit) else {
                continue;
            };
            if object.stored && object.tenant_id == tenant.tenant_id() {
                result.drift.push(id);
            } else {
                debug!(id = %id, "Index-only object, not reported as drift");
            }
            result.objects.push(object);
        }

        if result.has_drift() {
            warn!(
                tenant = %tenant.tenant_id(),
                count = result.drift.len(),
                "Found {} objects that are indexed but not in the database: {:?}",
                result.drift.len(),
                result.drift
            );
        }
        result
    }
}

fn from_hit(hit: &Hit) -> Option<SearchableObject> {
    match SearchableObject::from_source(&hit.source) {
        Ok(object) => Some(object),
        Err(e) => {
            debug!(id = %hit.id, error = %e, "Skipping hit with a malformed source");
            None
        }
    }
}
