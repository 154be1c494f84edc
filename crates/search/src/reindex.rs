//! Rebuilding a tenant's index from the primary store.
//!
//! Used to repair drift or to populate a freshly created index. The primary
//! store is scanned page by page and every page is re-indexed with a single
//! bulk request. On the shared table only objects owned by the tenant are
//! indexed. Only writes the engine acknowledged are counted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::PrimaryStore;
use crate::executor::SearchExecutor;

/// Options of a reindex run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexOptions {
    /// Objects read from the store per page.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Whether to remove the tenant's documents before reindexing.
    #[serde(default)]
    pub clear_existing: bool,
}

fn default_batch_size() -> u32 {
    100
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            clear_existing: false,
        }
    }
}

impl ReindexOptions {
    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Enables clearing existing documents.
    pub fn clear_existing(mut self) -> Self {
        self.clear_existing = true;
        self
    }
}

/// Outcome of a reindex run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReindexSummary {
    /// Store pages processed.
    pub pages: u64,
    /// Objects the index acknowledged.
    pub objects: u64,
    /// Documents removed up front.
    pub cleared: u64,
    /// `false` if the run ended early on a store or index failure.
    pub completed: bool,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Re-indexes tenants from the primary store.
#[derive(Clone)]
pub struct Reindexer {
    store: Arc<dyn PrimaryStore>,
    executor: SearchExecutor,
}

impl std::fmt::Debug for Reindexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reindexer")
            .field("store", &self.store.backend_name())
            .finish_non_exhaustive()
    }
}

impl Reindexer {
    /// Creates a reindexer.
    pub fn new(store: Arc<dyn PrimaryStore>, executor: SearchExecutor) -> Self {
        Self { store, executor }
    }

    /// Rebuilds the tenant's index.
    ///
    /// Never fails; a store scan failure or a bulk write the index did not
    /// fully acknowledge is logged and ends the run with the partial summary.
    pub async fn rebuild(&self, tenant_id: &str, options: ReindexOptions) -> ReindexSummary {
        let started = Instant::now();
        let mut summary = ReindexSummary::default();
        let Some(ctx) = self.executor.mapper().context(tenant_id) else {
            return summary;
        };

        if options.clear_existing {
            summary.cleared = self.executor.unindex_matching(tenant_id, &[], true).await;
        }

        let batch_size = options.batch_size.max(1);
        let mut cursor: Option<String> = None;
        loop {
            let page = match self.store.scan(&ctx, cursor.as_deref(), batch_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        tenant = %tenant_id,
                        pages = summary.pages,
                        error = %e,
                        "Reindex aborted, store scan failed"
                    );
                    summary.elapsed = started.elapsed();
                    return summary;
                }
            };
            let scanned = page.objects.len();
            let owned: Vec<_> = page
                .objects
                .into_iter()
                .filter(|o| !ctx.is_shared() || o.tenant_id == ctx.tenant_id())
                .collect();
            if owned.len() < scanned {
                debug!(
                    tenant = %tenant_id,
                    skipped = scanned - owned.len(),
                    "Skipped objects owned by other tenants"
                );
            }
            summary.pages += 1;
            if !owned.is_empty() {
                let outcome = self.executor.index_all(tenant_id, &owned).await;
                summary.objects += outcome.acknowledged;
                if !outcome.is_complete() {
                    warn!(
                        tenant = %tenant_id,
                        pages = summary.pages,
                        failed = outcome.failed(),
                        "Reindex aborted, index rejected {} of {} objects",
                        outcome.failed(),
                        outcome.submitted
                    );
                    summary.elapsed = started.elapsed();
                    return summary;
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        summary.completed = true;
        summary.elapsed = started.elapsed();
        info!(
            tenant = %tenant_id,
            pages = summary.pages,
            objects = summary.objects,
            cleared = summary.cleared,
            took_ms = summary.elapsed.as_millis() as u64,
            "Reindexed {} objects",
            summary.objects
        );
        summary
    }
}
