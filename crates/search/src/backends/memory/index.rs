//! In-memory search index.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::core::{
    BulkFailure, BulkOperation, BulkResponse, Hit, IndexClient, IndexDocument, ScrollPage,
    SearchHits, SearchRequest, SortOrder,
};
use crate::error::{BackendError, SearchError, StorageError, StorageResult, ValidationError};
use crate::query::NativeQuery;

use super::matcher;

const BACKEND_NAME: &str = "memory-index";

#[derive(Debug, Clone)]
struct StoredDoc {
    seq: u64,
    source: Value,
}

#[derive(Debug)]
struct ScrollState {
    remaining: VecDeque<Hit>,
    size: usize,
    expires_at: Instant,
}

/// An [`IndexClient`] keeping every index in process memory.
///
/// Writes are visible immediately, like an index refreshed after every
/// request. Writing into a missing index creates it, as the engine does by
/// default. Hits are ranked in insertion order, all with score `1.0`.
pub struct MemoryIndex {
    indices: RwLock<HashMap<String, HashMap<String, StoredDoc>>>,
    scrolls: RwLock<HashMap<String, ScrollState>>,
    seq: AtomicU64,
    unavailable: AtomicBool,
}

impl Debug for MemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("indices", &self.indices.read().len())
            .field("scrolls", &self.scrolls.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Creates an empty index engine.
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            scrolls: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail with `BackendError::Unavailable`
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Returns the number of documents in an index (0 if it doesn't exist).
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .get(&normalize(index))
            .map_or(0, HashMap::len)
    }

    /// Returns the number of open scroll cursors.
    pub fn open_scrolls(&self) -> usize {
        self.scrolls.read().len()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StorageError::Backend(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: "index engine is unavailable".to_string(),
            }));
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::SeqCst)
    }

    fn put(&self, doc: IndexDocument) {
        let seq = self.next_seq();
        let mut indices = self.indices.write();
        let docs = indices.entry(normalize(&doc.index)).or_default();
        // Replacing a document keeps its original position.
        let seq = docs.get(&doc.id).map_or(seq, |existing| existing.seq);
        docs.insert(
            doc.id,
            StoredDoc {
                seq,
                source: doc.source,
            },
        );
    }

    /// Evaluates a query and returns every hit in rank order.
    fn matching(&self, index: &str, query: &NativeQuery, sort: &SortOrder) -> StorageResult<Vec<Hit>> {
        let indices = self.indices.read();
        let docs = indices
            .get(&normalize(index))
            .ok_or_else(|| index_not_found(index))?;

        let mut found: Vec<(&String, &StoredDoc)> = Vec::new();
        for (id, doc) in docs {
            if matcher::matches(query.as_json(), id, &doc.source)? {
                found.push((id, doc));
            }
        }

        found.sort_by_key(|(_, doc)| doc.seq);
        if let SortOrder::Field { field, descending } = sort {
            found.sort_by(|(_, a), (_, b)| {
                let av = matcher::first_value(&a.source, field);
                let bv = matcher::first_value(&b.source, field);
                match (av, bv) {
                    (Some(x), Some(y)) => {
                        let ord = matcher::compare_values(x, y);
                        if *descending { ord.reverse() } else { ord }
                    }
                    // Documents without the sort field go last either way.
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            });
        }

        Ok(found
            .into_iter()
            .map(|(id, doc)| Hit {
                id: id.clone(),
                score: 1.0,
                source: doc.source.clone(),
            })
            .collect())
    }

    fn next_page(&self, scroll_id: String, mut state: ScrollState, keep_alive: Duration) -> ScrollPage {
        let take = state.size.min(state.remaining.len());
        let hits: Vec<Hit> = state.remaining.drain(..take).collect();
        state.expires_at = Instant::now() + keep_alive;
        self.scrolls.write().insert(scroll_id.clone(), state);
        ScrollPage {
            scroll_id: Some(scroll_id),
            hits,
        }
    }
}

fn normalize(index: &str) -> String {
    index.to_lowercase()
}

fn index_not_found(index: &str) -> StorageError {
    StorageError::Validation(ValidationError::ResourceNotFound {
        name: normalize(index),
    })
}

#[async_trait]
impl IndexClient for MemoryIndex {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn index_exists(&self, index: &str) -> StorageResult<bool> {
        self.check_available()?;
        Ok(self.indices.read().contains_key(&normalize(index)))
    }

    async fn create_index(&self, index: &str) -> StorageResult<()> {
        self.check_available()?;
        let mut indices = self.indices.write();
        let name = normalize(index);
        if indices.contains_key(&name) {
            return Err(StorageError::Validation(
                ValidationError::ResourceAlreadyExists { name },
            ));
        }
        indices.insert(name, HashMap::new());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> StorageResult<()> {
        self.check_available()?;
        match self.indices.write().remove(&normalize(index)) {
            Some(_) => Ok(()),
            None => Err(index_not_found(index)),
        }
    }

    async fn index(&self, doc: IndexDocument) -> StorageResult<()> {
        self.check_available()?;
        self.put(doc);
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> StorageResult<()> {
        self.check_available()?;
        if let Some(docs) = self.indices.write().get_mut(&normalize(index)) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> StorageResult<Option<Value>> {
        self.check_available()?;
        Ok(self
            .indices
            .read()
            .get(&normalize(index))
            .and_then(|docs| docs.get(id))
            .map(|doc| doc.source.clone()))
    }

    async fn multi_get(&self, index: &str, ids: &[String]) -> StorageResult<Vec<Value>> {
        self.check_available()?;
        let indices = self.indices.read();
        let Some(docs) = indices.get(&normalize(index)) else {
            return Err(index_not_found(index));
        };
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id))
            .map(|doc| doc.source.clone())
            .collect())
    }

    async fn bulk(&self, operations: Vec<BulkOperation>) -> StorageResult<BulkResponse> {
        self.check_available()?;
        let started = Instant::now();
        let items = operations.len();
        let mut failures = Vec::new();

        for op in operations {
            match op {
                BulkOperation::Index(doc) => self.put(doc),
                BulkOperation::Delete { index, id } => {
                    let mut indices = self.indices.write();
                    match indices.get_mut(&normalize(&index)) {
                        Some(docs) => {
                            docs.remove(&id);
                        }
                        None => failures.push(BulkFailure {
                            id,
                            reason: format!("no such index [{}]", normalize(&index)),
                        }),
                    }
                }
            }
        }

        Ok(BulkResponse {
            took_ms: started.elapsed().as_millis() as u64,
            items,
            failures,
        })
    }

    async fn search(&self, request: SearchRequest) -> StorageResult<SearchHits> {
        self.check_available()?;
        let hits = self.matching(&request.index, &request.query, &request.sort)?;
        let total = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(usize::try_from(request.from).unwrap_or(usize::MAX))
            .take(request.size as usize)
            .collect();
        Ok(SearchHits { total, hits })
    }

    async fn scroll_start(
        &self,
        index: &str,
        query: &NativeQuery,
        size: u32,
        keep_alive: Duration,
    ) -> StorageResult<ScrollPage> {
        self.check_available()?;
        let hits = self.matching(index, query, &SortOrder::Score)?;
        let state = ScrollState {
            remaining: hits.into(),
            size: size.max(1) as usize,
            expires_at: Instant::now() + keep_alive,
        };
        Ok(self.next_page(Uuid::new_v4().to_string(), state, keep_alive))
    }

    async fn scroll_next(&self, scroll_id: &str, keep_alive: Duration) -> StorageResult<ScrollPage> {
        self.check_available()?;
        let state = self
            .scrolls
            .write()
            .remove(scroll_id)
            .filter(|s| s.expires_at > Instant::now())
            .ok_or_else(|| {
                StorageError::Search(SearchError::InvalidScroll {
                    scroll_id: scroll_id.to_string(),
                })
            })?;
        Ok(self.next_page(scroll_id.to_string(), state, keep_alive))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> StorageResult<()> {
        self.check_available()?;
        self.scrolls.write().remove(scroll_id);
        Ok(())
    }

    async fn refresh(&self, index: &str) -> StorageResult<()> {
        self.check_available()?;
        if self.indices.read().contains_key(&normalize(index)) {
            Ok(())
        } else {
            Err(index_not_found(index))
        }
    }
}
