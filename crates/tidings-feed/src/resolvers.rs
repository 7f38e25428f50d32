//! Single-flight batch loading.
//!
//! A `SingleFlight` holds at most one open batch. Callers add their ids to
//! it and await its result; the first caller to poll runs the fetch once the
//! page's `BatchCoordinator` releases. The batch is sealed at that point, so
//! callers arriving later open a fresh one instead of being lost.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tidings_core::error::FeedError;
use tokio::sync::OnceCell;

use crate::batch::BatchCoordinator;

type BatchResult<V> = Result<Arc<Vec<V>>, FeedError>;

struct Batch<K, V> {
    ids: Mutex<Vec<K>>,
    result: OnceCell<BatchResult<V>>,
}

impl<K, V> Batch<K, V> {
    fn new() -> Self {
        Self {
            ids: Mutex::new(Vec::new()),
            result: OnceCell::new(),
        }
    }
}

/// Coalesces concurrent id lookups of one entity type into one fetch.
pub struct SingleFlight<K, V> {
    slot: Mutex<Option<Arc<Batch<K, V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("SingleFlight").field("open", &open).finish()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `ids` to the open batch, opening one if needed.
    fn join(&self, ids: &[K]) -> Arc<Batch<K, V>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let batch = slot.get_or_insert_with(|| Arc::new(Batch::new())).clone();
        batch
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(ids);
        batch
    }

    /// Closes `batch` to new callers and returns its deduplicated ids.
    fn seal(&self, batch: &Arc<Batch<K, V>>) -> Vec<K> {
        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|open| Arc::ptr_eq(open, batch)) {
                *slot = None;
            }
        }
        let ids = std::mem::take(
            &mut *batch
                .ids
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut seen = HashSet::with_capacity(ids.len());
        ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
    }

    /// Resolves `ids` through the shared batch.
    ///
    /// Returns the fetched rows matching `ids`, in request order. `key`
    /// extracts the id of a fetched row.
    ///
    /// # Errors
    ///
    /// Returns the fetch error to every caller of the failed batch.
    pub async fn load<F, Fut>(
        &self,
        coordinator: &BatchCoordinator,
        ids: &[K],
        key: impl Fn(&V) -> K,
        fetch: F,
    ) -> Result<Vec<V>, FeedError>
    where
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = Result<Vec<V>, FeedError>>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.join(ids);
        let rows = batch
            .result
            .get_or_init(|| async {
                coordinator.start().await;
                let ids = self.seal(&batch);
                fetch(ids).await.map(Arc::new)
            })
            .await
            .clone()?;

        let by_id: HashMap<K, &V> = rows.iter().map(|row| (key(row), row)).collect();
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| by_id.get(id).map(|row| (*row).clone()))
            .collect())
    }
}
