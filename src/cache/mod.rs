//! Versioned response cache.
//!
//! A [`CacheStorage`] holds any number of named generations. The engine only
//! ever reads and writes the generation named by the configured version tag;
//! every other generation is stale and removed on activation.

mod entry;
mod snapshot;

pub use entry::CachedEntry;
pub use snapshot::StorageSnapshot;

use crate::http::{Request, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Generation = BTreeMap<String, CachedEntry>;

/// The set of cache generations.
///
/// Cloning is cheap and yields a handle to the same storage.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    generations: Arc<RwLock<BTreeMap<String, Generation>>>,
}

impl CacheStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the generation called `name`, creating it if absent.
    pub async fn open(&self, name: &str) -> CacheGeneration {
        self.generations
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        CacheGeneration {
            name: name.to_string(),
            storage: self.clone(),
        }
    }

    /// Whether a generation called `name` exists.
    pub async fn has(&self, name: &str) -> bool {
        self.generations.read().await.contains_key(name)
    }

    /// Names of all generations, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.generations.read().await.keys().cloned().collect()
    }

    /// Delete a generation. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        self.generations.write().await.remove(name).is_some()
    }

    /// Capture every generation for persistence.
    pub async fn snapshot(&self) -> StorageSnapshot {
        let generations = self.generations.read().await;
        StorageSnapshot {
            generations: generations
                .iter()
                .map(|(name, entries)| (name.clone(), entries.values().cloned().collect()))
                .collect(),
        }
    }

    /// Rebuild a storage from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        let generations: BTreeMap<String, Generation> = snapshot
            .generations
            .into_iter()
            .map(|(name, entries)| {
                let generation: Generation = entries
                    .into_iter()
                    .map(|entry| (entry.key(), entry))
                    .collect();
                (name, generation)
            })
            .collect();

        Self {
            generations: Arc::new(RwLock::new(generations)),
        }
    }
}

/// Handle to a single named generation.
///
/// Writes through a handle whose generation has since been deleted are
/// dropped, so an evicted generation can never be resurrected.
#[derive(Debug, Clone)]
pub struct CacheGeneration {
    name: String,
    storage: CacheStorage,
}

impl CacheGeneration {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the stored entry for a request.
    pub async fn get(&self, request: &Request) -> Option<CachedEntry> {
        self.storage
            .generations
            .read()
            .await
            .get(&self.name)
            .and_then(|generation| generation.get(&request.cache_key()))
            .cloned()
    }

    /// Store (or overwrite) the response for a request.
    ///
    /// Returns `false` if the generation no longer exists.
    pub async fn put(&self, request: &Request, response: Response) -> bool {
        let entry = CachedEntry::new(request, response);
        match self.storage.generations.write().await.get_mut(&self.name) {
            Some(generation) => {
                generation.insert(entry.key(), entry);
                true
            }
            None => false,
        }
    }

    /// Store several responses under a single write lock.
    pub async fn put_all(&self, pairs: Vec<(Request, Response)>) -> bool {
        let mut generations = self.storage.generations.write().await;
        match generations.get_mut(&self.name) {
            Some(generation) => {
                for (request, response) in pairs {
                    let entry = CachedEntry::new(&request, response);
                    generation.insert(entry.key(), entry);
                }
                true
            }
            None => false,
        }
    }

    /// Remove the entry for a request. Returns whether one existed.
    pub async fn delete(&self, request: &Request) -> bool {
        self.storage
            .generations
            .write()
            .await
            .get_mut(&self.name)
            .is_some_and(|generation| generation.remove(&request.cache_key()).is_some())
    }

    /// Cache keys of all stored entries, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.storage
            .generations
            .read()
            .await
            .get(&self.name)
            .map(|generation| generation.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.storage
            .generations
            .read()
            .await
            .get(&self.name)
            .map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
