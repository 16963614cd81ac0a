//! Content-keyed fingerprint cache with time-based eviction.
//!
//! Entries are immutable once written and only ever replaced whole, so the
//! background sweeper and concurrent lookups never observe a half-updated
//! entry. Expired entries are invisible to `get` even before a sweep removes
//! them.

use blake3::Hash as Blake3Hash;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::types::ImageHashes;

/// Cache key: file content digest plus the grid size the hashes were built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub digest: Blake3Hash,
    pub hash_size: u32,
}

impl CacheKey {
    pub fn new(digest: Blake3Hash, hash_size: u32) -> Self {
        Self { digest, hash_size }
    }
}

struct CacheEntry {
    hashes: Arc<ImageHashes>,
    inserted: Instant,
}

/// In-memory cache shared by every run of an [`crate::ImageGrouper`]
pub struct FingerprintCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl FingerprintCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a live entry
    pub fn get(&self, key: &CacheKey) -> Option<Arc<ImageHashes>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.inserted.elapsed() <= self.ttl)
            .map(|entry| Arc::clone(&entry.hashes))
    }

    /// Insert or replace an entry, restarting its time-to-live
    pub fn insert(&self, key: CacheKey, hashes: ImageHashes) -> Arc<ImageHashes> {
        let hashes = Arc::new(hashes);
        let entry = CacheEntry {
            hashes: Arc::clone(&hashes),
            inserted: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
        hashes
    }

    /// Remove every entry older than the TTL, returning how many were evicted
    pub fn sweep(&self) -> usize {
        self.evict_older_than(Instant::now())
    }

    fn evict_older_than(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted) <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a background thread that calls [`sweep`](Self::sweep) every `interval`.
    ///
    /// The thread stops when the returned handle is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> std::io::Result<CacheSweeper> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let cache = Arc::clone(self);

        let handle = std::thread::Builder::new()
            .name("fingerprint-cache-sweeper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let evicted = cache.sweep();
                        if evicted > 0 {
                            info!("Evicted {} expired fingerprints from cache", evicted);
                        }
                    }
                    // Stop signal or handle dropped
                    _ => {
                        debug!("Cache sweeper stopping");
                        break;
                    }
                }
            })?;

        Ok(CacheSweeper {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Handle to the background sweep thread; dropping it stops and joins the thread
pub struct CacheSweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the thread immediately
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
