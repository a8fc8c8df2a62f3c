//! The shared LRU response cache (component A).
//!
//! Entries are addressed by the verbatim bytes of the client request, not by
//! a derived URL or a hash of one: two requests that differ only in header
//! order or casing miss each other. This mirrors the original proxy's
//! `strcmp(site->url, url)` lookup and is a deliberate choice, not an
//! oversight.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Total bytes the cache may hold across all entries.
pub const MAX_TOTAL_CACHE_BYTES: usize = 200 * 1024 * 1024;
/// Largest single entry the cache will store.
pub const MAX_ENTRY_BYTES: usize = 10 * 1024 * 1024;
/// Fixed per-entry bookkeeping overhead charged against the byte budget.
pub const ENTRY_OVERHEAD: usize = 64;
/// Defensive entry-count ceiling; the byte budget above is the operative
/// limit in practice.
const CACHE_CAPACITY_ENTRIES: usize = 1_000_000;

/// A single cached response: the verbatim bytes relayed from upstream, plus
/// bookkeeping used for eviction accounting. Recency itself is tracked by
/// `lru::LruCache`'s internal ordering, not a field here — `get_mut`/`put`
/// already promote an entry to most-recently-used, and `pop_lru` already
/// evicts the globally least-recently-used one, so a parallel
/// last-accessed timestamp on the entry would just be state nothing reads.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub body: Bytes,
    pub size_charge: usize,
}

impl CacheEntry {
    fn new(key_len: usize, body: Bytes) -> Self {
        let size_charge = body.len() + key_len + ENTRY_OVERHEAD;
        Self { body, size_charge }
    }
}

/// Outcome of an `insert` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored,
    TooLarge,
}

/// The shared, mutex-protected LRU cache. Cheaply `Clone`-able; every clone
/// refers to the same underlying store.
#[derive(Clone)]
pub struct ProxyCache {
    entries: Arc<Mutex<LruCache<Bytes, CacheEntry>>>,
    total_size: Arc<AtomicUsize>,
}

impl ProxyCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY_ENTRIES).expect("capacity must be non-zero"),
            ))),
            total_size: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Looks up `key`, promoting the entry to most-recently-used on a hit.
    pub async fn find(&self, key: &[u8]) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        let hit = entries.get_mut(key)?;
        Some(hit.body.clone())
    }

    /// Inserts `(key, body)`, evicting least-recently-used entries until the
    /// new entry fits within `MAX_TOTAL_CACHE_BYTES`.
    pub async fn insert(&self, key: Bytes, body: Bytes) -> InsertOutcome {
        let entry = CacheEntry::new(key.len(), body);
        if entry.size_charge > MAX_ENTRY_BYTES {
            return InsertOutcome::TooLarge;
        }

        let mut entries = self.entries.lock().await;

        if let Some(old) = entries.pop(&key) {
            self.total_size.fetch_sub(old.size_charge, Ordering::Relaxed);
        }

        while self.total_size.load(Ordering::Relaxed) + entry.size_charge > MAX_TOTAL_CACHE_BYTES
            && !entries.is_empty()
        {
            self.evict_one_locked(&mut entries);
        }

        self.total_size.fetch_add(entry.size_charge, Ordering::Relaxed);
        entries.put(key, entry);
        InsertOutcome::Stored
    }

    /// Removes the globally least-recently-used entry. No-op if empty.
    fn evict_one_locked(&self, entries: &mut LruCache<Bytes, CacheEntry>) {
        if let Some((_, evicted)) = entries.pop_lru() {
            self.total_size.fetch_sub(evicted.size_charge, Ordering::Relaxed);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total_size.load(Ordering::Relaxed)
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.total_size.store(0, Ordering::Relaxed);
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new()
    }
}
