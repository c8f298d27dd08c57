//! Response cache keyed by request fingerprint
//!
//! Least-recently-used with two capacity bounds (entry count and total size
//! estimate) plus an optional maximum age. Entries are immutable `Arc`s, so a
//! reader racing a writer sees either the old entry or the new one.

use std::{
  collections::{BTreeMap, HashMap},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::{Duration, Instant},
};

use lens_core::{RawResponse, RequestKey, config::CacheConfig};
use tracing::{debug, trace};

/// A stored response and its bookkeeping
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub key: RequestKey,
  pub response: RawResponse,
  pub inserted_at: Instant,
  pub size: usize,
}

impl CachedResponse {
  fn is_expired(&self, max_age: Option<Duration>, now: Instant) -> bool {
    max_age.is_some_and(|age| now.duration_since(self.inserted_at) > age)
  }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: usize,
  pub bytes: usize,
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
}

struct Slot {
  entry: Arc<CachedResponse>,
  tick: u64,
}

#[derive(Default)]
struct Inner {
  slots: HashMap<RequestKey, Slot>,
  /// Recency order: lowest tick is least recently used
  recency: BTreeMap<u64, RequestKey>,
  tick: u64,
  bytes: usize,
  hits: u64,
  misses: u64,
  evictions: u64,
}

impl Inner {
  fn next_tick(&mut self) -> u64 {
    self.tick += 1;
    self.tick
  }

  fn touch(&mut self, key: &RequestKey) {
    let tick = self.next_tick();
    if let Some(slot) = self.slots.get_mut(key) {
      self.recency.remove(&slot.tick);
      slot.tick = tick;
      self.recency.insert(tick, *key);
    }
  }

  fn remove(&mut self, key: &RequestKey) -> Option<Arc<CachedResponse>> {
    let slot = self.slots.remove(key)?;
    self.recency.remove(&slot.tick);
    self.bytes -= slot.entry.size;
    Some(slot.entry)
  }

  fn pop_lru(&mut self) -> Option<Arc<CachedResponse>> {
    let (_, key) = self.recency.pop_first()?;
    let slot = self.slots.remove(&key)?;
    self.bytes -= slot.entry.size;
    Some(slot.entry)
  }
}

/// Bounded LRU cache of raw responses.
///
/// All state sits behind one `std::sync::Mutex`; no method awaits, so the
/// guard is never held across a suspension point.
pub struct ResponseCache {
  inner: Mutex<Inner>,
  max_entries: usize,
  max_bytes: usize,
  max_age: Option<Duration>,
}

impl ResponseCache {
  pub fn new(max_entries: usize, max_bytes: usize, max_age: Option<Duration>) -> Self {
    Self {
      inner: Mutex::new(Inner::default()),
      max_entries,
      max_bytes,
      max_age,
    }
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new(config.max_entries, config.max_bytes, config.max_age())
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // Every mutation leaves the maps consistent before it can panic
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Look up a response, marking it most recently used.
  ///
  /// An entry older than the maximum age is dropped and reported as a miss.
  pub fn get(&self, key: &RequestKey) -> Option<Arc<CachedResponse>> {
    let now = Instant::now();
    let mut inner = self.lock();

    let Some(entry) = inner.slots.get(key).map(|slot| slot.entry.clone()) else {
      inner.misses += 1;
      return None;
    };

    if entry.is_expired(self.max_age, now) {
      inner.remove(key);
      inner.evictions += 1;
      inner.misses += 1;
      trace!(key = %key.short(), "Cache entry expired");
      return None;
    }

    inner.touch(key);
    inner.hits += 1;
    Some(entry)
  }

  /// Store a response, evicting least-recently-used entries until both
  /// bounds hold again. A response larger than the byte bound is not cached.
  pub fn put(&self, key: RequestKey, response: RawResponse) {
    let size = response.size_estimate();
    if self.max_entries == 0 || size > self.max_bytes {
      debug!(key = %key.short(), size, max_bytes = self.max_bytes, "Response not cacheable");
      return;
    }

    let entry = Arc::new(CachedResponse {
      key,
      response,
      inserted_at: Instant::now(),
      size,
    });

    let mut inner = self.lock();
    inner.remove(&key);
    let tick = inner.next_tick();
    inner.recency.insert(tick, key);
    inner.bytes += size;
    inner.slots.insert(key, Slot { entry, tick });

    let evicted = self.enforce_bounds(&mut inner);
    trace!(key = %key.short(), size, evicted, entries = inner.slots.len(), "Cached response");
  }

  /// Drop expired entries and re-apply both bounds. Returns the number removed.
  pub fn evict(&self) -> usize {
    let now = Instant::now();
    let mut inner = self.lock();

    let expired: Vec<RequestKey> = inner
      .slots
      .iter()
      .filter(|(_, slot)| slot.entry.is_expired(self.max_age, now))
      .map(|(key, _)| *key)
      .collect();
    for key in &expired {
      inner.remove(key);
    }
    inner.evictions += expired.len() as u64;

    let removed = expired.len() + self.enforce_bounds(&mut inner);
    if removed > 0 {
      debug!(removed, entries = inner.slots.len(), "Evicted cache entries");
    }
    removed
  }

  pub fn remove(&self, key: &RequestKey) -> bool {
    self.lock().remove(key).is_some()
  }

  pub fn clear(&self) {
    let mut inner = self.lock();
    inner.slots.clear();
    inner.recency.clear();
    inner.bytes = 0;
  }

  pub fn len(&self) -> usize {
    self.lock().slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn stats(&self) -> CacheStats {
    let inner = self.lock();
    CacheStats {
      entries: inner.slots.len(),
      bytes: inner.bytes,
      hits: inner.hits,
      misses: inner.misses,
      evictions: inner.evictions,
    }
  }

  fn enforce_bounds(&self, inner: &mut Inner) -> usize {
    let mut removed = 0;
    while inner.slots.len() > self.max_entries || inner.bytes > self.max_bytes {
      match inner.pop_lru() {
        Some(entry) => {
          trace!(key = %entry.key.short(), size = entry.size, "Evicted least recently used entry");
          removed += 1;
        }
        None => break,
      }
    }
    inner.evictions += removed as u64;
    removed
  }
}

impl Default for ResponseCache {
  fn default() -> Self {
    Self::from_config(&CacheConfig::default())
  }
}
