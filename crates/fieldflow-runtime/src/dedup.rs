//! In-flight request deduplication.
//!
//! Concurrent requests with the same key share one underlying future. The
//! map only holds weak handles to in-flight work: an entry is removed as
//! soon as its future settles, and a future whose waiters have all gone away
//! is dropped (aborting the transport) instead of being kept alive here.
//! Settled results live in the options store, not in this cache.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};

/// A deduplicated fetch. Clone it to wait on the same result.
pub type SharedFetch<T> = Shared<BoxFuture<'static, T>>;

struct Entry<T> {
  id: u64,
  handle: WeakShared<BoxFuture<'static, T>>,
}

struct Inner<K, T> {
  entries: HashMap<K, Entry<T>>,
  next_id: u64,
}

impl<K, T> Inner<K, T> {
  fn prune(&mut self) {
    self.entries.retain(|_, e| e.handle.upgrade().is_some());
  }
}

/// Map of in-flight requests keyed by `K`, each yielding a `T`.
pub struct Deduplicator<K, T> {
  inner: Arc<Mutex<Inner<K, T>>>,
}

impl<K, T> Clone for Deduplicator<K, T> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<K, T> Default for Deduplicator<K, T>
where
  K: Eq + Hash + Clone + Send + 'static,
  T: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, T> Deduplicator<K, T>
where
  K: Eq + Hash + Clone + Send + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        entries: HashMap::new(),
        next_id: 0,
      })),
    }
  }

  /// Join the in-flight request for `key`, or start one with `producer`.
  ///
  /// `producer` is only called when nothing for `key` is in flight.
  pub fn acquire<F, Fut>(&self, key: K, producer: F) -> SharedFetch<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T> + Send + 'static,
  {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(handle) = inner.entries.get(&key).and_then(|e| e.handle.upgrade()) {
      return handle;
    }

    // Abandoned futures never settle, so their entries are pruned here.
    inner.prune();

    let id = inner.next_id;
    inner.next_id += 1;

    let fetch = producer();
    let registry: Weak<Mutex<Inner<K, T>>> = Arc::downgrade(&self.inner);
    let settled_key = key.clone();

    let shared = async move {
      let output = fetch.await;
      if let Some(registry) = registry.upgrade() {
        let mut inner = registry.lock().unwrap_or_else(|e| e.into_inner());
        if inner.entries.get(&settled_key).is_some_and(|e| e.id == id) {
          inner.entries.remove(&settled_key);
        }
      }
      output
    }
    .boxed()
    .shared();

    if let Some(handle) = shared.downgrade() {
      inner.entries.insert(key, Entry { id, handle });
    }

    shared
  }

  /// Whether a live request for `key` is in flight.
  pub fn contains(&self, key: &K) -> bool {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.prune();
    inner.entries.contains_key(key)
  }

  /// Number of live in-flight requests.
  pub fn in_flight(&self) -> usize {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.prune();
    inner.entries.len()
  }

  #[cfg(test)]
  fn stored(&self) -> usize {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.entries.len()
  }

  /// Forget the in-flight request for `key` so the next `acquire` starts a
  /// new one. Current waiters keep their handle.
  pub fn evict(&self, key: &K) -> bool {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.entries.remove(key).is_some()
  }

  /// Drop every entry.
  pub fn clear(&self) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.entries.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tokio::sync::oneshot;

  #[tokio::test]
  async fn test_identical_keys_share_one_fetch() {
    let dedup: Deduplicator<String, Result<u32, String>> = Deduplicator::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<u32>();
    let mut rx = Some(rx);

    let mut handles = Vec::new();
    for _ in 0..5 {
      let calls = calls.clone();
      let rx = rx.take();
      handles.push(dedup.acquire("channels:S1".to_string(), move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let rx = rx.expect("producer called more than once");
        async move { rx.await.map_err(|e| e.to_string()) }
      }));
    }

    assert_eq!(dedup.in_flight(), 1);
    tx.send(7).unwrap();

    let results = futures::future::join_all(handles).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == &Ok(7)));
  }

  #[tokio::test]
  async fn test_entry_removed_once_settled() {
    let dedup: Deduplicator<&'static str, Result<u32, String>> = Deduplicator::new();

    let first = dedup.acquire("k", || async { Err("boom".to_string()) });
    assert!(dedup.contains(&"k"));
    assert_eq!(first.await, Err("boom".to_string()));
    assert!(!dedup.contains(&"k"));

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let second = dedup.acquire("k", move || {
      counted.fetch_add(1, Ordering::SeqCst);
      async { Ok(1) }
    });
    assert_eq!(second.await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_abandoned_fetch_is_dropped() {
    let dedup: Deduplicator<&'static str, u32> = Deduplicator::new();
    let (tx, rx) = oneshot::channel::<u32>();

    let handle = dedup.acquire("k", move || async move { rx.await.unwrap_or(0) });
    drop(handle);

    // The producer's future is gone, so its receiver was dropped too.
    assert!(tx.is_closed());
    assert!(!dedup.contains(&"k"));

    let again = dedup.acquire("k", || async { 9 });
    assert_eq!(again.await, 9);
  }

  #[tokio::test]
  async fn test_abandoned_entries_do_not_accumulate() {
    let dedup: Deduplicator<u32, u32> = Deduplicator::new();
    let mut senders = Vec::new();

    for key in 0..100 {
      let (tx, rx) = oneshot::channel::<u32>();
      senders.push(tx);
      let handle = dedup.acquire(key, move || async move { rx.await.unwrap_or(0) });
      drop(handle);
    }

    // Only the most recent abandoned entry can still be stored.
    assert!(dedup.stored() <= 1);
    assert_eq!(dedup.in_flight(), 0);
    assert_eq!(dedup.stored(), 0);
    assert!(senders.iter().all(|tx| tx.is_closed()));
  }

  #[tokio::test]
  async fn test_evict_starts_new_fetch() {
    let dedup: Deduplicator<&'static str, u32> = Deduplicator::new();
    let (tx, rx) = oneshot::channel::<u32>();

    let old = dedup.acquire("k", move || async move { rx.await.unwrap_or(0) });
    assert!(dedup.evict(&"k"));

    let fresh = dedup.acquire("k", || async { 2 });
    assert_eq!(fresh.await, 2);

    // The evicted fetch settles without disturbing the map.
    tx.send(1).unwrap();
    assert_eq!(old.await, 1);
    assert_eq!(dedup.in_flight(), 0);
  }
}
