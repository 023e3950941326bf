//! Time-bounded response cache keyed by opaque strings.
//!
//! Expiry is checked lazily on read; there is no background sweep. At
//! capacity, [`ResponseCache::set`] first drops every already-expired entry.
//! When all entries are still live the store may temporarily exceed
//! `max_size` until entries age out - a bounded-staleness tradeoff kept in
//! place of strict LRU eviction.

// std
use std::{collections::HashMap, time::Duration};
// crates.io
use tokio::time::Instant;
// self
use crate::_prelude::*;

/// TTL and capacity settings for a [`ResponseCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOptions {
	/// Lifetime of every stored entry.
	pub ttl: Duration,
	/// Size threshold that triggers the expired-entry cleanup pass.
	pub max_size: usize,
}
impl CacheOptions {
	/// Creates options with the provided entry lifetime and capacity.
	pub fn new(ttl: Duration, max_size: usize) -> Self {
		Self { ttl, max_size }
	}
}
impl Default for CacheOptions {
	fn default() -> Self {
		Self { ttl: Duration::from_secs(300), max_size: 100 }
	}
}

/// Size snapshot reported by [`ResponseCache::stats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
	/// Entries currently stored, expired-but-unswept ones included.
	pub size: usize,
	/// Configured capacity threshold.
	pub max_size: usize,
}

struct CacheEntry<V> {
	value: V,
	expires_at: Instant,
}

/// Generic TTL-bounded associative store.
#[derive(Default)]
pub struct ResponseCache<V> {
	options: CacheOptions,
	store: Mutex<HashMap<String, CacheEntry<V>>>,
}
impl<V> ResponseCache<V>
where
	V: Clone,
{
	/// Creates an empty cache with the provided options.
	pub fn new(options: CacheOptions) -> Self {
		Self { options, store: Mutex::new(HashMap::new()) }
	}

	/// Stores `value` under `key` with expiry `now + ttl`.
	///
	/// At capacity, a cleanup pass removes all currently-expired entries
	/// before inserting.
	pub fn set(&self, key: impl Into<String>, value: V) {
		let mut store = self.store.lock();
		let now = Instant::now();

		if store.len() >= self.options.max_size {
			store.retain(|_, entry| now <= entry.expires_at);
		}

		store.insert(key.into(), CacheEntry { value, expires_at: now + self.options.ttl });
	}

	/// Returns the stored value if present and unexpired.
	///
	/// An expired entry is deleted on the spot and reported as a miss.
	pub fn get(&self, key: &str) -> Option<V> {
		let mut store = self.store.lock();

		match store.get(key) {
			Some(entry) if Instant::now() <= entry.expires_at => Some(entry.value.clone()),
			Some(_) => {
				store.remove(key);

				None
			},
			None => None,
		}
	}

	/// Returns `true` if `key` holds an unexpired value, with the same
	/// lazy-expiry semantics as [`get`](Self::get).
	pub fn has(&self, key: &str) -> bool {
		let mut store = self.store.lock();

		match store.get(key) {
			Some(entry) if Instant::now() <= entry.expires_at => true,
			Some(_) => {
				store.remove(key);

				false
			},
			None => false,
		}
	}

	/// Removes `key`, returning `true` if an entry (expired or not) existed.
	pub fn delete(&self, key: &str) -> bool {
		self.store.lock().remove(key).is_some()
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.store.lock().clear();
	}

	/// Reports the current size against the configured capacity.
	pub fn stats(&self) -> CacheStats {
		CacheStats { size: self.store.lock().len(), max_size: self.options.max_size }
	}
}
impl<V> Debug for ResponseCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResponseCache")
			.field("options", &self.options)
			.field("size", &self.store.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::time;
	// self
	use super::*;

	fn cache(ttl_ms: u64, max_size: usize) -> ResponseCache<String> {
		ResponseCache::new(CacheOptions::new(Duration::from_millis(ttl_ms), max_size))
	}

	#[tokio::test(start_paused = true)]
	async fn entries_expire_lazily_on_read() {
		let cache = cache(100, 10);

		cache.set("k", "v".to_string());

		assert_eq!(cache.get("k"), Some("v".to_string()));

		time::advance(Duration::from_millis(150)).await;

		assert_eq!(cache.get("k"), None);
		assert!(!cache.has("k"));
		// The expired entry was deleted by the read.
		assert_eq!(cache.stats().size, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn capacity_cleanup_removes_only_expired_entries() {
		let cache = cache(100, 2);

		cache.set("a", "1".to_string());

		time::advance(Duration::from_millis(150)).await;

		cache.set("b", "2".to_string());
		// At capacity: the pass drops the expired `a` before inserting.
		cache.set("c", "3".to_string());

		assert!(!cache.has("a"));
		assert!(cache.has("b"));
		assert!(cache.has("c"));
		assert_eq!(cache.stats().size, 2);
	}

	#[tokio::test(start_paused = true)]
	async fn live_entries_survive_the_capacity_pass() {
		let cache = cache(1_000, 2);

		cache.set("a", "1".to_string());
		cache.set("b", "2".to_string());
		// Nothing is expired, so the store grows past the soft capacity.
		cache.set("c", "3".to_string());

		assert_eq!(cache.stats().size, 3);
		assert!(cache.has("a"));
	}

	#[tokio::test(start_paused = true)]
	async fn delete_and_clear_behave_as_named() {
		let cache = cache(1_000, 10);

		cache.set("a", "1".to_string());

		assert!(cache.delete("a"));
		assert!(!cache.delete("a"));

		cache.set("b", "2".to_string());
		cache.clear();

		assert_eq!(cache.stats().size, 0);
	}
}
