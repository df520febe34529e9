//! rstest fixtures

use crate::faulty::FaultyStore;
use region_cache_core::RegionCache;
use region_cache_core::store::MemoryStore;
use rstest::*;
use std::sync::Arc;

#[cfg(feature = "testcontainers")]
pub mod testcontainers;

#[cfg(feature = "testcontainers")]
pub use self::testcontainers::{redis_container, redis_region_cache, redis_store};

/// Fresh in-memory store
#[fixture]
pub fn memory_store() -> MemoryStore {
	MemoryStore::new()
}

/// Region cache over a fresh in-memory store
#[fixture]
pub fn region_cache(memory_store: MemoryStore) -> RegionCache {
	RegionCache::new(Arc::new(memory_store))
}

/// Two independent region caches sharing one store, standing in for two
/// processes attached to the same server
///
/// The store is returned as well so tests can inspect raw keys.
#[fixture]
pub fn shared_store_caches(memory_store: MemoryStore) -> (RegionCache, RegionCache, MemoryStore) {
	let first = RegionCache::new(Arc::new(memory_store.clone()));
	let second = RegionCache::new(Arc::new(memory_store.clone()));
	(first, second, memory_store)
}

/// Fault-injecting store and a region cache built on it
#[fixture]
pub fn faulty_cache(memory_store: MemoryStore) -> (RegionCache, Arc<FaultyStore>) {
	let store = Arc::new(FaultyStore::new(memory_store));
	let cache = RegionCache::new(store.clone());
	(cache, store)
}
