//! # region-cache
//!
//! Hierarchical cache regions on a shared Redis store, with active invalidation
//! that every process observes.
//!
//! Regions are addressed by dotted name. `users.profiles` is a child of `users`,
//! inherits its configuration, and is wiped whenever `users` is invalidated,
//! whichever process referenced it.
//!
//! ## Feature Flags
//!
//! - `redis-backend` - Redis store, [`RedisChannelSource`] and
//!   [`RegionCache::from_settings`]
//! - `test` - fixtures under [`test`]
//! - `testcontainers` - Redis container fixtures (implies `test`)
//! - `full` - everything above except `testcontainers`
//!
//! ## Quick Start
//!
//! ```
//! use region_cache::{RegionCache, RegionOverrides, Signal};
//! use region_cache::store::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> region_cache::Result<()> {
//! let cache = RegionCache::new(Arc::new(MemoryStore::new()));
//!
//! let users = cache
//!     .region_with("users", RegionOverrides::new().with_ttl(Duration::from_secs(600)))
//!     .await?;
//! let profiles = users.region("profiles").await?;
//!
//! let user_saved = Signal::new("user_saved");
//! users.invalidate_on(&[&user_saved]);
//!
//! profiles
//!     .transaction(|tx| async move {
//!         tx.set("alice", &30)?;
//!         tx.set("bob", &41)?;
//!         Ok(())
//!     })
//!     .await?;
//!
//! user_saved.send().await;
//! assert!(profiles.is_empty().await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! With `redis-backend`, a cache can be built straight from the environment:
//!
//! ```no_run
//! # #[cfg(feature = "redis-backend")]
//! # async fn example() -> region_cache::Result<()> {
//! use region_cache::RegionCache;
//! use region_cache::conf::RegionCacheSettings;
//!
//! // CACHE_REDIS_URL=redis://localhost:6379/5
//! let settings = RegionCacheSettings::from_env()?;
//! let cache = RegionCache::from_settings(&settings)?;
//! # Ok(())
//! # }
//! ```

pub use region_cache_core::{
	EventCallback, EventSource, JsonSerializer, MessagePackSerializer, Region, RegionCache,
	RegionCacheError, RegionConfig, RegionOverrides, Result, Serializer, SerializerChoice,
	SerializerRegistry, Signal, StoreError, StoreResult, TransactionScope, signal,
};

#[cfg(feature = "redis-backend")]
pub use region_cache_core::{RedisChannelSource, RedisStore, publish_invalidation};

pub use region_cache_core::{binder, serializer, store};

/// Settings loading and validation
pub mod conf {
	pub use region_cache_conf::*;
}

/// Fixtures and fault injection for tests
#[cfg(feature = "test")]
pub mod test {
	pub use region_cache_test::*;
}
