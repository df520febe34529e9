//! Hierarchical cache regions over a shared store
//!
//! A region is a named cache (`"abc.xyz"`) whose entries live in one store hash.
//! Regions form a tree by name: invalidating `abc` also invalidates `abc.xyz`
//! and everything below it, in every process sharing the store.
//!
//! ## Modules
//!
//! - [`store`]: store contract with in-memory and Redis backends
//! - [`serializer`]: value codecs
//! - [`config`]: inherited region configuration
//! - [`registry`]: the [`RegionCache`] entry point
//! - [`region`]: the key/value protocol and invalidation cascade
//! - [`transaction`]: batched atomic writes
//! - [`binder`]: invalidation triggered by event sources
//!
//! ## Example
//!
//! ```
//! use region_cache_core::{RegionCache, RegionOverrides};
//! use region_cache_core::store::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> region_cache_core::Result<()> {
//! let cache = RegionCache::new(Arc::new(MemoryStore::new()));
//!
//! let users = cache
//!     .region_with("users", RegionOverrides::new().with_ttl(Duration::from_secs(300)))
//!     .await?;
//! let profiles = users.region("profiles").await?;
//! profiles.set("alice", &serde_json::json!({"age": 30})).await?;
//!
//! users.invalidate().await?;
//! assert!(!profiles.contains("alice").await?);
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod region;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod transaction;

pub use binder::{EventCallback, EventSource, Signal, signal};
#[cfg(feature = "redis-backend")]
pub use binder::{RedisChannelSource, publish_invalidation};
pub use config::{RegionConfig, RegionOverrides, SerializerChoice};
pub use error::{RegionCacheError, Result, StoreError, StoreResult};
pub use region::Region;
pub use registry::RegionCache;
pub use serializer::{JsonSerializer, MessagePackSerializer, Serializer, SerializerRegistry};
pub use store::{MemoryStore, RegionStore};
#[cfg(feature = "redis-backend")]
pub use store::RedisStore;
pub use transaction::TransactionScope;
