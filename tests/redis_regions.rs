//! Redis-backed integration tests
//!
//! Run against a Redis 7 container started through testcontainers:
//!
//! ```bash
//! cargo test --features redis-backend,testcontainers --test redis_regions
//! ```

#![cfg(all(feature = "redis-backend", feature = "testcontainers"))]

use region_cache::conf::RegionCacheSettings;
use region_cache::store::{RedisStore, RegionStore, children_key};
use region_cache::test::fixtures::testcontainers::{ContainerAsync, GenericImage};
use region_cache::test::{redis_container, redis_region_cache, redis_store};
use region_cache::{
	RedisChannelSource, RegionCache, RegionCacheError, RegionOverrides, publish_invalidation,
};
use rstest::*;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_roundtrip_and_miss(
	#[future] redis_region_cache: (ContainerAsync<GenericImage>, RegionCache, String),
) {
	// Arrange
	let (_container, cache, _url) = redis_region_cache.await;
	let region = cache.region("abc.xyz").await.unwrap();

	// Act
	region.set("k", &serde_json::json!({"n": 1})).await.unwrap();
	region.set("null", &Option::<i32>::None).await.unwrap();

	// Assert
	assert_eq!(
		region.get::<serde_json::Value>("k").await.unwrap(),
		Some(serde_json::json!({"n": 1}))
	);
	assert_eq!(region.get::<Option<i32>>("null").await.unwrap(), Some(None));
	assert_eq!(region.get::<Option<i32>>("absent").await.unwrap(), None);
	assert_eq!(region.len().await.unwrap(), 2);
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_cascade_across_processes(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore, String),
) {
	// Arrange: two caches with their own pools, like two processes
	let (_container, store, url) = redis_store.await;
	let first = RegionCache::new(Arc::new(store));
	let second = RegionCache::new(Arc::new(RedisStore::new(url).unwrap()));
	let leaf = second.region("a.b.c").await.unwrap();
	leaf.set("k", &1).await.unwrap();

	// Act
	first.region("a").await.unwrap().invalidate().await.unwrap();

	// Assert
	assert!(!leaf.contains("k").await.unwrap());
	let children = first
		.store()
		.set_members(&children_key("", "a.b"))
		.await
		.unwrap();
	assert!(children.contains("a.b.c"));
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_transaction_uses_multi_exec(
	#[future] redis_region_cache: (ContainerAsync<GenericImage>, RegionCache, String),
) {
	let (_container, cache, _url) = redis_region_cache.await;
	let region = cache
		.region_with("tx", RegionOverrides::new().with_ttl(Duration::from_secs(30)))
		.await
		.unwrap();

	region
		.transaction(|tx| async move {
			tx.set("a", &1)?;
			tx.set("b", &2)?;
			tx.delete("missing");
			Ok(())
		})
		.await
		.unwrap();

	assert_eq!(region.keys().await.unwrap(), vec!["a", "b"]);
	let ttl = region.ttl().await.unwrap().unwrap();
	assert!(ttl > Duration::from_secs(20));
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_expire_if_unset_keeps_first_timeout(
	#[future] redis_region_cache: (ContainerAsync<GenericImage>, RegionCache, String),
) {
	// Arrange
	let (_container, cache, _url) = redis_region_cache.await;
	let region = cache
		.region_with(
			"fixed",
			RegionOverrides::new()
				.with_ttl(Duration::from_secs(2))
				.refresh_on_write(false),
		)
		.await
		.unwrap();
	region.set("a", &1).await.unwrap();

	// Act
	tokio::time::sleep(Duration::from_millis(1200)).await;
	region.set("b", &2).await.unwrap();

	// Assert: the second write did not restart the countdown
	let remaining = region.ttl().await.unwrap().unwrap();
	assert!(remaining <= Duration::from_millis(900));
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_wrong_key_type_is_store_error(
	#[future] redis_region_cache: (ContainerAsync<GenericImage>, RegionCache, String),
) {
	let (_container, cache, _url) = redis_region_cache.await;
	cache.store().set_add("clash", "member").await.unwrap();
	let region = cache.region("clash").await.unwrap();

	let result = region.get::<i32>("k").await;

	assert!(matches!(result, Err(RegionCacheError::Store { .. })));
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_channel_event_invalidates_in_every_process(
	#[future] redis_region_cache: (ContainerAsync<GenericImage>, RegionCache, String),
) {
	// Arrange
	let (_container, cache, url) = redis_region_cache.await;
	let region = cache.region("catalog").await.unwrap();
	region.set("sku", &"X-1").await.unwrap();
	let source = RedisChannelSource::subscribe(&url, "catalog:changed")
		.await
		.unwrap();
	region.invalidate_on(&[&source]);

	// Act
	let receivers = publish_invalidation(&url, "catalog:changed").await.unwrap();

	// Assert
	assert_eq!(receivers, 1);
	let mut cleared = false;
	for _ in 0..50 {
		if !region.contains("sku").await.unwrap() {
			cleared = true;
			break;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	assert!(cleared, "channel message should invalidate the region");
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_from_settings(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) {
	let (_container, _port, url) = redis_container.await;
	let settings = RegionCacheSettings::default()
		.with_redis_url(url)
		.with_namespace("app:")
		.with_serializer("msgpack");

	let cache = RegionCache::from_settings(&settings).unwrap();
	let region = cache.region("sessions").await.unwrap();
	region.set("token", &"abc").await.unwrap();

	assert_eq!(region.storage_key(), "app:sessions");
	assert_eq!(region.config().serializer.name(), "msgpack");
	assert!(cache.store().hash_exists("app:sessions", "token").await.unwrap());
	assert_eq!(cache.root_regions().await.unwrap(), vec!["sessions"]);
}
