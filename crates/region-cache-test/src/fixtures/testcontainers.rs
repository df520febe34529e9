//! Redis container fixtures

use region_cache_core::RegionCache;
use region_cache_core::store::{RedisStore, RegionStore};
use rstest::*;
use std::sync::Arc;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

pub use testcontainers::{ContainerAsync, GenericImage};

/// Fixture providing a Redis 7 container
///
/// Returns the container guard, the mapped host port and a connection URL.
///
/// ```ignore
/// #[rstest]
/// #[tokio::test]
/// async fn test_with_redis(
///     #[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
/// ) {
///     let (_container, _port, url) = redis_container.await;
/// }
/// ```
#[fixture]
pub async fn redis_container() -> (ContainerAsync<GenericImage>, u16, String) {
	const MAX_RETRIES: u32 = 3;
	const RETRY_DELAY_MS: u64 = 2000;

	let mut last_error = None;

	for attempt in 0..MAX_RETRIES {
		match try_start_redis_container().await {
			Ok(result) => return result,
			Err(e) => {
				tracing::warn!(
					attempt = attempt + 1,
					max = MAX_RETRIES,
					error = %e,
					"Redis container failed to start"
				);
				last_error = Some(e);

				if attempt < MAX_RETRIES - 1 {
					tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
				}
			}
		}
	}

	panic!(
		"Failed to start Redis container after {} attempts: {:?}",
		MAX_RETRIES, last_error
	);
}

async fn try_start_redis_container()
-> Result<(ContainerAsync<GenericImage>, u16, String), Box<dyn std::error::Error>> {
	let redis = GenericImage::new("redis", "7-alpine")
		.with_exposed_port(6379.tcp())
		.with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
		.start()
		.await?;

	let port = redis.get_host_port_ipv4(6379).await?;
	let url = format!("redis://localhost:{}", port);

	Ok((redis, port, url))
}

/// Redis store connected to a fresh container
///
/// The container guard must be kept alive for as long as the store is used.
#[fixture]
pub async fn redis_store(
	#[future] redis_container: (ContainerAsync<GenericImage>, u16, String),
) -> (ContainerAsync<GenericImage>, RedisStore, String) {
	let (container, _port, url) = redis_container.await;
	let store = RedisStore::new(url.clone()).expect("Failed to create Redis pool");
	store.ping().await.expect("Redis did not answer PING");
	(container, store, url)
}

/// Region cache over a Redis store in a fresh container
#[fixture]
pub async fn redis_region_cache(
	#[future] redis_store: (ContainerAsync<GenericImage>, RedisStore, String),
) -> (ContainerAsync<GenericImage>, RegionCache, String) {
	let (container, store, url) = redis_store.await;
	(container, RegionCache::new(Arc::new(store)), url)
}
