//! Process-local region registry
//!
//! [`RegionCache`] hands out one [`Region`] handle per dotted name. A region's
//! resolved configuration is kept for the life of the cache; the handle itself
//! is tracked weakly and rebuilt around that configuration on the next lookup.

use crate::config::{RegionConfig, RegionOverrides};
use crate::error::{RegionCacheError, Result};
use crate::region::{Region, RegionInner};
use crate::serializer::{Serializer, SerializerRegistry};
use crate::store::{RegionStore, StoreCommand, children_key, roots_key};
use parking_lot::RwLock;
use region_cache_conf::RegionCacheSettings;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

struct RegionEntry {
	handle: Weak<RegionInner>,
	config: Arc<RwLock<RegionConfig>>,
}

impl RegionEntry {
	fn upgrade(&self) -> Option<Region> {
		self.handle.upgrade().map(Region::from_inner)
	}
}

pub(crate) struct CacheInner {
	store: Arc<dyn RegionStore>,
	defaults: RegionConfig,
	serializers: SerializerRegistry,
	regions: RwLock<HashMap<String, RegionEntry>>,
}

/// Entry point to a tree of regions sharing one store
///
/// Cloning is cheap and every clone shares the same registry. Two `RegionCache`
/// values built independently over the same store behave like two processes.
///
/// # Examples
///
/// ```
/// use region_cache_core::RegionCache;
/// use region_cache_core::store::MemoryStore;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> region_cache_core::Result<()> {
/// let cache = RegionCache::new(Arc::new(MemoryStore::new()));
///
/// let region = cache.region("abc.xyz").await?;
/// region.set("answer", &42).await?;
/// assert_eq!(region.get::<i32>("answer").await?, Some(42));
///
/// cache.region("abc").await?.invalidate().await?;
/// assert_eq!(region.get::<i32>("answer").await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RegionCache {
	inner: Arc<CacheInner>,
}

impl fmt::Debug for RegionCache {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegionCache")
			.field("namespace", &self.inner.defaults.namespace)
			.field("regions", &self.local_regions())
			.finish()
	}
}

impl RegionCache {
	/// Create a cache with default configuration
	pub fn new(store: Arc<dyn RegionStore>) -> Self {
		Self::with_config(store, RegionConfig::default())
	}

	/// Create a cache whose root regions resolve from `defaults`
	pub fn with_config(store: Arc<dyn RegionStore>, defaults: RegionConfig) -> Self {
		Self {
			inner: Arc::new(CacheInner {
				store,
				defaults,
				serializers: SerializerRegistry::new(),
				regions: RwLock::new(HashMap::new()),
			}),
		}
	}

	/// Create a cache over `store` configured from settings
	pub fn with_settings(
		store: Arc<dyn RegionStore>,
		settings: &RegionCacheSettings,
	) -> Result<Self> {
		let serializers = SerializerRegistry::new();
		let defaults = RegionConfig::from_settings(settings, &serializers)?;

		Ok(Self {
			inner: Arc::new(CacheInner {
				store,
				defaults,
				serializers,
				regions: RwLock::new(HashMap::new()),
			}),
		})
	}

	/// Create a Redis-backed cache from settings
	///
	/// `settings.redis_url` must be set, usually from `CACHE_REDIS_URL`.
	///
	/// # Examples
	///
	/// ```no_run
	/// use region_cache_conf::RegionCacheSettings;
	/// use region_cache_core::RegionCache;
	///
	/// # async fn example() -> region_cache_core::Result<()> {
	/// let settings = RegionCacheSettings::from_env()?;
	/// let cache = RegionCache::from_settings(&settings)?;
	/// let region = cache.region("sessions").await?;
	/// # Ok(())
	/// # }
	/// ```
	#[cfg(feature = "redis-backend")]
	pub fn from_settings(settings: &RegionCacheSettings) -> Result<Self> {
		settings.validate()?;
		let store = crate::store::RedisStore::from_settings(settings)
			.map_err(|e| e.in_region("", "connect"))?;
		Self::with_settings(Arc::new(store), settings)
	}

	/// Make a custom serializer available to [`RegionOverrides::serializer`]
	pub fn register_serializer(&self, serializer: Arc<dyn Serializer>) {
		self.inner.serializers.register(serializer);
	}

	pub fn serializers(&self) -> &SerializerRegistry {
		&self.inner.serializers
	}

	pub fn store(&self) -> &Arc<dyn RegionStore> {
		&self.inner.store
	}

	/// Configuration root regions inherit
	pub fn defaults(&self) -> &RegionConfig {
		&self.inner.defaults
	}

	pub fn namespace(&self) -> &str {
		&self.inner.defaults.namespace
	}

	/// Get or create the region called `name`, creating missing ancestors
	pub async fn region(&self, name: &str) -> Result<Region> {
		self.region_with(name, RegionOverrides::default()).await
	}

	/// Get or create the region called `name` with explicit configuration
	///
	/// Overrides only apply when the handle is created; an existing handle is
	/// returned unchanged.
	pub async fn region_with(&self, name: &str, overrides: RegionOverrides) -> Result<Region> {
		validate_name(name)?;

		if let Some(region) = self.lookup(name) {
			if !overrides.is_empty() {
				tracing::debug!(
					region = %name,
					"Region already exists; ignoring configuration overrides"
				);
			}
			if region.is_linked() {
				return Ok(region);
			}
		}

		let chain = self.resolve_chain(name, &overrides)?;
		self.link(&chain).await?;

		chain.into_iter().next_back().ok_or_else(|| {
			RegionCacheError::Configuration(format!("region name '{}' has no segments", name))
		})
	}

	/// Names of the top-level regions recorded in the store
	pub async fn root_regions(&self) -> Result<Vec<String>> {
		let mut roots: Vec<String> = self
			.inner
			.store
			.set_members(&roots_key(self.namespace()))
			.await
			.map_err(|e| e.in_region("", "root_regions"))?
			.into_iter()
			.collect();
		roots.sort();
		Ok(roots)
	}

	/// Invalidate every region tree under this namespace
	pub async fn clear(&self) -> Result<()> {
		for root in self.root_regions().await? {
			self.region(&root).await?.invalidate().await?;
		}
		tracing::debug!(namespace = %self.namespace(), "Cleared all regions");
		Ok(())
	}

	/// Names of the regions resolved in this process, sorted
	pub fn local_regions(&self) -> Vec<String> {
		let mut names: Vec<String> = self.inner.regions.read().keys().cloned().collect();
		names.sort();
		names
	}

	fn lookup(&self, name: &str) -> Option<Region> {
		self.inner
			.regions
			.read()
			.get(name)
			.and_then(RegionEntry::upgrade)
	}

	/// Handle for an already-validated name, without linking it in the store
	pub(crate) fn resolve(&self, name: &str) -> Result<Region> {
		if let Some(region) = self.lookup(name) {
			return Ok(region);
		}
		self.resolve_chain(name, &RegionOverrides::default())?
			.into_iter()
			.next_back()
			.ok_or_else(|| {
				RegionCacheError::Configuration(format!("region name '{}' has no segments", name))
			})
	}

	/// Look up or create every region from the root down to `name`
	fn resolve_chain(&self, name: &str, overrides: &RegionOverrides) -> Result<Vec<Region>> {
		let mut regions = self.inner.regions.write();

		let mut chain: Vec<Region> = Vec::new();
		for prefix in prefixes(name) {
			let is_target = prefix.len() == name.len();

			if let Some(region) = regions.get(prefix).and_then(RegionEntry::upgrade) {
				chain.push(region);
				continue;
			}

			let config = match regions.get(prefix) {
				Some(entry) => {
					if is_target && !overrides.is_empty() {
						tracing::debug!(
							region = %prefix,
							"Region already resolved; ignoring configuration overrides"
						);
					}
					Arc::clone(&entry.config)
				}
				None => {
					let base = match chain.last() {
						Some(parent) => parent.config(),
						None => self.inner.defaults.clone(),
					};
					let resolved = if is_target {
						base.merge(overrides, &self.inner.serializers)?
					} else {
						base
					};
					Arc::new(RwLock::new(resolved))
				}
			};

			let region = Region::new(self.clone(), prefix.to_string(), Arc::clone(&config));
			regions.insert(
				prefix.to_string(),
				RegionEntry {
					handle: region.downgrade(),
					config,
				},
			);
			tracing::debug!(region = %prefix, "Created region handle");
			chain.push(region);
		}

		Ok(chain)
	}

	/// Record unlinked regions in their parent's children set, or in the roots set
	async fn link(&self, chain: &[Region]) -> Result<()> {
		let pending: Vec<&Region> = chain.iter().filter(|region| !region.is_linked()).collect();
		if pending.is_empty() {
			return Ok(());
		}

		let namespace = self.namespace();
		let commands = pending
			.iter()
			.map(|region| StoreCommand::SetAdd {
				key: match region.parent_name() {
					Some(parent) => children_key(namespace, parent),
					None => roots_key(namespace),
				},
				member: region.name().to_string(),
			})
			.collect();

		let target = chain.last().map(Region::name).unwrap_or_default();
		self.inner
			.store
			.execute_atomic(commands)
			.await
			.map_err(|e| e.in_region(target, "link"))?;

		for region in pending {
			region.mark_linked();
		}
		Ok(())
	}
}

/// Every dotted prefix of `name`, shortest first
fn prefixes(name: &str) -> impl Iterator<Item = &str> {
	name.match_indices('.')
		.map(|(index, _)| &name[..index])
		.chain(std::iter::once(name))
}

/// Reject names that cannot map to distinct store keys
pub(crate) fn validate_name(name: &str) -> Result<()> {
	if name.is_empty() {
		return Err(RegionCacheError::Configuration(
			"region name must not be empty".to_string(),
		));
	}
	if name.split('.').any(str::is_empty) {
		return Err(RegionCacheError::Configuration(format!(
			"region name '{}' contains an empty segment",
			name
		)));
	}
	if name.contains("::") || name.contains(char::is_whitespace) {
		return Err(RegionCacheError::Configuration(format!(
			"region name '{}' must not contain '::' or whitespace",
			name
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryStore;
	use rstest::*;
	use std::time::Duration;

	#[fixture]
	fn cache() -> RegionCache {
		RegionCache::new(Arc::new(MemoryStore::new()))
	}

	#[rstest]
	fn test_prefixes() {
		let all: Vec<&str> = prefixes("a.b.c").collect();
		assert_eq!(all, vec!["a", "a.b", "a.b.c"]);
	}

	#[rstest]
	#[case("")]
	#[case(".abc")]
	#[case("abc.")]
	#[case("abc..xyz")]
	#[case("abc::child_caches")]
	#[case("my region")]
	fn test_invalid_names(#[case] name: &str) {
		assert!(matches!(
			validate_name(name),
			Err(RegionCacheError::Configuration(_))
		));
	}

	#[rstest]
	#[tokio::test]
	async fn test_same_name_same_handle(cache: RegionCache) {
		// Arrange
		let first = cache.region("abc.xyz").await.unwrap();

		// Act
		let second = cache.region("abc.xyz").await.unwrap();

		// Assert
		assert!(first.same_handle(&second));
	}

	#[rstest]
	#[tokio::test]
	async fn test_lazy_parent_creation(cache: RegionCache) {
		let _leaf = cache.region("a.b.c").await.unwrap();

		assert_eq!(cache.local_regions(), vec!["a", "a.b", "a.b.c"]);
		assert_eq!(cache.root_regions().await.unwrap(), vec!["a"]);
		let children = cache
			.store()
			.set_members(&children_key("", "a.b"))
			.await
			.unwrap();
		assert!(children.contains("a.b.c"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_released_handle_keeps_configuration(cache: RegionCache) {
		// Arrange
		let region = cache
			.region_with("abc", RegionOverrides::new().serializer("msgpack"))
			.await
			.unwrap();
		region
			.update_config(RegionOverrides::new().with_ttl(Duration::from_secs(5)))
			.unwrap();

		// Act
		drop(region);
		let rebuilt = cache.region("abc").await.unwrap();

		// Assert
		assert_eq!(cache.local_regions(), vec!["abc"]);
		assert_eq!(rebuilt.config().serializer.name(), "msgpack");
		assert_eq!(rebuilt.config().default_ttl, Some(Duration::from_secs(5)));
	}

	#[rstest]
	#[tokio::test]
	async fn test_overrides_ignored_for_existing_region(cache: RegionCache) {
		let _existing = cache.region("abc").await.unwrap();

		let again = cache
			.region_with("abc", RegionOverrides::new().serializer("msgpack"))
			.await
			.unwrap();

		assert_eq!(again.config().serializer.name(), "json");
	}

	#[rstest]
	#[tokio::test]
	async fn test_bad_override_fails_creation(cache: RegionCache) {
		let result = cache
			.region_with("abc", RegionOverrides::new().serializer("pickle"))
			.await;

		assert!(matches!(result, Err(RegionCacheError::Configuration(_))));
		assert!(cache.local_regions().is_empty());
	}
}
