//! Region handles and the key/value protocol
//!
//! A region's entries live in one store hash named after the region. Its child
//! regions are listed in a separate set so that any process can walk the tree
//! when invalidating.

use crate::config::{RegionConfig, RegionOverrides};
use crate::error::{RegionCacheError, Result};
use crate::registry::{RegionCache, validate_name};
use crate::store::{RegionStore, StoreCommand, children_key, region_key};
use crate::transaction::TransactionScope;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub(crate) struct RegionInner {
	name: String,
	cache: RegionCache,
	config: Arc<RwLock<RegionConfig>>,
	hash_key: String,
	children_key: String,
	linked: AtomicBool,
}

/// Handle to a named cache region
///
/// Handles are cheap to clone and all clones of a name in one [`RegionCache`]
/// share the same resolved configuration.
#[derive(Clone)]
pub struct Region {
	inner: Arc<RegionInner>,
}

impl fmt::Debug for Region {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Region")
			.field("name", &self.inner.name)
			.field("config", &*self.inner.config.read())
			.finish()
	}
}

impl Region {
	pub(crate) fn new(
		cache: RegionCache,
		name: String,
		config: Arc<RwLock<RegionConfig>>,
	) -> Self {
		let namespace = config.read().namespace.clone();
		let hash_key = region_key(&namespace, &name);
		let children_key = children_key(&namespace, &name);
		Self {
			inner: Arc::new(RegionInner {
				name,
				cache,
				config,
				hash_key,
				children_key,
				linked: AtomicBool::new(false),
			}),
		}
	}

	pub(crate) fn from_inner(inner: Arc<RegionInner>) -> Self {
		Self { inner }
	}

	pub(crate) fn downgrade(&self) -> Weak<RegionInner> {
		Arc::downgrade(&self.inner)
	}

	pub(crate) fn is_linked(&self) -> bool {
		self.inner.linked.load(Ordering::Acquire)
	}

	pub(crate) fn mark_linked(&self) {
		self.inner.linked.store(true, Ordering::Release);
	}

	/// Full dotted name
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Last dotted segment of the name
	pub fn leaf_name(&self) -> &str {
		self.inner
			.name
			.rsplit_once('.')
			.map_or(self.inner.name.as_str(), |(_, leaf)| leaf)
	}

	/// Name of the parent region, `None` for a root region
	pub fn parent_name(&self) -> Option<&str> {
		self.inner.name.rsplit_once('.').map(|(parent, _)| parent)
	}

	/// Snapshot of the resolved configuration
	pub fn config(&self) -> RegionConfig {
		self.inner.config.read().clone()
	}

	pub fn cache(&self) -> &RegionCache {
		&self.inner.cache
	}

	/// Store key of the hash holding this region's entries
	pub fn storage_key(&self) -> &str {
		&self.inner.hash_key
	}

	/// Whether both handles refer to the same in-process region
	pub fn same_handle(&self, other: &Region) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	fn store(&self) -> &Arc<dyn RegionStore> {
		self.inner.cache.store()
	}

	/// Parent region handle, `None` for a root region
	///
	/// The parent is looked up by name; a handle does not keep its ancestors
	/// alive.
	pub async fn parent(&self) -> Result<Option<Region>> {
		match self.parent_name() {
			Some(parent) => Ok(Some(self.inner.cache.region(parent).await?)),
			None => Ok(None),
		}
	}

	/// Get or create the subregion `child` (which may itself be dotted)
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
	/// let abc = cache.region("abc").await?;
	/// let xyz = abc.region("xyz").await?;
	/// assert_eq!(xyz.name(), "abc.xyz");
	/// # Ok(())
	/// # }
	/// ```
	pub async fn region(&self, child: &str) -> Result<Region> {
		self.region_with(child, RegionOverrides::default()).await
	}

	/// Get or create the subregion `child` with explicit configuration
	pub async fn region_with(&self, child: &str, overrides: RegionOverrides) -> Result<Region> {
		if child.is_empty() {
			return Err(RegionCacheError::Configuration(format!(
				"subregion name of '{}' must not be empty",
				self.inner.name
			)));
		}
		let name = format!("{}.{}", self.inner.name, child);
		self.inner.cache.region_with(&name, overrides).await
	}

	/// Re-resolve this region's configuration with `overrides`
	///
	/// The change outlives this handle. Children already resolved keep the
	/// configuration they were created with.
	pub fn update_config(&self, overrides: RegionOverrides) -> Result<()> {
		let resolved = self
			.config()
			.merge(&overrides, self.inner.cache.serializers())?;
		*self.inner.config.write() = resolved;
		tracing::debug!(region = %self.inner.name, "Updated region configuration");
		Ok(())
	}

	pub(crate) fn encode<T>(&self, config: &RegionConfig, key: &str, value: &T) -> Result<Vec<u8>>
	where
		T: Serialize + ?Sized,
	{
		let tree = serde_json::to_value(value).map_err(|e| self.serialization_error(key, e))?;
		config
			.serializer
			.encode(&tree)
			.map_err(|e| self.serialization_error(key, e))
	}

	fn decode<T>(&self, config: &RegionConfig, key: &str, bytes: &[u8]) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let tree = config
			.serializer
			.decode(bytes)
			.map_err(|e| self.serialization_error(key, e))?;
		serde_json::from_value(tree).map_err(|e| self.serialization_error(key, e))
	}

	fn serialization_error(&self, key: &str, err: impl fmt::Display) -> RegionCacheError {
		RegionCacheError::Serialization {
			region: self.inner.name.clone(),
			key: key.to_string(),
			message: err.to_string(),
		}
	}

	/// Submit write commands together with the expiry they require
	pub(crate) async fn submit(
		&self,
		config: &RegionConfig,
		mut commands: Vec<StoreCommand>,
		operation: &'static str,
	) -> Result<()> {
		if commands.is_empty() {
			return Ok(());
		}
		if let Some(expiry) = config.expiry_for(&self.inner.hash_key) {
			commands.push(expiry);
		}

		let count = commands.len();
		self.store()
			.execute_atomic(commands)
			.await
			.map_err(|e| e.in_commit(&self.inner.name, operation))?;

		tracing::debug!(
			region = %self.inner.name,
			operation,
			commands = count,
			"Committed region writes"
		);
		Ok(())
	}

	/// Whether the region holds an entry for `key`
	pub async fn contains(&self, key: &str) -> Result<bool> {
		self.store()
			.hash_exists(&self.inner.hash_key, key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "contains"))
	}

	/// Read and decode the entry for `key`
	///
	/// `Ok(None)` means the key is absent. A stored null decodes to `Some` of the
	/// null value, e.g. `Some(None)` when `T` is an `Option`.
	pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned,
	{
		let bytes = self
			.store()
			.hash_get(&self.inner.hash_key, key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "get"))?;

		tracing::debug!(region = %self.inner.name, key, hit = bytes.is_some(), "Region get");

		match bytes {
			Some(bytes) => {
				let config = self.config();
				Ok(Some(self.decode(&config, key, &bytes)?))
			}
			None => Ok(None),
		}
	}

	/// Encode and store `value` under `key`
	pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
	where
		T: Serialize + ?Sized,
	{
		let config = self.config();
		let value = self.encode(&config, key, value)?;
		let command = StoreCommand::HashSet {
			key: self.inner.hash_key.clone(),
			field: key.to_string(),
			value,
		};
		self.submit(&config, vec![command], "set").await
	}

	/// Remove the entry for `key`; a missing key is not an error
	pub async fn delete(&self, key: &str) -> Result<()> {
		let config = self.config();
		let command = StoreCommand::HashDel {
			key: self.inner.hash_key.clone(),
			field: key.to_string(),
		};
		self.submit(&config, vec![command], "delete").await
	}

	/// Number of entries in the region
	pub async fn len(&self) -> Result<usize> {
		self.store()
			.hash_len(&self.inner.hash_key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "len"))
	}

	pub async fn is_empty(&self) -> Result<bool> {
		Ok(self.len().await? == 0)
	}

	/// Every key in the region, sorted
	pub async fn keys(&self) -> Result<Vec<String>> {
		let mut keys: Vec<String> = self
			.store()
			.hash_get_all(&self.inner.hash_key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "keys"))?
			.into_keys()
			.collect();
		keys.sort();
		Ok(keys)
	}

	/// Every entry in the region, decoded and sorted by key
	pub async fn items<T>(&self) -> Result<Vec<(String, T)>>
	where
		T: DeserializeOwned,
	{
		let entries = self
			.store()
			.hash_get_all(&self.inner.hash_key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "items"))?;

		let config = self.config();
		let mut items = entries
			.into_iter()
			.map(|(key, bytes)| -> Result<(String, T)> {
				let value = self.decode(&config, &key, &bytes)?;
				Ok((key, value))
			})
			.collect::<Result<Vec<_>>>()?;
		items.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(items)
	}

	/// Handles for the child regions recorded in the store, sorted by name
	///
	/// Members that are not valid region names are skipped with a warning.
	pub async fn children(&self) -> Result<Vec<Region>> {
		let mut names: Vec<String> = self
			.store()
			.set_members(&self.inner.children_key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "children"))?
			.into_iter()
			.collect();
		names.sort();

		let mut children = Vec::with_capacity(names.len());
		for name in names {
			if let Err(e) = validate_name(&name) {
				tracing::warn!(
					region = %self.inner.name,
					child = %name,
					error = %e,
					"Skipping invalid child region name"
				);
				continue;
			}
			children.push(self.inner.cache.resolve(&name)?);
		}
		Ok(children)
	}

	/// Restart the expiry countdown of the region hash
	///
	/// Returns `false` when the region has no timeout or holds no entries.
	pub async fn reset_timeout(&self) -> Result<bool> {
		let config = self.config();
		let Some(ttl) = config.default_ttl else {
			return Ok(false);
		};
		self.store()
			.expire(&self.inner.hash_key, ttl, crate::store::ExpireMode::Always)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "reset_timeout"))
	}

	/// Remaining store-side lifetime of the region hash
	pub async fn ttl(&self) -> Result<Option<Duration>> {
		self.store()
			.ttl(&self.inner.hash_key)
			.await
			.map_err(|e| e.in_region(&self.inner.name, "ttl"))
	}

	/// Delete this region's entries and those of every descendant
	///
	/// Children sets are kept so the tree stays discoverable. If the store fails
	/// partway, regions already visited stay invalidated and the error is
	/// returned; calling again is safe.
	pub async fn invalidate(&self) -> Result<()> {
		let namespace = self.config().namespace;
		let store = self.store();

		let mut visited: HashSet<String> = HashSet::new();
		let mut stack = vec![self.inner.name.clone()];

		while let Some(name) = stack.pop() {
			if !visited.insert(name.clone()) {
				continue;
			}

			store
				.key_delete(&region_key(&namespace, &name))
				.await
				.map_err(|e| e.in_commit(&name, "invalidate"))?;

			let children = store
				.set_members(&children_key(&namespace, &name))
				.await
				.map_err(|e| e.in_region(&name, "invalidate"))?;

			stack.extend(children.into_iter().filter(|child| !visited.contains(child)));
		}

		tracing::debug!(
			region = %self.inner.name,
			regions = visited.len(),
			"Invalidated region tree"
		);
		Ok(())
	}

	/// Open a transaction scope with an explicit commit
	pub fn begin(&self) -> TransactionScope {
		TransactionScope::new(self.clone())
	}

	/// Run `body` in a transaction scope and commit its queued writes afterwards
	///
	/// The writes are committed whether `body` succeeds or fails; a failing body's
	/// error is returned after the commit attempt.
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
	/// let region = cache.region("abc").await?;
	///
	/// region
	///     .transaction(|tx| async move {
	///         tx.set("a", &1)?;
	///         tx.set("b", &2)?;
	///         Ok(())
	///     })
	///     .await?;
	///
	/// assert_eq!(region.get::<i32>("b").await?, Some(2));
	/// # Ok(())
	/// # }
	/// ```
	pub async fn transaction<F, Fut, T>(&self, body: F) -> Result<T>
	where
		F: FnOnce(TransactionScope) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let scope = self.begin();
		let outcome = body(scope.clone()).await;
		let committed = scope.commit().await;

		match (outcome, committed) {
			(Ok(value), Ok(())) => Ok(value),
			(Ok(_), Err(err)) => Err(err),
			(Err(err), Ok(())) => Err(err),
			(Err(err), Err(commit_err)) => {
				tracing::warn!(
					region = %self.inner.name,
					error = %commit_err,
					"Transaction commit failed after body error"
				);
				Err(err)
			}
		}
	}
}
