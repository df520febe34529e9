//! Transaction scopes
//!
//! A [`TransactionScope`] queues writes against one region and submits them as a
//! single atomic batch. Reads are not queued: they go to the store and see the
//! state before the scope commits.

use crate::config::RegionConfig;
use crate::error::Result;
use crate::region::Region;
use crate::store::StoreCommand;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

struct ScopeState {
	region: Region,
	config: RegionConfig,
	pending: Mutex<Vec<StoreCommand>>,
}

impl Drop for ScopeState {
	fn drop(&mut self) {
		let commands = std::mem::take(self.pending.get_mut());
		if commands.is_empty() {
			return;
		}

		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				let region = self.region.clone();
				let config = self.config.clone();
				tracing::debug!(
					region = %region.name(),
					commands = commands.len(),
					"Committing dropped transaction scope in the background"
				);
				handle.spawn(async move {
					if let Err(e) = region.submit(&config, commands, "commit").await {
						tracing::warn!(
							region = %region.name(),
							error = %e,
							"Background commit of dropped transaction scope failed"
						);
					}
				});
			}
			Err(_) => {
				tracing::warn!(
					region = %self.region.name(),
					commands = commands.len(),
					"Discarding uncommitted transaction scope: no tokio runtime available"
				);
			}
		}
	}
}

/// Batching handle over one region
///
/// Clones share the same queue. If the last clone is dropped with writes still
/// queued they are committed from a background task.
#[derive(Clone)]
pub struct TransactionScope {
	state: Arc<ScopeState>,
}

impl fmt::Debug for TransactionScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TransactionScope")
			.field("region", &self.state.region.name())
			.field("pending", &self.pending_len())
			.finish()
	}
}

impl TransactionScope {
	pub(crate) fn new(region: Region) -> Self {
		let config = region.config();
		Self {
			state: Arc::new(ScopeState {
				region,
				config,
				pending: Mutex::new(Vec::new()),
			}),
		}
	}

	pub fn region(&self) -> &Region {
		&self.state.region
	}

	/// Number of queued writes
	pub fn pending_len(&self) -> usize {
		self.state.pending.lock().len()
	}

	/// Queue a write of `value` under `key`
	///
	/// An encoding failure is returned here and leaves the rest of the queue
	/// untouched.
	pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
	where
		T: Serialize + ?Sized,
	{
		let state = &self.state;
		let value = state.region.encode(&state.config, key, value)?;
		state.pending.lock().push(StoreCommand::HashSet {
			key: state.region.storage_key().to_string(),
			field: key.to_string(),
			value,
		});
		Ok(())
	}

	/// Queue removal of `key`
	pub fn delete(&self, key: &str) {
		let state = &self.state;
		state.pending.lock().push(StoreCommand::HashDel {
			key: state.region.storage_key().to_string(),
			field: key.to_string(),
		});
	}

	/// Read `key` from the store, ignoring writes queued in this scope
	pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned,
	{
		self.state.region.get(key).await
	}

	/// Check `key` in the store, ignoring writes queued in this scope
	pub async fn contains(&self, key: &str) -> Result<bool> {
		self.state.region.contains(key).await
	}

	/// Submit every queued write as one atomic batch
	pub async fn commit(self) -> Result<()> {
		let commands = std::mem::take(&mut *self.state.pending.lock());
		self.state
			.region
			.submit(&self.state.config, commands, "commit")
			.await
	}

	/// Drop every queued write without sending it
	pub fn discard(self) {
		let dropped = std::mem::take(&mut *self.state.pending.lock());
		tracing::debug!(
			region = %self.state.region.name(),
			commands = dropped.len(),
			"Discarded transaction scope"
		);
	}
}

#[cfg(test)]
mod tests {
	use crate::RegionCache;
	use crate::store::{MemoryStore, RegionStore};
	use rstest::*;
	use std::sync::Arc;
	use std::time::Duration;

	#[fixture]
	fn store() -> MemoryStore {
		MemoryStore::new()
	}

	#[rstest]
	#[tokio::test]
	async fn test_writes_are_queued_until_commit(store: MemoryStore) {
		// Arrange
		let cache = RegionCache::new(Arc::new(store.clone()));
		let region = cache.region("abc").await.unwrap();
		let scope = region.begin();

		// Act
		scope.set("a", &1).unwrap();
		scope.delete("b");

		// Assert
		assert_eq!(scope.pending_len(), 2);
		assert!(!scope.contains("a").await.unwrap());
		scope.commit().await.unwrap();
		assert!(region.contains("a").await.unwrap());
	}

	#[rstest]
	#[tokio::test]
	async fn test_discard_sends_nothing(store: MemoryStore) {
		let cache = RegionCache::new(Arc::new(store.clone()));
		let region = cache.region("abc").await.unwrap();
		let scope = region.begin();
		scope.set("a", &1).unwrap();

		scope.discard();

		assert!(!region.contains("a").await.unwrap());
	}

	#[rstest]
	#[tokio::test]
	async fn test_dropped_scope_commits_in_background(store: MemoryStore) {
		// Arrange
		let cache = RegionCache::new(Arc::new(store.clone()));
		let region = cache.region("abc").await.unwrap();

		// Act
		{
			let scope = region.begin();
			scope.set("a", &"x").unwrap();
		}
		tokio::time::sleep(Duration::from_millis(50)).await;

		// Assert
		assert_eq!(
			store.hash_get("abc", "a").await.unwrap(),
			Some(b"\"x\"".to_vec())
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_empty_commit_is_noop(store: MemoryStore) {
		let cache = RegionCache::new(Arc::new(store.clone()));
		let region = cache.region("abc").await.unwrap();
		let keys_before = store.key_count();

		region.begin().commit().await.unwrap();

		assert_eq!(store.key_count(), keys_before);
	}
}
