//! In-process store backend
//!
//! Every batch is applied under one write lock against a staged copy of the keys
//! it touches, so a batch that fails halfway leaves the store untouched. Expired
//! keys are dropped lazily when they are next read or written.

use super::{ExpireMode, RegionStore, StoreCommand, StoreReply};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Data {
	Hash(HashMap<String, Vec<u8>>),
	Set(HashSet<String>),
}

impl Data {
	fn is_empty(&self) -> bool {
		match self {
			Data::Hash(fields) => fields.is_empty(),
			Data::Set(members) => members.is_empty(),
		}
	}
}

#[derive(Debug, Clone)]
struct StoredKey {
	data: Data,
	expires_at: Option<Instant>,
}

impl StoredKey {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// In-memory [`RegionStore`]
///
/// Cloning shares the underlying map, so two region caches built from clones of
/// one `MemoryStore` behave like two processes sharing a Redis server.
///
/// # Examples
///
/// ```
/// use region_cache_core::store::{MemoryStore, RegionStore};
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.hash_set("abc", "k", b"1".to_vec()).await.unwrap();
/// assert!(store.hash_exists("abc", "k").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	keys: Arc<RwLock<HashMap<String, StoredKey>>>,
}

impl MemoryStore {
	/// Create an empty store
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of live keys
	pub fn key_count(&self) -> usize {
		let now = Instant::now();
		self.keys
			.read()
			.values()
			.filter(|entry| !entry.is_expired(now))
			.count()
	}

	/// Whether a live key exists
	pub fn contains_key(&self, key: &str) -> bool {
		let now = Instant::now();
		self.keys
			.read()
			.get(key)
			.is_some_and(|entry| !entry.is_expired(now))
	}

	/// Drop every key
	pub fn flush(&self) {
		self.keys.write().clear();
	}

	fn live<'a>(
		keys: &'a HashMap<String, StoredKey>,
		key: &str,
		now: Instant,
	) -> Option<&'a StoredKey> {
		keys.get(key).filter(|entry| !entry.is_expired(now))
	}
}

fn wrong_type(key: &str) -> StoreError {
	StoreError::Rejected(format!(
		"WRONGTYPE Operation against key '{}' holding the wrong kind of value",
		key
	))
}

/// Keys touched by a batch, copied out of the store
struct Staging {
	entries: HashMap<String, Option<StoredKey>>,
}

impl Staging {
	fn hash_mut(&mut self, key: &str) -> StoreResult<&mut HashMap<String, Vec<u8>>> {
		let slot = self.slot(key);
		let entry = slot.get_or_insert_with(|| StoredKey {
			data: Data::Hash(HashMap::new()),
			expires_at: None,
		});
		match &mut entry.data {
			Data::Hash(fields) => Ok(fields),
			Data::Set(_) => Err(wrong_type(key)),
		}
	}

	fn set_mut(&mut self, key: &str) -> StoreResult<&mut HashSet<String>> {
		let slot = self.slot(key);
		let entry = slot.get_or_insert_with(|| StoredKey {
			data: Data::Set(HashSet::new()),
			expires_at: None,
		});
		match &mut entry.data {
			Data::Set(members) => Ok(members),
			Data::Hash(_) => Err(wrong_type(key)),
		}
	}

	fn hash(&self, key: &str) -> StoreResult<Option<&HashMap<String, Vec<u8>>>> {
		match self.entries.get(key).and_then(Option::as_ref) {
			None => Ok(None),
			Some(StoredKey {
				data: Data::Hash(fields),
				..
			}) => Ok(Some(fields)),
			Some(_) => Err(wrong_type(key)),
		}
	}

	fn set(&self, key: &str) -> StoreResult<Option<&HashSet<String>>> {
		match self.entries.get(key).and_then(Option::as_ref) {
			None => Ok(None),
			Some(StoredKey {
				data: Data::Set(members),
				..
			}) => Ok(Some(members)),
			Some(_) => Err(wrong_type(key)),
		}
	}

	fn slot(&mut self, key: &str) -> &mut Option<StoredKey> {
		self.entries.entry(key.to_string()).or_insert(None)
	}

	/// Drop collections emptied by the batch, the way Redis deletes empty keys
	fn prune(&mut self, key: &str) {
		if let Some(slot) = self.entries.get_mut(key)
			&& slot.as_ref().is_some_and(|entry| entry.data.is_empty())
		{
			*slot = None;
		}
	}

	fn apply(&mut self, command: &StoreCommand, now: Instant) -> StoreResult<StoreReply> {
		let reply = match command {
			StoreCommand::HashSet { key, field, value } => {
				let created = self
					.hash_mut(key)?
					.insert(field.clone(), value.clone())
					.is_none();
				StoreReply::Flag(created)
			}
			StoreCommand::HashDel { key, field } => {
				let removed = self
					.hash(key)?
					.is_some_and(|fields| fields.contains_key(field));
				if removed {
					self.hash_mut(key)?.remove(field);
				}
				self.prune(key);
				StoreReply::Flag(removed)
			}
			StoreCommand::HashGet { key, field } => {
				StoreReply::Value(self.hash(key)?.and_then(|fields| fields.get(field).cloned()))
			}
			StoreCommand::HashExists { key, field } => StoreReply::Flag(
				self.hash(key)?
					.is_some_and(|fields| fields.contains_key(field)),
			),
			StoreCommand::KeyDelete { key } => {
				let existed = self.slot(key).take().is_some();
				StoreReply::Flag(existed)
			}
			StoreCommand::SetAdd { key, member } => {
				StoreReply::Flag(self.set_mut(key)?.insert(member.clone()))
			}
			StoreCommand::SetRemove { key, member } => {
				let removed = self
					.set(key)?
					.is_some_and(|members| members.contains(member));
				if removed {
					self.set_mut(key)?.remove(member);
				}
				self.prune(key);
				StoreReply::Flag(removed)
			}
			StoreCommand::SetMembers { key } => {
				StoreReply::Members(self.set(key)?.cloned().unwrap_or_default())
			}
			StoreCommand::Expire { key, ttl, mode } => {
				let applied = match self.slot(key) {
					Some(entry) if *mode == ExpireMode::IfUnset && entry.expires_at.is_some() => {
						false
					}
					Some(entry) => {
						entry.expires_at = Some(now + *ttl);
						true
					}
					None => false,
				};
				StoreReply::Flag(applied)
			}
		};
		Ok(reply)
	}
}

#[async_trait]
impl RegionStore for MemoryStore {
	async fn execute_atomic(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<StoreReply>> {
		let now = Instant::now();
		let mut keys = self.keys.write();

		let mut staging = Staging {
			entries: HashMap::new(),
		};
		for command in &commands {
			let key = command.key();
			if !staging.entries.contains_key(key) {
				let current = Self::live(&keys, key, now).cloned();
				staging.entries.insert(key.to_string(), current);
			}
		}

		let mut replies = Vec::with_capacity(commands.len());
		for command in &commands {
			replies.push(staging.apply(command, now)?);
		}

		for (key, entry) in staging.entries {
			match entry {
				Some(entry) => {
					keys.insert(key, entry);
				}
				None => {
					keys.remove(&key);
				}
			}
		}

		Ok(replies)
	}

	async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
		let keys = self.keys.read();
		match Self::live(&keys, key, Instant::now()) {
			None => Ok(HashMap::new()),
			Some(StoredKey {
				data: Data::Hash(fields),
				..
			}) => Ok(fields.clone()),
			Some(_) => Err(wrong_type(key)),
		}
	}

	async fn hash_len(&self, key: &str) -> StoreResult<usize> {
		let keys = self.keys.read();
		match Self::live(&keys, key, Instant::now()) {
			None => Ok(0),
			Some(StoredKey {
				data: Data::Hash(fields),
				..
			}) => Ok(fields.len()),
			Some(_) => Err(wrong_type(key)),
		}
	}

	async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
		let now = Instant::now();
		let keys = self.keys.read();
		Ok(Self::live(&keys, key, now)
			.and_then(|entry| entry.expires_at)
			.map(|at| at.saturating_duration_since(now)))
	}

	async fn ping(&self) -> StoreResult<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::*;

	#[fixture]
	fn store() -> MemoryStore {
		MemoryStore::new()
	}

	#[rstest]
	#[tokio::test]
	async fn test_hash_roundtrip(store: MemoryStore) {
		// Arrange
		store.hash_set("abc", "k", b"v".to_vec()).await.unwrap();

		// Act
		let value = store.hash_get("abc", "k").await.unwrap();

		// Assert
		assert_eq!(value, Some(b"v".to_vec()));
		assert_eq!(store.hash_len("abc").await.unwrap(), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_last_field_removal_deletes_key(store: MemoryStore) {
		store.hash_set("abc", "k", b"v".to_vec()).await.unwrap();

		let removed = store.hash_del("abc", "k").await.unwrap();

		assert!(removed);
		assert!(!store.contains_key("abc"));
		assert!(!store.hash_del("abc", "k").await.unwrap());
	}

	#[rstest]
	#[tokio::test]
	async fn test_failed_batch_leaves_store_untouched(store: MemoryStore) {
		// Arrange
		store.set_add("abc::child_caches", "abc.xyz").await.unwrap();

		// Act: the second command hits a set with a hash command
		let result = store
			.execute_atomic(vec![
				StoreCommand::HashSet {
					key: "abc".to_string(),
					field: "k".to_string(),
					value: b"v".to_vec(),
				},
				StoreCommand::HashSet {
					key: "abc::child_caches".to_string(),
					field: "k".to_string(),
					value: b"v".to_vec(),
				},
			])
			.await;

		// Assert
		assert!(matches!(result, Err(StoreError::Rejected(_))));
		assert!(!store.contains_key("abc"));
		assert_eq!(
			store.set_members("abc::child_caches").await.unwrap().len(),
			1
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_expire_if_unset_keeps_existing_ttl(store: MemoryStore) {
		// Arrange
		store.hash_set("abc", "k", b"v".to_vec()).await.unwrap();
		store
			.expire("abc", Duration::from_secs(100), ExpireMode::Always)
			.await
			.unwrap();

		// Act
		let applied = store
			.expire("abc", Duration::from_secs(5), ExpireMode::IfUnset)
			.await
			.unwrap();

		// Assert
		assert!(!applied);
		let remaining = store.ttl("abc").await.unwrap().unwrap();
		assert!(remaining > Duration::from_secs(50));
	}

	#[rstest]
	#[tokio::test]
	async fn test_expired_key_is_gone(store: MemoryStore) {
		store.hash_set("abc", "k", b"v".to_vec()).await.unwrap();
		store
			.expire("abc", Duration::from_millis(20), ExpireMode::Always)
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(40)).await;

		assert_eq!(store.hash_get("abc", "k").await.unwrap(), None);
		assert_eq!(store.hash_len("abc").await.unwrap(), 0);
		assert_eq!(store.ttl("abc").await.unwrap(), None);
	}

	#[rstest]
	#[tokio::test]
	async fn test_expire_missing_key_is_noop(store: MemoryStore) {
		let applied = store
			.expire("absent", Duration::from_secs(1), ExpireMode::Always)
			.await
			.unwrap();

		assert!(!applied);
		assert_eq!(store.key_count(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_clones_share_state(store: MemoryStore) {
		let other = store.clone();

		store.set_add("roots", "abc").await.unwrap();

		assert!(other.set_members("roots").await.unwrap().contains("abc"));
	}
}
