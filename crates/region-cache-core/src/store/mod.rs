//! Backing store contract
//!
//! A [`RegionStore`] exposes the handful of hash, set and expiry primitives the
//! region layer needs, plus [`RegionStore::execute_atomic`] which applies a batch
//! of [`StoreCommand`]s as one all-or-nothing unit. Backends carry no region
//! logic of their own.
//!
//! Single-command operations have default implementations that go through
//! `execute_atomic`, so a backend only has to provide the batch primitive and the
//! whole-key reads.

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Suffix of the set listing a region's children
pub const CHILDREN_SUFFIX: &str = "::child_caches";

/// Suffix of the set listing every top-level region under a namespace
pub const ROOTS_SUFFIX: &str = "::root_regions";

/// Store key of a region's hash
pub fn region_key(namespace: &str, name: &str) -> String {
	format!("{}{}", namespace, name)
}

/// Store key of a region's children set
pub fn children_key(namespace: &str, name: &str) -> String {
	format!("{}{}{}", namespace, name, CHILDREN_SUFFIX)
}

/// Store key of the set of top-level regions
pub fn roots_key(namespace: &str) -> String {
	format!("{}{}", namespace, ROOTS_SUFFIX)
}

/// When an expiry command applies its TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireMode {
	/// Always reset the countdown
	Always,
	/// Only set a TTL on a key that has none
	IfUnset,
}

/// A single store command, queued for atomic execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
	HashSet {
		key: String,
		field: String,
		value: Vec<u8>,
	},
	HashDel {
		key: String,
		field: String,
	},
	HashGet {
		key: String,
		field: String,
	},
	HashExists {
		key: String,
		field: String,
	},
	KeyDelete {
		key: String,
	},
	SetAdd {
		key: String,
		member: String,
	},
	SetRemove {
		key: String,
		member: String,
	},
	SetMembers {
		key: String,
	},
	Expire {
		key: String,
		ttl: Duration,
		mode: ExpireMode,
	},
}

impl StoreCommand {
	/// Store key the command operates on
	pub fn key(&self) -> &str {
		match self {
			StoreCommand::HashSet { key, .. }
			| StoreCommand::HashDel { key, .. }
			| StoreCommand::HashGet { key, .. }
			| StoreCommand::HashExists { key, .. }
			| StoreCommand::KeyDelete { key }
			| StoreCommand::SetAdd { key, .. }
			| StoreCommand::SetRemove { key, .. }
			| StoreCommand::SetMembers { key }
			| StoreCommand::Expire { key, .. } => key,
		}
	}

	/// Whether the command mutates the store
	pub fn is_write(&self) -> bool {
		!matches!(
			self,
			StoreCommand::HashGet { .. }
				| StoreCommand::HashExists { .. }
				| StoreCommand::SetMembers { .. }
		)
	}
}

/// Reply to one [`StoreCommand`], in batch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply {
	/// Reply to `HashGet`
	Value(Option<Vec<u8>>),
	/// Reply to every command answering yes/no (created, removed, exists, applied)
	Flag(bool),
	/// Reply to `SetMembers`
	Members(HashSet<String>),
}

impl StoreReply {
	fn into_value(self) -> StoreResult<Option<Vec<u8>>> {
		match self {
			StoreReply::Value(value) => Ok(value),
			other => Err(unexpected_reply("value", &other)),
		}
	}

	fn into_flag(self) -> StoreResult<bool> {
		match self {
			StoreReply::Flag(flag) => Ok(flag),
			other => Err(unexpected_reply("flag", &other)),
		}
	}

	fn into_members(self) -> StoreResult<HashSet<String>> {
		match self {
			StoreReply::Members(members) => Ok(members),
			other => Err(unexpected_reply("members", &other)),
		}
	}
}

fn unexpected_reply(expected: &str, got: &StoreReply) -> StoreError {
	StoreError::Rejected(format!("Expected {} reply, got {:?}", expected, got))
}

/// Backing store primitives used by regions
#[async_trait]
pub trait RegionStore: Send + Sync {
	/// Apply every command as one unit: either all take effect or none do
	///
	/// Replies are returned in command order.
	async fn execute_atomic(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<StoreReply>>;

	/// Read every field of a hash
	async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, Vec<u8>>>;

	/// Number of fields in a hash
	async fn hash_len(&self, key: &str) -> StoreResult<usize>;

	/// Remaining time to live of a key, `None` when absent or persistent
	async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

	/// Check the store is reachable
	async fn ping(&self) -> StoreResult<()>;

	async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
		self.single(StoreCommand::HashGet {
			key: key.to_string(),
			field: field.to_string(),
		})
		.await?
		.into_value()
	}

	async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> StoreResult<bool> {
		self.single(StoreCommand::HashSet {
			key: key.to_string(),
			field: field.to_string(),
			value,
		})
		.await?
		.into_flag()
	}

	async fn hash_del(&self, key: &str, field: &str) -> StoreResult<bool> {
		self.single(StoreCommand::HashDel {
			key: key.to_string(),
			field: field.to_string(),
		})
		.await?
		.into_flag()
	}

	async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
		self.single(StoreCommand::HashExists {
			key: key.to_string(),
			field: field.to_string(),
		})
		.await?
		.into_flag()
	}

	async fn key_delete(&self, key: &str) -> StoreResult<bool> {
		self.single(StoreCommand::KeyDelete {
			key: key.to_string(),
		})
		.await?
		.into_flag()
	}

	async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
		self.single(StoreCommand::SetAdd {
			key: key.to_string(),
			member: member.to_string(),
		})
		.await?
		.into_flag()
	}

	async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
		self.single(StoreCommand::SetRemove {
			key: key.to_string(),
			member: member.to_string(),
		})
		.await?
		.into_flag()
	}

	async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>> {
		self.single(StoreCommand::SetMembers {
			key: key.to_string(),
		})
		.await?
		.into_members()
	}

	async fn expire(&self, key: &str, ttl: Duration, mode: ExpireMode) -> StoreResult<bool> {
		self.single(StoreCommand::Expire {
			key: key.to_string(),
			ttl,
			mode,
		})
		.await?
		.into_flag()
	}

	#[doc(hidden)]
	async fn single(&self, command: StoreCommand) -> StoreResult<StoreReply> {
		self.execute_atomic(vec![command])
			.await?
			.pop()
			.ok_or_else(|| StoreError::Rejected("Store returned no reply".to_string()))
	}
}
