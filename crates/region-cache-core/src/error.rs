//! Error types for region operations
//!
//! Store backends report [`StoreError`]; the region layer attaches the region
//! name, key and operation and surfaces a [`RegionCacheError`]. Nothing in this
//! crate retries on its own.

use thiserror::Error;

/// Result type for region operations
pub type Result<T> = std::result::Result<T, RegionCacheError>;

/// Result type for raw store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure reported by a store backend, without region context
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
	/// The store could not be reached; the command was never sent
	#[error("Store unavailable: {0}")]
	Unavailable(String),

	/// The connection timed out or dropped after the command was sent
	#[error("Store interrupted: {0}")]
	Interrupted(String),

	/// The store answered with an error
	#[error("Store rejected command: {0}")]
	Rejected(String),
}

impl StoreError {
	/// Attach region context to a failed read or a structural operation
	pub(crate) fn in_region(self, region: &str, operation: &'static str) -> RegionCacheError {
		match self {
			StoreError::Unavailable(message) | StoreError::Interrupted(message) => {
				RegionCacheError::StoreConnection {
					operation,
					region: region.to_string(),
					message,
				}
			}
			StoreError::Rejected(message) => RegionCacheError::Store {
				operation,
				region: region.to_string(),
				message,
			},
		}
	}

	/// Attach region context to a failed write
	///
	/// A write that was sent but never acknowledged may or may not have been
	/// applied, so interruptions become [`RegionCacheError::TransactionCommitUnknown`].
	pub(crate) fn in_commit(self, region: &str, operation: &'static str) -> RegionCacheError {
		match self {
			StoreError::Interrupted(message) => RegionCacheError::TransactionCommitUnknown {
				region: region.to_string(),
				message,
			},
			other => other.in_region(region, operation),
		}
	}
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StoreError {
	fn from(err: redis::RedisError) -> Self {
		if err.is_connection_refusal() {
			StoreError::Unavailable(err.to_string())
		} else if err.is_timeout() || err.is_connection_dropped() || err.is_io_error() {
			StoreError::Interrupted(err.to_string())
		} else {
			StoreError::Rejected(err.to_string())
		}
	}
}

/// Errors surfaced by regions, transaction scopes and the registry
#[derive(Debug, Error)]
pub enum RegionCacheError {
	/// Transport or authentication failure talking to the backing store
	#[error("Store connection error during {operation} on region '{region}': {message}")]
	StoreConnection {
		operation: &'static str,
		region: String,
		message: String,
	},

	/// The store rejected a command
	#[error("Store error during {operation} on region '{region}': {message}")]
	Store {
		operation: &'static str,
		region: String,
		message: String,
	},

	/// A value could not be encoded or decoded
	#[error("Serialization error in region '{region}' for key '{key}': {message}")]
	Serialization {
		region: String,
		key: String,
		message: String,
	},

	/// A commit was sent but never acknowledged; it may or may not be applied
	#[error("Commit outcome unknown for region '{region}': {message}")]
	TransactionCommitUnknown { region: String, message: String },

	/// Invalid region name or configuration
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl RegionCacheError {
	/// Name of the region the error relates to, if any
	pub fn region(&self) -> Option<&str> {
		match self {
			RegionCacheError::StoreConnection { region, .. }
			| RegionCacheError::Store { region, .. }
			| RegionCacheError::Serialization { region, .. }
			| RegionCacheError::TransactionCommitUnknown { region, .. } => Some(region),
			RegionCacheError::Configuration(_) => None,
		}
	}

	/// Whether the outcome of the failed operation is unknown
	pub fn is_commit_unknown(&self) -> bool {
		matches!(self, RegionCacheError::TransactionCommitUnknown { .. })
	}

	/// Whether repeating an idempotent operation (`set` with the same value,
	/// `delete`, `invalidate`) after this error cannot double-apply anything
	///
	/// Serialization and configuration errors fail the same way on every retry.
	pub fn is_idempotent_retry_safe(&self) -> bool {
		matches!(
			self,
			RegionCacheError::StoreConnection { .. }
				| RegionCacheError::TransactionCommitUnknown { .. }
		)
	}
}

impl From<region_cache_conf::SettingsError> for RegionCacheError {
	fn from(err: region_cache_conf::SettingsError) -> Self {
		RegionCacheError::Configuration(err.to_string())
	}
}
