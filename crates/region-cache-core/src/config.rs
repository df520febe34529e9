//! Resolved region configuration and per-region overrides

use crate::error::{RegionCacheError, Result};
use crate::serializer::{JsonSerializer, Serializer, SerializerRegistry};
use crate::store::{ExpireMode, StoreCommand};
use region_cache_conf::RegionCacheSettings;
use std::sync::Arc;
use std::time::Duration;

/// Shortest timeout a region accepts; store expiry has millisecond resolution
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// Configuration a region was resolved with
///
/// A child's config is a snapshot of its parent's at creation time merged with
/// the child's overrides; later parent changes do not reach it.
#[derive(Debug, Clone)]
pub struct RegionConfig {
	/// Codec for values stored in the region hash
	pub serializer: Arc<dyn Serializer>,
	/// Expiry of the region hash, `None` for no expiry
	pub default_ttl: Option<Duration>,
	/// Whether every write restarts the expiry countdown
	pub refresh_on_write: bool,
	/// Prefix of every store key; shared by the whole region tree
	pub namespace: String,
}

impl Default for RegionConfig {
	fn default() -> Self {
		Self {
			serializer: Arc::new(JsonSerializer),
			default_ttl: None,
			refresh_on_write: true,
			namespace: String::new(),
		}
	}
}

impl RegionConfig {
	/// Build root defaults from settings
	pub fn from_settings(
		settings: &RegionCacheSettings,
		serializers: &SerializerRegistry,
	) -> Result<Self> {
		settings.validate()?;
		let serializer = serializers
			.resolve(&settings.serializer)
			.ok_or_else(|| unknown_serializer(&settings.serializer, serializers))?;

		Ok(Self {
			serializer,
			default_ttl: settings.default_ttl(),
			refresh_on_write: settings.refresh_on_write,
			namespace: settings.namespace.clone(),
		})
	}

	/// Merge overrides over this config
	pub fn merge(
		&self,
		overrides: &RegionOverrides,
		serializers: &SerializerRegistry,
	) -> Result<Self> {
		let mut resolved = self.clone();

		match &overrides.serializer {
			Some(SerializerChoice::Named(name)) => {
				resolved.serializer = serializers
					.resolve(name)
					.ok_or_else(|| unknown_serializer(name, serializers))?;
			}
			Some(SerializerChoice::Instance(serializer)) => {
				resolved.serializer = Arc::clone(serializer);
			}
			None => {}
		}

		if let Some(ttl) = overrides.ttl {
			if let Some(timeout) = ttl
				&& timeout < MIN_TTL
			{
				return Err(RegionCacheError::Configuration(format!(
					"region timeout must be at least {:?}, got {:?}; use without_ttl() to disable expiry",
					MIN_TTL, timeout
				)));
			}
			resolved.default_ttl = ttl;
		}

		if let Some(refresh) = overrides.refresh_on_write {
			resolved.refresh_on_write = refresh;
		}

		Ok(resolved)
	}

	/// Expiry command a write to `key` must carry, if any
	pub fn expiry_for(&self, key: &str) -> Option<StoreCommand> {
		self.default_ttl.map(|ttl| StoreCommand::Expire {
			key: key.to_string(),
			ttl,
			mode: if self.refresh_on_write {
				ExpireMode::Always
			} else {
				ExpireMode::IfUnset
			},
		})
	}
}

fn unknown_serializer(name: &str, serializers: &SerializerRegistry) -> RegionCacheError {
	RegionCacheError::Configuration(format!(
		"unknown serializer '{}' (available: {})",
		name,
		serializers.names().join(", ")
	))
}

/// Serializer selection in [`RegionOverrides`]
#[derive(Debug, Clone)]
pub enum SerializerChoice {
	/// Resolved through the cache's serializer registry
	Named(String),
	Instance(Arc<dyn Serializer>),
}

/// Explicit configuration for one region
///
/// Unset fields inherit from the parent region. The namespace cannot be
/// overridden.
///
/// # Examples
///
/// ```
/// use region_cache_core::RegionOverrides;
/// use std::time::Duration;
///
/// let overrides = RegionOverrides::new()
///     .serializer("msgpack")
///     .with_ttl(Duration::from_secs(300))
///     .refresh_on_write(false);
/// assert!(!overrides.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegionOverrides {
	serializer: Option<SerializerChoice>,
	ttl: Option<Option<Duration>>,
	refresh_on_write: Option<bool>,
}

impl RegionOverrides {
	pub fn new() -> Self {
		Self::default()
	}

	/// Select a serializer by registered name
	pub fn serializer(mut self, name: impl Into<String>) -> Self {
		self.serializer = Some(SerializerChoice::Named(name.into()));
		self
	}

	/// Use a specific serializer instance
	pub fn serializer_instance(mut self, serializer: Arc<dyn Serializer>) -> Self {
		self.serializer = Some(SerializerChoice::Instance(serializer));
		self
	}

	/// Expire the region hash after `ttl`
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(Some(ttl));
		self
	}

	/// Disable expiry even if the parent has a timeout
	pub fn without_ttl(mut self) -> Self {
		self.ttl = Some(None);
		self
	}

	pub fn refresh_on_write(mut self, refresh: bool) -> Self {
		self.refresh_on_write = Some(refresh);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.serializer.is_none() && self.ttl.is_none() && self.refresh_on_write.is_none()
	}
}
