//! Settings for region-cache
//!
//! Settings can be loaded from environment variables or from a `.toml` / `.json`
//! file. The Redis URL is read from `CACHE_REDIS_URL`; the remaining knobs live
//! under the `REGION_CACHE_` prefix.
//!
//! # Examples
//!
//! ```
//! use region_cache_conf::RegionCacheSettings;
//!
//! let settings = RegionCacheSettings::default();
//! assert_eq!(settings.serializer, "json");
//! assert!(settings.refresh_on_write);
//! assert!(settings.validate().is_ok());
//! ```

mod error;

pub use error::{Result, SettingsError};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the Redis connection URL
pub const ENV_REDIS_URL: &str = "CACHE_REDIS_URL";
/// Environment variable overriding the store key namespace
pub const ENV_NAMESPACE: &str = "REGION_CACHE_NAMESPACE";
/// Environment variable overriding the default timeout, in seconds
pub const ENV_TIMEOUT: &str = "REGION_CACHE_TIMEOUT";
/// Environment variable overriding the refresh-on-write flag
pub const ENV_REFRESH_ON_WRITE: &str = "REGION_CACHE_REFRESH_ON_WRITE";
/// Environment variable overriding the serializer name
pub const ENV_SERIALIZER: &str = "REGION_CACHE_SERIALIZER";
/// Environment variable overriding the connection pool size
pub const ENV_POOL_SIZE: &str = "REGION_CACHE_POOL_SIZE";

/// Settings used to build a region cache
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCacheSettings {
	/// Redis connection URL, e.g. `redis://localhost:6379/5`
	#[serde(default)]
	pub redis_url: Option<String>,

	/// Prefix prepended to every store key
	#[serde(default)]
	pub namespace: String,

	/// Default region timeout in seconds (0 disables expiry)
	#[serde(default)]
	pub default_timeout: u64,

	/// Whether writes reset the region timeout
	#[serde(default = "default_refresh_on_write")]
	pub refresh_on_write: bool,

	/// Name of the default serializer (`json` or `msgpack`)
	#[serde(default = "default_serializer")]
	pub serializer: String,

	/// Maximum number of pooled store connections
	#[serde(default = "default_pool_size")]
	pub pool_size: usize,
}

fn default_refresh_on_write() -> bool {
	true
}

fn default_serializer() -> String {
	"json".to_string()
}

fn default_pool_size() -> usize {
	16
}

impl Default for RegionCacheSettings {
	fn default() -> Self {
		Self {
			redis_url: None,
			namespace: String::new(),
			default_timeout: 0,
			refresh_on_write: default_refresh_on_write(),
			serializer: default_serializer(),
			pool_size: default_pool_size(),
		}
	}
}

impl RegionCacheSettings {
	/// Default timeout as a duration, `None` when expiry is disabled
	pub fn default_ttl(&self) -> Option<Duration> {
		if self.default_timeout == 0 {
			None
		} else {
			Some(Duration::from_secs(self.default_timeout))
		}
	}

	/// Set the Redis URL
	pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
		self.redis_url = Some(url.into());
		self
	}

	/// Set the store key namespace
	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = namespace.into();
		self
	}

	/// Set the default timeout in seconds
	pub fn with_default_timeout(mut self, seconds: u64) -> Self {
		self.default_timeout = seconds;
		self
	}

	/// Set the default serializer name
	pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
		self.serializer = name.into();
		self
	}

	/// Validate settings
	///
	/// # Examples
	///
	/// ```
	/// use region_cache_conf::RegionCacheSettings;
	///
	/// let settings = RegionCacheSettings::default().with_redis_url("http://localhost");
	/// assert!(settings.validate().is_err());
	/// ```
	pub fn validate(&self) -> Result<()> {
		if let Some(url) = &self.redis_url {
			let supported = ["redis://", "rediss://", "redis+unix://", "unix://"];
			if !supported.iter().any(|scheme| url.starts_with(scheme)) {
				return Err(SettingsError::ValidationError(format!(
					"{} must use a redis:// or rediss:// scheme, got '{}'",
					ENV_REDIS_URL, url
				)));
			}
		}

		if self.namespace.contains(char::is_whitespace) {
			return Err(SettingsError::ValidationError(format!(
				"namespace must not contain whitespace, got '{}'",
				self.namespace
			)));
		}

		if self.serializer.trim().is_empty() {
			return Err(SettingsError::ValidationError(
				"serializer name must not be empty".to_string(),
			));
		}

		if self.pool_size == 0 {
			return Err(SettingsError::ValidationError(
				"pool_size must be greater than zero".to_string(),
			));
		}

		Ok(())
	}

	/// Load settings from environment variables
	///
	/// Unset variables keep their defaults.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Load settings from a key/value map shaped like the process environment
	///
	/// # Examples
	///
	/// ```
	/// use region_cache_conf::RegionCacheSettings;
	/// use std::collections::HashMap;
	///
	/// let mut vars = HashMap::new();
	/// vars.insert("CACHE_REDIS_URL".to_string(), "redis://localhost:6379/5".to_string());
	/// vars.insert("REGION_CACHE_TIMEOUT".to_string(), "60".to_string());
	///
	/// let settings = RegionCacheSettings::from_map(&vars).unwrap();
	/// assert_eq!(settings.redis_url.as_deref(), Some("redis://localhost:6379/5"));
	/// assert_eq!(settings.default_timeout, 60);
	/// ```
	pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
		Self::from_lookup(|key| vars.get(key).cloned())
	}

	fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut settings = Self::default();

		if let Some(url) = lookup(ENV_REDIS_URL) {
			settings.redis_url = Some(url);
		}

		if let Some(namespace) = lookup(ENV_NAMESPACE) {
			settings.namespace = namespace;
		}

		if let Some(timeout) = lookup(ENV_TIMEOUT) {
			settings.default_timeout = timeout.trim().parse().map_err(|e| {
				SettingsError::EnvError(format!("{} is not a number: {}", ENV_TIMEOUT, e))
			})?;
		}

		if let Some(refresh) = lookup(ENV_REFRESH_ON_WRITE) {
			settings.refresh_on_write = parse_bool(&refresh).ok_or_else(|| {
				SettingsError::EnvError(format!(
					"{} is not a boolean: '{}'",
					ENV_REFRESH_ON_WRITE, refresh
				))
			})?;
		}

		if let Some(serializer) = lookup(ENV_SERIALIZER) {
			settings.serializer = serializer;
		}

		if let Some(size) = lookup(ENV_POOL_SIZE) {
			settings.pool_size = size.trim().parse().map_err(|e| {
				SettingsError::EnvError(format!("{} is not a number: {}", ENV_POOL_SIZE, e))
			})?;
		}

		tracing::debug!(
			namespace = %settings.namespace,
			serializer = %settings.serializer,
			"Loaded region cache settings from environment"
		);

		Ok(settings)
	}

	/// Load settings from a `.toml` or `.json` file
	pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let contents = std::fs::read_to_string(&path).map_err(|e| {
			SettingsError::FileError(format!("Failed to read {}: {}", path.display(), e))
		})?;

		let settings: RegionCacheSettings =
			if path.extension().and_then(|s| s.to_str()) == Some("toml") {
				toml::from_str(&contents)
					.map_err(|e| SettingsError::ParseError(format!("TOML parse error: {}", e)))?
			} else if path.extension().and_then(|s| s.to_str()) == Some("json") {
				serde_json::from_str(&contents)
					.map_err(|e| SettingsError::ParseError(format!("JSON parse error: {}", e)))?
			} else {
				return Err(SettingsError::UnsupportedFormat(
					"Supported formats: .toml, .json".to_string(),
				));
			};

		Ok(settings)
	}
}

fn parse_bool(value: &str) -> Option<bool> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("true", Some(true))]
	#[case("1", Some(true))]
	#[case("On", Some(true))]
	#[case("false", Some(false))]
	#[case("0", Some(false))]
	#[case("maybe", None)]
	fn test_parse_bool(#[case] input: &str, #[case] expected: Option<bool>) {
		assert_eq!(parse_bool(input), expected);
	}

	#[rstest]
	fn test_default_ttl_zero_disables_expiry() {
		// Arrange
		let settings = RegionCacheSettings::default();

		// Act
		let ttl = settings.default_ttl();

		// Assert
		assert_eq!(ttl, None);
	}

	#[rstest]
	fn test_default_ttl_seconds() {
		let settings = RegionCacheSettings::default().with_default_timeout(90);
		assert_eq!(settings.default_ttl(), Some(Duration::from_secs(90)));
	}

	#[rstest]
	#[case("", true)]
	#[case("shop:", true)]
	#[case("my shop:", false)]
	fn test_validate_namespace(#[case] namespace: &str, #[case] valid: bool) {
		let settings = RegionCacheSettings::default().with_namespace(namespace);
		assert_eq!(settings.validate().is_ok(), valid);
	}

	#[rstest]
	#[case("redis://localhost:6379/5", true)]
	#[case("rediss://cache.internal", true)]
	#[case("memcached://localhost", false)]
	fn test_validate_redis_url(#[case] url: &str, #[case] valid: bool) {
		let settings = RegionCacheSettings::default().with_redis_url(url);
		assert_eq!(settings.validate().is_ok(), valid);
	}

	#[rstest]
	fn test_validate_rejects_zero_pool() {
		let mut settings = RegionCacheSettings::default();
		settings.pool_size = 0;
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::ValidationError(_))
		));
	}

	#[rstest]
	fn test_from_map_rejects_bad_timeout() {
		// Arrange
		let mut vars = HashMap::new();
		vars.insert(ENV_TIMEOUT.to_string(), "soon".to_string());

		// Act
		let result = RegionCacheSettings::from_map(&vars);

		// Assert
		assert!(matches!(result, Err(SettingsError::EnvError(_))));
	}

	#[rstest]
	fn test_from_map_reads_every_variable() {
		// Arrange
		let vars: HashMap<String, String> = [
			(ENV_REDIS_URL, "redis://cache:6379/2"),
			(ENV_NAMESPACE, "app:"),
			(ENV_TIMEOUT, "30"),
			(ENV_REFRESH_ON_WRITE, "no"),
			(ENV_SERIALIZER, "msgpack"),
			(ENV_POOL_SIZE, "4"),
		]
		.into_iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect();

		// Act
		let settings = RegionCacheSettings::from_map(&vars).unwrap();

		// Assert
		assert_eq!(settings.redis_url.as_deref(), Some("redis://cache:6379/2"));
		assert_eq!(settings.namespace, "app:");
		assert_eq!(settings.default_timeout, 30);
		assert!(!settings.refresh_on_write);
		assert_eq!(settings.serializer, "msgpack");
		assert_eq!(settings.pool_size, 4);
	}
}
