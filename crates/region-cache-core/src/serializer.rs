//! Value codecs
//!
//! Regions convert typed values to a [`serde_json::Value`] tree and hand it to a
//! [`Serializer`] for the byte encoding stored in the region hash. JSON is the
//! default; MessagePack is available for denser payloads.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name under which [`JsonSerializer`] is registered
pub const JSON: &str = "json";
/// Name under which [`MessagePackSerializer`] is registered
pub const MSGPACK: &str = "msgpack";

/// Encoding or decoding failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Byte codec for region values
///
/// `decode(encode(v))` must equal `v` for every value the codec accepts.
pub trait Serializer: Send + Sync + fmt::Debug {
	/// Name used to select the codec from configuration
	fn name(&self) -> &str;

	fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

	fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// JSON codec (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
	fn name(&self) -> &str {
		JSON
	}

	fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
		serde_json::to_vec(value).map_err(|e| CodecError(e.to_string()))
	}

	fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
		serde_json::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
	}
}

/// MessagePack codec backed by rmp-serde
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
	fn name(&self) -> &str {
		MSGPACK
	}

	fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
		rmp_serde::to_vec_named(value).map_err(|e| CodecError(e.to_string()))
	}

	fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
		rmp_serde::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
	}
}

/// Serializers available by name
///
/// # Examples
///
/// ```
/// use region_cache_core::serializer::SerializerRegistry;
///
/// let registry = SerializerRegistry::new();
/// assert!(registry.resolve("json").is_some());
/// assert!(registry.resolve("msgpack").is_some());
/// assert!(registry.resolve("pickle").is_none());
/// ```
#[derive(Debug)]
pub struct SerializerRegistry {
	serializers: RwLock<HashMap<String, Arc<dyn Serializer>>>,
}

impl Default for SerializerRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl SerializerRegistry {
	/// Registry holding the built-in codecs
	pub fn new() -> Self {
		let registry = Self {
			serializers: RwLock::new(HashMap::new()),
		};
		registry.register(Arc::new(JsonSerializer));
		registry.register(Arc::new(MessagePackSerializer));
		registry
	}

	/// Register a codec under its own name, replacing any previous one
	pub fn register(&self, serializer: Arc<dyn Serializer>) {
		let name = serializer.name().to_string();
		tracing::debug!(serializer = %name, "Registered serializer");
		self.serializers.write().insert(name, serializer);
	}

	pub fn resolve(&self, name: &str) -> Option<Arc<dyn Serializer>> {
		self.serializers.read().get(name).cloned()
	}

	/// Registered names, sorted
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.serializers.read().keys().cloned().collect();
		names.sort();
		names
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	#[case::json(Arc::new(JsonSerializer) as Arc<dyn Serializer>)]
	#[case::msgpack(Arc::new(MessagePackSerializer) as Arc<dyn Serializer>)]
	fn test_nested_value_roundtrip(#[case] serializer: Arc<dyn Serializer>) {
		// Arrange
		let value = json!({"a": [1, null, "x"], "b": {"c": true}});

		// Act
		let bytes = serializer.encode(&value).unwrap();
		let decoded = serializer.decode(&bytes).unwrap();

		// Assert
		assert_eq!(decoded, value);
	}

	#[rstest]
	fn test_json_decode_garbage_fails() {
		let result = JsonSerializer.decode(b"{not json");

		assert!(result.is_err());
	}

	#[rstest]
	fn test_msgpack_is_denser_than_json() {
		let value = json!([1, 2, 3, 4, 5, 6, 7, 8]);

		let packed = MessagePackSerializer.encode(&value).unwrap();
		let text = JsonSerializer.encode(&value).unwrap();

		assert!(packed.len() < text.len());
	}

	#[derive(Debug)]
	struct Upper;

	impl Serializer for Upper {
		fn name(&self) -> &str {
			JSON
		}

		fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
			JsonSerializer.encode(value)
		}

		fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
			JsonSerializer.decode(bytes)
		}
	}

	#[rstest]
	fn test_register_replaces_same_name() {
		// Arrange
		let registry = SerializerRegistry::new();

		// Act
		registry.register(Arc::new(Upper));

		// Assert
		let resolved = registry.resolve(JSON).unwrap();
		assert!(format!("{:?}", resolved).contains("Upper"));
		assert_eq!(registry.names(), vec!["json", "msgpack"]);
	}
}
