//! Invalidation triggers
//!
//! [`Region::invalidate_on`] connects a region to one or more [`EventSource`]s;
//! every delivery from a source runs the region's invalidation cascade. Payloads
//! are ignored and bindings live only as long as the source holds them.

use crate::error::Result;
use crate::region::Region;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Zero-argument async callback registered with an event source
pub type EventCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Something that can notify registered callbacks
pub trait EventSource: Send + Sync {
	/// Register `callback` to run on every event
	fn connect(&self, callback: EventCallback);
}

impl Region {
	/// Invalidate this region whenever any of `sources` fires
	///
	/// # Examples
	///
	/// ```
	/// use region_cache_core::{RegionCache, Signal};
	/// use region_cache_core::store::MemoryStore;
	/// use std::sync::Arc;
	///
	/// # #[tokio::main]
	/// # async fn main() -> region_cache_core::Result<()> {
	/// let cache = RegionCache::new(Arc::new(MemoryStore::new()));
	/// let region = cache.region("users").await?;
	/// let user_saved = Signal::new("user_saved");
	///
	/// region.invalidate_on(&[&user_saved]);
	/// region.set("alice", &1).await?;
	///
	/// user_saved.send().await;
	/// assert!(!region.contains("alice").await?);
	/// # Ok(())
	/// # }
	/// ```
	pub fn invalidate_on(&self, sources: &[&dyn EventSource]) {
		for source in sources {
			source.connect(invalidation_callback(self.clone()));
		}
		tracing::debug!(
			region = %self.name(),
			sources = sources.len(),
			"Bound region invalidation to event sources"
		);
	}

	/// Invalidate this region whenever a process-wide named [`Signal`] fires
	pub fn invalidate_on_signals(&self, names: &[&str]) {
		let signals: Vec<Signal> = names.iter().map(|name| signal(name)).collect();
		let sources: Vec<&dyn EventSource> =
			signals.iter().map(|s| s as &dyn EventSource).collect();
		self.invalidate_on(&sources);
	}
}

fn invalidation_callback(region: Region) -> EventCallback {
	Arc::new(move || -> BoxFuture<'static, Result<()>> {
		let region = region.clone();
		Box::pin(async move { region.invalidate().await })
	})
}

/// In-process event source
///
/// # Examples
///
/// ```
/// use region_cache_core::Signal;
///
/// # #[tokio::main]
/// # async fn main() {
/// let saved = Signal::new("saved");
/// saved.connect_fn(|| async { Ok(()) });
/// let results = saved.send().await;
/// assert_eq!(results.len(), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct Signal {
	name: String,
	receivers: Arc<RwLock<Vec<EventCallback>>>,
}

impl fmt::Debug for Signal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("name", &self.name)
			.field("receivers", &self.receiver_count())
			.finish()
	}
}

impl Signal {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			receivers: Arc::new(RwLock::new(Vec::new())),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Connect an async closure
	pub fn connect_fn<F, Fut>(&self, receiver: F)
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		self.connect(Arc::new(move || -> BoxFuture<'static, Result<()>> {
			Box::pin(receiver())
		}));
	}

	/// Run every receiver in connection order
	///
	/// A failing receiver is logged and does not stop the others.
	pub async fn send(&self) -> Vec<Result<()>> {
		let receivers = self.receivers.read().clone();
		let mut results = Vec::with_capacity(receivers.len());

		for receiver in receivers {
			let result = receiver().await;
			if let Err(e) = &result {
				tracing::warn!(signal = %self.name, error = %e, "Signal receiver failed");
			}
			results.push(result);
		}

		results
	}

	/// Send from a background task
	pub fn send_async(&self) {
		let signal = self.clone();
		tokio::spawn(async move {
			signal.send().await;
		});
	}

	pub fn receiver_count(&self) -> usize {
		self.receivers.read().len()
	}

	pub fn disconnect_all(&self) {
		self.receivers.write().clear();
	}
}

impl EventSource for Signal {
	fn connect(&self, callback: EventCallback) {
		self.receivers.write().push(callback);
	}
}

struct SignalRegistry {
	signals: RwLock<HashMap<String, Signal>>,
}

impl SignalRegistry {
	fn get_or_create(&self, name: &str) -> Signal {
		if let Some(signal) = self.signals.read().get(name) {
			return signal.clone();
		}

		self.signals
			.write()
			.entry(name.to_string())
			.or_insert_with(|| Signal::new(name))
			.clone()
	}
}

static GLOBAL_SIGNALS: Lazy<SignalRegistry> = Lazy::new(|| SignalRegistry {
	signals: RwLock::new(HashMap::new()),
});

/// Process-wide signal registered under `name`
pub fn signal(name: &str) -> Signal {
	GLOBAL_SIGNALS.get_or_create(name)
}

#[cfg(feature = "redis-backend")]
pub use self::redis_channel::{RedisChannelSource, publish_invalidation};

#[cfg(feature = "redis-backend")]
mod redis_channel {
	use super::{EventCallback, EventSource};
	use crate::error::{StoreError, StoreResult};
	use futures::StreamExt;
	use parking_lot::RwLock;
	use redis::AsyncCommands;
	use std::sync::Arc;
	use tokio::task::JoinHandle;

	/// Event source firing on every message published to a Redis channel
	///
	/// Lets one process trigger bound invalidations in every subscribed
	/// process. The subscription ends when the source is dropped.
	pub struct RedisChannelSource {
		channel: String,
		receivers: Arc<RwLock<Vec<EventCallback>>>,
		listener: JoinHandle<()>,
	}

	impl RedisChannelSource {
		/// Subscribe to `channel` on the server at `url`
		pub async fn subscribe(url: &str, channel: impl Into<String>) -> StoreResult<Self> {
			let channel = channel.into();
			let client = redis::Client::open(url)
				.map_err(|e| StoreError::Unavailable(format!("Invalid Redis URL: {}", e)))?;
			let mut pubsub = client.get_async_pubsub().await?;
			pubsub.subscribe(&channel).await?;

			let receivers: Arc<RwLock<Vec<EventCallback>>> = Arc::new(RwLock::new(Vec::new()));
			let listener_receivers = Arc::clone(&receivers);
			let listener_channel = channel.clone();

			let listener = tokio::spawn(async move {
				let mut messages = pubsub.into_on_message();
				while messages.next().await.is_some() {
					let callbacks = listener_receivers.read().clone();
					for callback in callbacks {
						if let Err(e) = callback().await {
							tracing::warn!(
								channel = %listener_channel,
								error = %e,
								"Invalidation callback failed"
							);
						}
					}
				}
				tracing::debug!(channel = %listener_channel, "Redis subscription closed");
			});

			tracing::debug!(channel = %channel, "Subscribed to invalidation channel");
			Ok(Self {
				channel,
				receivers,
				listener,
			})
		}

		pub fn channel(&self) -> &str {
			&self.channel
		}

		pub fn receiver_count(&self) -> usize {
			self.receivers.read().len()
		}
	}

	impl EventSource for RedisChannelSource {
		fn connect(&self, callback: EventCallback) {
			self.receivers.write().push(callback);
		}
	}

	impl Drop for RedisChannelSource {
		fn drop(&mut self) {
			self.listener.abort();
		}
	}

	/// Publish an invalidation event on `channel`; returns the subscriber count
	pub async fn publish_invalidation(url: &str, channel: &str) -> StoreResult<usize> {
		let client = redis::Client::open(url)
			.map_err(|e| StoreError::Unavailable(format!("Invalid Redis URL: {}", e)))?;
		let mut conn = client.get_multiplexed_async_connection().await?;
		let receivers: usize = conn.publish(channel, "invalidate").await?;
		Ok(receivers)
	}
}
