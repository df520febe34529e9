//! Store wrapper that injects failures
//!
//! [`FaultyStore`] forwards every call to a [`MemoryStore`] until a fault is
//! armed. Each fault mode models a different way a real connection can fail,
//! which lets tests check both sides of the "all or nothing" commit contract.

use async_trait::async_trait;
use parking_lot::Mutex;
use region_cache_core::store::{MemoryStore, RegionStore, StoreCommand, StoreReply};
use region_cache_core::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How an injected failure behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
	/// The connection is refused; nothing reaches the store
	Refused,
	/// The connection drops before the store applies anything
	Interrupted,
	/// The store applies the call but the acknowledgment is lost
	LostAck,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
	remaining_ok: usize,
	mode: FaultMode,
	sticky: bool,
}

/// [`RegionStore`] that fails on demand
///
/// # Examples
///
/// ```
/// use region_cache_core::store::{MemoryStore, RegionStore};
/// use region_cache_test::{FaultMode, FaultyStore};
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = FaultyStore::new(MemoryStore::new());
/// store.fail_next(FaultMode::Refused);
/// assert!(store.hash_set("abc", "k", b"v".to_vec()).await.is_err());
/// assert!(store.hash_set("abc", "k", b"v".to_vec()).await.is_ok());
/// # }
/// ```
#[derive(Debug)]
pub struct FaultyStore {
	inner: MemoryStore,
	fault: Mutex<Option<Fault>>,
	calls: AtomicUsize,
}

impl FaultyStore {
	pub fn new(inner: MemoryStore) -> Self {
		Self {
			inner,
			fault: Mutex::new(None),
			calls: AtomicUsize::new(0),
		}
	}

	/// The wrapped store, for inspecting state behind the fault
	pub fn inner(&self) -> &MemoryStore {
		&self.inner
	}

	/// Fail the next call only
	pub fn fail_next(&self, mode: FaultMode) {
		*self.fault.lock() = Some(Fault {
			remaining_ok: 0,
			mode,
			sticky: false,
		});
	}

	/// Let `calls` more calls through, then fail every call until [`heal`](Self::heal)
	pub fn fail_after(&self, calls: usize, mode: FaultMode) {
		*self.fault.lock() = Some(Fault {
			remaining_ok: calls,
			mode,
			sticky: true,
		});
	}

	/// Disarm any pending fault
	pub fn heal(&self) {
		*self.fault.lock() = None;
	}

	/// Number of calls received, failed ones included
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Decide whether this call fails, and how
	fn trip(&self) -> Option<FaultMode> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let mut slot = self.fault.lock();
		let fault = slot.as_mut()?;
		if fault.remaining_ok > 0 {
			fault.remaining_ok -= 1;
			return None;
		}

		let mode = fault.mode;
		if !fault.sticky {
			*slot = None;
		}
		tracing::debug!(?mode, "Injecting store fault");
		Some(mode)
	}

	async fn guarded<T, F>(&self, call: F) -> StoreResult<T>
	where
		F: std::future::Future<Output = StoreResult<T>>,
	{
		match self.trip() {
			None => call.await,
			Some(FaultMode::Refused) => {
				Err(StoreError::Unavailable("injected: connection refused".to_string()))
			}
			Some(FaultMode::Interrupted) => {
				Err(StoreError::Interrupted("injected: connection reset".to_string()))
			}
			Some(FaultMode::LostAck) => {
				call.await?;
				Err(StoreError::Interrupted(
					"injected: acknowledgment lost".to_string(),
				))
			}
		}
	}
}

#[async_trait]
impl RegionStore for FaultyStore {
	async fn execute_atomic(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<StoreReply>> {
		self.guarded(self.inner.execute_atomic(commands)).await
	}

	async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
		self.guarded(self.inner.hash_get_all(key)).await
	}

	async fn hash_len(&self, key: &str) -> StoreResult<usize> {
		self.guarded(self.inner.hash_len(key)).await
	}

	async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
		self.guarded(self.inner.ttl(key)).await
	}

	async fn ping(&self) -> StoreResult<()> {
		self.guarded(self.inner.ping()).await
	}
}
