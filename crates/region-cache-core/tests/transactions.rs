//! Transaction scope tests
//!
//! Atomicity is checked with a fault-injecting store: a refused commit must
//! leave nothing behind, and a commit whose acknowledgment is lost must have
//! applied every write.

use region_cache_core::{RegionCache, RegionCacheError};
use region_cache_test::{FaultMode, FaultyStore, fixtures::*};
use rstest::*;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Value whose serialization always fails
struct Unserializable;

impl Serialize for Unserializable {
	fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
		Err(serde::ser::Error::custom("cannot serialize"))
	}
}

#[rstest]
#[tokio::test]
async fn test_transaction_commits_all_writes(region_cache: RegionCache) {
	// Arrange
	let region = region_cache.region("abc").await.unwrap();
	region.set("stale", &0).await.unwrap();

	// Act
	region
		.transaction(|tx| async move {
			tx.set("a", &1)?;
			tx.set("b", &2)?;
			tx.delete("stale");
			Ok(())
		})
		.await
		.unwrap();

	// Assert
	assert_eq!(region.get::<i32>("a").await.unwrap(), Some(1));
	assert_eq!(region.get::<i32>("b").await.unwrap(), Some(2));
	assert!(!region.contains("stale").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_reads_inside_scope_see_committed_state(region_cache: RegionCache) {
	let region = region_cache.region("abc").await.unwrap();
	region.set("a", &"old").await.unwrap();

	let seen = region
		.transaction(|tx| async move {
			tx.set("a", &"new")?;
			tx.get::<String>("a").await
		})
		.await
		.unwrap();

	assert_eq!(seen.as_deref(), Some("old"));
	assert_eq!(
		region.get::<String>("a").await.unwrap().as_deref(),
		Some("new")
	);
}

#[rstest]
#[tokio::test]
async fn test_body_error_still_commits(region_cache: RegionCache) {
	// Arrange
	let region = region_cache.region("abc").await.unwrap();

	// Act
	let result: Result<(), RegionCacheError> = region
		.transaction(|tx| async move {
			tx.set("a", &1)?;
			Err(RegionCacheError::Configuration("body failed".to_string()))
		})
		.await;

	// Assert
	match result {
		Err(RegionCacheError::Configuration(message)) => assert_eq!(message, "body failed"),
		other => panic!("Expected the body's error, got {:?}", other),
	}
	assert!(region.contains("a").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_serialization_error_keeps_other_writes_queued(region_cache: RegionCache) {
	let region = region_cache.region("abc").await.unwrap();
	let scope = region.begin();
	scope.set("good", &1).unwrap();

	let err = scope.set("bad", &Unserializable).unwrap_err();
	scope.set("also-good", &2).unwrap();
	scope.commit().await.unwrap();

	assert!(matches!(err, RegionCacheError::Serialization { ref key, .. } if key == "bad"));
	assert_eq!(region.keys().await.unwrap(), vec!["also-good", "good"]);
}

#[rstest]
#[tokio::test]
async fn test_refused_commit_applies_nothing(
	faulty_cache: (RegionCache, Arc<FaultyStore>),
) {
	// Arrange
	let (cache, store) = faulty_cache;
	let region = cache.region("abc").await.unwrap();
	let scope = region.begin();
	scope.set("a", &1).unwrap();
	scope.set("b", &2).unwrap();

	// Act
	store.fail_next(FaultMode::Refused);
	let result = scope.commit().await;

	// Assert
	assert!(matches!(
		result,
		Err(RegionCacheError::StoreConnection { .. })
	));
	assert!(!region.contains("a").await.unwrap());
	assert!(!region.contains("b").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_interrupted_commit_is_unknown_and_atomic(
	faulty_cache: (RegionCache, Arc<FaultyStore>),
) {
	let (cache, store) = faulty_cache;
	let region = cache.region("abc").await.unwrap();
	let scope = region.begin();
	scope.set("a", &1).unwrap();
	scope.set("b", &2).unwrap();

	store.fail_next(FaultMode::Interrupted);
	let result = scope.commit().await;

	let err = result.unwrap_err();
	assert!(err.is_commit_unknown());
	assert!(err.is_idempotent_retry_safe());
	let a = region.contains("a").await.unwrap();
	let b = region.contains("b").await.unwrap();
	assert_eq!(a, b, "writes must be visible together or not at all");
}

#[rstest]
#[tokio::test]
async fn test_lost_acknowledgment_applied_every_write(
	faulty_cache: (RegionCache, Arc<FaultyStore>),
) {
	// Arrange
	let (cache, store) = faulty_cache;
	let region = cache.region("abc").await.unwrap();

	// Act
	store.fail_next(FaultMode::LostAck);
	let result = region
		.transaction(|tx| async move {
			tx.set("a", &1)?;
			tx.set("b", &2)?;
			Ok(())
		})
		.await;

	// Assert
	assert!(matches!(
		result,
		Err(RegionCacheError::TransactionCommitUnknown { .. })
	));
	assert!(region.contains("a").await.unwrap());
	assert!(region.contains("b").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_single_write_failure_surfaces(faulty_cache: (RegionCache, Arc<FaultyStore>)) {
	let (cache, store) = faulty_cache;
	let region = cache.region("abc").await.unwrap();

	store.fail_next(FaultMode::Refused);
	let result = region.set("a", &1).await;

	match result {
		Err(RegionCacheError::StoreConnection {
			operation, region, ..
		}) => {
			assert_eq!(operation, "set");
			assert_eq!(region, "abc");
		}
		other => panic!("Expected connection error, got {:?}", other),
	}
}
