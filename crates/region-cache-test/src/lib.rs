//! # region-cache-test
//!
//! Testing utilities for region-cache.
//!
//! - [`fixtures`]: rstest fixtures for stores and region caches
//! - [`FaultyStore`]: a store wrapper that injects connection failures
//! - `fixtures::testcontainers` (feature `testcontainers`): a Redis 7 container
//!   and Redis-backed region caches
//!
//! ```rust,ignore
//! use region_cache_core::RegionCache;
//! use region_cache_test::fixtures::region_cache;
//! use rstest::*;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn test_roundtrip(region_cache: RegionCache) {
//!     let region = region_cache.region("abc").await.unwrap();
//!     region.set("k", &1).await.unwrap();
//!     assert_eq!(region.get::<i32>("k").await.unwrap(), Some(1));
//! }
//! ```

pub mod faulty;
pub mod fixtures;

pub use faulty::{FaultMode, FaultyStore};
pub use fixtures::*;
