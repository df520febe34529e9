//! Redis store backend
//!
//! Connections come from a deadpool-redis pool. Batches are sent as a
//! `MULTI`/`EXEC` pipeline, so every process sharing the server observes either
//! the whole batch or none of it.

use super::{ExpireMode, RegionStore, StoreCommand, StoreReply};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::{AsyncCommands, Value};
use region_cache_conf::RegionCacheSettings;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Redis-backed [`RegionStore`]
///
/// # Examples
///
/// ```no_run
/// use region_cache_core::store::RedisStore;
///
/// let store = RedisStore::new("redis://localhost:6379/5").unwrap();
/// ```
#[derive(Clone)]
pub struct RedisStore {
	pool: Pool,
}

impl std::fmt::Debug for RedisStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RedisStore")
			.field("status", &self.pool.status())
			.finish()
	}
}

impl RedisStore {
	/// Create a store with the default pool configuration
	pub fn new(connection_url: impl Into<String>) -> StoreResult<Self> {
		Self::with_pool_config(PoolConfig::from_url(connection_url.into()))
	}

	/// Create a store with a custom pool configuration
	pub fn with_pool_config(config: PoolConfig) -> StoreResult<Self> {
		let pool = config
			.create_pool(Some(Runtime::Tokio1))
			.map_err(|e| StoreError::Unavailable(format!("Failed to create Redis pool: {}", e)))?;

		Ok(Self { pool })
	}

	/// Create a store from settings; `redis_url` must be set
	pub fn from_settings(settings: &RegionCacheSettings) -> StoreResult<Self> {
		let url = settings.redis_url.clone().ok_or_else(|| {
			StoreError::Unavailable(format!(
				"{} is not configured",
				region_cache_conf::ENV_REDIS_URL
			))
		})?;

		let mut config = PoolConfig::from_url(url);
		config.pool = Some(deadpool_redis::PoolConfig::new(settings.pool_size));
		Self::with_pool_config(config)
	}

	/// Get the connection pool
	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	async fn connection(&self) -> StoreResult<Connection> {
		self.pool.get().await.map_err(|e| {
			StoreError::Unavailable(format!("Failed to get connection from pool: {}", e))
		})
	}
}

/// Whole milliseconds, rounded up so a non-zero TTL never becomes `PEXPIRE 0`
fn millis(ttl: Duration) -> u64 {
	u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

fn queue(pipe: &mut redis::Pipeline, command: &StoreCommand) {
	match command {
		StoreCommand::HashSet { key, field, value } => {
			pipe.cmd("HSET").arg(key).arg(field).arg(value.as_slice());
		}
		StoreCommand::HashDel { key, field } => {
			pipe.cmd("HDEL").arg(key).arg(field);
		}
		StoreCommand::HashGet { key, field } => {
			pipe.cmd("HGET").arg(key).arg(field);
		}
		StoreCommand::HashExists { key, field } => {
			pipe.cmd("HEXISTS").arg(key).arg(field);
		}
		StoreCommand::KeyDelete { key } => {
			pipe.cmd("DEL").arg(key);
		}
		StoreCommand::SetAdd { key, member } => {
			pipe.cmd("SADD").arg(key).arg(member);
		}
		StoreCommand::SetRemove { key, member } => {
			pipe.cmd("SREM").arg(key).arg(member);
		}
		StoreCommand::SetMembers { key } => {
			pipe.cmd("SMEMBERS").arg(key);
		}
		StoreCommand::Expire { key, ttl, mode } => {
			let cmd = pipe.cmd("PEXPIRE").arg(key).arg(millis(*ttl));
			if *mode == ExpireMode::IfUnset {
				cmd.arg("NX");
			}
		}
	}
}

fn reply(command: &StoreCommand, value: &Value) -> StoreResult<StoreReply> {
	let reply = match command {
		StoreCommand::HashGet { .. } => StoreReply::Value(redis::from_redis_value(value)?),
		StoreCommand::SetMembers { .. } => {
			StoreReply::Members(redis::from_redis_value::<HashSet<String>>(value)?)
		}
		_ => StoreReply::Flag(redis::from_redis_value::<i64>(value)? > 0),
	};
	Ok(reply)
}

#[async_trait]
impl RegionStore for RedisStore {
	async fn execute_atomic(&self, commands: Vec<StoreCommand>) -> StoreResult<Vec<StoreReply>> {
		if commands.is_empty() {
			return Ok(Vec::new());
		}

		let mut pipe = redis::pipe();
		pipe.atomic();
		for command in &commands {
			queue(&mut pipe, command);
		}

		let mut conn = self.connection().await?;
		tracing::debug!(commands = commands.len(), "Executing MULTI/EXEC batch");
		let values: Vec<Value> = pipe.query_async(&mut conn).await?;

		if values.len() != commands.len() {
			return Err(StoreError::Rejected(format!(
				"EXEC returned {} replies for {} commands",
				values.len(),
				commands.len()
			)));
		}

		commands
			.iter()
			.zip(values.iter())
			.map(|(command, value)| reply(command, value))
			.collect()
	}

	async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
		let mut conn = self.connection().await?;
		Ok(conn.hget(key, field).await?)
	}

	async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
		let mut conn = self.connection().await?;
		Ok(conn.hexists(key, field).await?)
	}

	async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>> {
		let mut conn = self.connection().await?;
		Ok(conn.smembers(key).await?)
	}

	async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
		let mut conn = self.connection().await?;
		Ok(conn.hgetall(key).await?)
	}

	async fn hash_len(&self, key: &str) -> StoreResult<usize> {
		let mut conn = self.connection().await?;
		Ok(conn.hlen(key).await?)
	}

	async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
		let mut conn = self.connection().await?;
		let remaining: i64 = conn.pttl(key).await?;
		// -2: no such key, -1: no expiry
		Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
	}

	async fn ping(&self) -> StoreResult<()> {
		let mut conn = self.connection().await?;
		let _: String = redis::cmd("PING").query_async(&mut conn).await?;
		Ok(())
	}
}
