//! services/api/src/adapters/redis_store.rs
//!
//! `KeyValueStore` backed by Redis.
//!
//! Conditional writes map onto `SET NX` / `SET XX`, counters onto `INCR` and
//! prefix enumeration onto a `SCAN` cursor loop, so every contract of the port
//! is enforced by the server rather than by a read-then-write in this process.

use async_trait::async_trait;
use pastebin_core::ports::{KeyValueStore, PortError, PortResult};
use redis::aio::MultiplexedConnection;
use redis::FromRedisValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;
/// Keys removed per `DEL` call during prefix deletion.
const DELETE_BATCH: usize = 500;

pub struct RedisStore {
    client: redis::Client,
    /// Cached multiplexed connection, dropped on connection-level errors.
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
}

impl RedisStore {
    /// Opens a client for `url` and checks the server answers `PING`.
    pub async fn connect(url: &str) -> PortResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| PortError::backend("opening redis client", e))?;
        let store = Self {
            client,
            connection: Arc::new(RwLock::new(None)),
        };

        let pong: String = store.query("pinging redis", redis::cmd("PING")).await?;
        debug!("Redis connection test successful: {}", pong);
        Ok(store)
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        {
            let guard = self.connection.read().await;
            if let Some(ref conn) = *guard {
                return Ok(conn.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(ref conn) = *guard {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        debug!("Redis connection established and cached");
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.connection.write().await = None;
        debug!("Redis connection reset due to error");
    }

    /// Runs one command on the shared connection.
    async fn query<T: FromRedisValue>(&self, context: &str, cmd: redis::Cmd) -> PortResult<T> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                self.reset_connection().await;
                return Err(PortError::backend(format!("{context} (connect)"), e));
            }
        };

        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    warn!("Redis connection error while {}: {}", context, e);
                    self.reset_connection().await;
                }
                Err(PortError::backend(context.to_string(), e))
            }
        }
    }

    /// Builds `SET key value [NX|XX] [PX ms]`.
    fn set_cmd(key: &str, value: &str, condition: Option<&str>, ttl: Option<Duration>) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(condition) = condition {
            cmd.arg(condition);
        }
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd
    }
}

/// Swaps the value only while it still equals ARGV[1]. `KEEPTTL` needs Redis 6.0.
const COMPARE_AND_SWAP_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
    return 1
end
return 0
";

fn compare_and_swap_cmd(key: &str, expected: &str, value: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("EVAL");
    cmd.arg(COMPARE_AND_SWAP_SCRIPT)
        .arg(1)
        .arg(key)
        .arg(expected)
        .arg(value);
    cmd
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escapes glob metacharacters so `prefix` is matched literally by `SCAN MATCH`.
fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("reading a key", cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> PortResult<()> {
        let _: () = self
            .query("writing a key", Self::set_cmd(key, value, None, ttl))
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> PortResult<bool> {
        // `SET NX` replies OK on success and nil otherwise.
        let reply: Option<String> = self
            .query("claiming a key", Self::set_cmd(key, value, Some("NX"), ttl))
            .await?;
        Ok(reply.is_some())
    }

    async fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> PortResult<bool> {
        let reply: Option<String> = self
            .query("replacing a key", Self::set_cmd(key, value, Some("XX"), ttl))
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> PortResult<bool> {
        let swapped: i64 = self
            .query("swapping a key", compare_and_swap_cmd(key, expected, value))
            .await?;
        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> PortResult<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: u64 = self.query("deleting a key", cmd).await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str) -> PortResult<u64> {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        self.query("incrementing a counter", cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> PortResult<bool> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(ttl_millis(ttl));
        let updated: i64 = self.query("setting a key expiry", cmd).await?;
        Ok(updated == 1)
    }

    async fn scan_prefix(&self, prefix: &str) -> PortResult<Vec<String>> {
        let pattern = match_pattern(prefix);
        // SCAN may return a key more than once across iterations.
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self.query("scanning keys", cmd).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys.into_iter().collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> PortResult<u64> {
        let keys = self.scan_prefix(prefix).await?;
        let mut removed = 0;
        for chunk in keys.chunks(DELETE_BATCH) {
            let mut cmd = redis::cmd("DEL");
            cmd.arg(chunk);
            let count: u64 = self.query("deleting keys by prefix", cmd).await?;
            removed += count;
        }
        Ok(removed)
    }
}
