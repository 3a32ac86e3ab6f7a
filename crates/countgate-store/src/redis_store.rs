//! RedisStore: the production backend.
//!
//! Wraps a single [`ConnectionManager`]: one multiplexed connection that is
//! cheap to clone per request and reconnects on its own after a drop. The
//! manager's own retry policy is the only retry anywhere in the request path.

use std::time::Duration;

use countgate_core::StoreUrl;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, ErrorKind, RedisError};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{KvStore, ServerInfo, StoreFuture};

/// Client-side connection policy.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    /// Reconnect attempts made by the connection manager.
    pub retries: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(3),
            retries: 1,
        }
    }
}

/// Shared Redis client. `Clone` hands out another handle to the same connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis server described by `url`.
    ///
    /// `rediss://` URLs negotiate TLS; `redis://` connects in plaintext.
    pub async fn connect(url: &StoreUrl, opts: &ClientOptions) -> StoreResult<Self> {
        let client = redis::Client::open(url.connection_string())
            .map_err(|e| StoreError::Open(format!("{url}: {e}")))?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(opts.connect_timeout)
            .set_response_timeout(opts.response_timeout)
            .set_number_of_retries(opts.retries);
        let conn = ConnectionManager::new_with_config(client, config)
            .await
            .map_err(|e| StoreError::Open(format!("{url}: {e}")))?;
        debug!(store = %url, tls = url.is_tls(), "redis connection established");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Sort a Redis error into the store error taxonomy.
fn classify(key: Option<&str>, e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
    {
        return StoreError::Unavailable(e.to_string());
    }
    let detail = e.to_string();
    let wrong_type = e.code() == Some("WRONGTYPE")
        || (e.kind() == ErrorKind::ResponseError
            && (detail.contains("not an integer") || detail.contains("would overflow")));
    match key {
        Some(key) if wrong_type => StoreError::NotInteger(key.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

impl KvStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let value: Option<String> = conn.get(key).await.map_err(|e| classify(Some(key), e))?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn();
            let _: () = conn
                .set(key, value)
                .await
                .map_err(|e| classify(Some(key), e))?;
            debug!(%key, "value stored");
            Ok(())
        })
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let mut conn = self.conn();
            let value: i64 = conn
                .incr(key, delta)
                .await
                .map_err(|e| classify(Some(key), e))?;
            Ok(value)
        })
    }

    fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let mut conn = self.conn();
            let value: i64 = conn
                .decr(key, delta)
                .await
                .map_err(|e| classify(Some(key), e))?;
            Ok(value)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn();
            let removed: u64 = conn.del(key).await.map_err(|e| classify(Some(key), e))?;
            Ok(removed > 0)
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn();
            let exists: bool = conn.exists(key).await.map_err(|e| classify(Some(key), e))?;
            Ok(exists)
        })
    }

    fn dbsize(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut conn = self.conn();
            let size: u64 = redis::cmd("DBSIZE")
                .query_async(&mut conn)
                .await
                .map_err(|e| classify(None, e))?;
            Ok(size)
        })
    }

    fn info<'a>(&'a self, section: Option<&'a str>) -> StoreFuture<'a, ServerInfo> {
        Box::pin(async move {
            let mut conn = self.conn();
            let mut cmd = redis::cmd("INFO");
            if let Some(section) = section {
                cmd.arg(section);
            }
            let raw: String = cmd
                .query_async(&mut conn)
                .await
                .map_err(|e| classify(None, e))?;
            Ok(ServerInfo::parse(&raw))
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn();
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| classify(None, e))?;
            Ok(())
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
