//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace};

use super::{BucketCounts, CounterStore};
use crate::error::{GuardError, Result};

/// Reads the previous bucket and increments the current one in a single
/// atomic step. The expiry is only set when the increment created the key,
/// so later increments never extend a bucket's lifetime.
const INCREMENT_SCRIPT: &str = r#"
local previous = tonumber(redis.call('GET', KEYS[2]) or '0')
local current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return {current, previous}
"#;

/// Counter store backed by a Redis server.
///
/// The connection is established lazily on first use. A failed connect
/// surfaces as `StoreUnavailable` for that call and is retried by the next
/// one, so an unreachable Redis at startup does not keep the process down.
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    script: Script,
    /// Upper bound for any single operation, including connecting
    timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr.to_string())
            .field("connected", &self.connection.initialized())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisStore {
    /// Create a store for the given Redis URL.
    ///
    /// Only the URL is validated here; no connection is made.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| GuardError::Config(format!("invalid redis url: {}", e)))?;

        info!(
            addr = %client.get_connection_info().addr,
            timeout_ms = timeout.as_millis() as u64,
            "Redis counter store configured"
        );

        Ok(Self {
            client,
            connection: OnceCell::new(),
            script: Script::new(INCREMENT_SCRIPT),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("Connecting to Redis");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(conn.clone())
    }

    /// Run a store operation under the configured timeout.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GuardError::StoreUnavailable(format!(
                "redis {} timed out after {}ms",
                op,
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(
        &self,
        current_key: &str,
        previous_key: &str,
        expiry: Duration,
    ) -> Result<BucketCounts> {
        let expiry_ms = expiry.as_millis() as u64;
        let (current, previous): (u64, u64) = self
            .bounded("increment", async {
                let mut conn = self.connection().await?;
                let counts: (u64, u64) = self
                    .script
                    .key(current_key)
                    .key(previous_key)
                    .arg(expiry_ms)
                    .invoke_async(&mut conn)
                    .await?;
                Ok::<_, GuardError>(counts)
            })
            .await?;

        trace!(key = %current_key, current, previous, "Incremented redis counter");

        Ok(BucketCounts { current, previous })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bounded("delete", async {
            let mut conn = self.connection().await?;
            let _: () = conn.del(key).await?;
            Ok::<_, GuardError>(())
        })
        .await?;

        debug!(key = %key, "Deleted redis counter");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, GuardError>(())
        })
        .await
    }
}
