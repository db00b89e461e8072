use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, RedisError};
use tokio::time::sleep;
use tracing::trace;

use super::retry::TxRetryState;
use super::{KeyTtl, QuotaStore, StoreTx, TxBody, TxRetryPolicy};
use crate::config::RedisSettings;
use crate::errors::StoreError;

/// Redis-backed store.
///
/// Plain commands go through a shared `ConnectionManager`. Transactions
/// check out a dedicated connection from a small idle pool, since `WATCH`
/// state belongs to the connection and must not be shared with concurrent
/// callers. The connection is kept for every rerun of the body.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    manager: ConnectionManager,
    prefix: Arc<String>,
    retry: TxRetryPolicy,
    idle: Arc<Mutex<Vec<MultiplexedConnection>>>,
}

const MAX_IDLE_TX_CONNECTIONS: usize = 8;

impl RedisStore {
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StoreError> {
        let url = settings.connection_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|err| StoreError::unavailable(format!("redis client: {err}")))?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|err| StoreError::unavailable(format!("redis connect: {err}")))?;
        Ok(Self {
            client,
            manager,
            prefix: Arc::new(settings.key_prefix.clone()),
            retry: TxRetryPolicy::default().with_max_attempts(settings.max_tx_attempts),
            idle: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn with_retry_policy(mut self, retry: TxRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connections currently parked for reuse by transactions.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    async fn checkout(&self) -> Result<MultiplexedConnection, StoreError> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|err| StoreError::unavailable(format!("redis connect: {err}"))),
        }
    }

    async fn checkin(&self, mut conn: MultiplexedConnection) {
        // A parked connection must not carry a WATCH into the next transaction.
        if redis::cmd("UNWATCH")
            .query_async::<_, ()>(&mut conn)
            .await
            .is_err()
        {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_TX_CONNECTIONS {
            idle.push(conn);
        }
    }

    fn namespaced_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }
}

fn map_redis_err(key: &str, op: &str, err: RedisError) -> StoreError {
    if err.kind() == redis::ErrorKind::TypeError {
        StoreError::corrupt(key, err.to_string())
    } else {
        StoreError::unavailable(format!("redis {op}: {err}"))
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

fn key_ttl(pttl: i64) -> KeyTtl {
    match pttl {
        -2 => KeyTtl::Absent,
        -1 => KeyTtl::Persistent,
        ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
    }
}

#[async_trait]
impl QuotaStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| StoreError::unavailable(format!("redis ping: {err}")))
    }

    async fn read_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let key = self.namespaced_key(key);
        let mut conn = self.manager.clone();
        conn.get(&key)
            .await
            .map_err(|err| map_redis_err(&key, "get", err))
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let key = self.namespaced_key(key);
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|err| map_redis_err(&key, "set", err))
    }

    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
        let key = self.namespaced_key(key);
        let mut conn = self.manager.clone();
        conn.incr(&key, amount)
            .await
            .map_err(|err| map_redis_err(&key, "incrby", err))
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let key = self.namespaced_key(key);
        let mut conn = self.manager.clone();
        let pttl: i64 = redis::cmd("PTTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|err| map_redis_err(&key, "pttl", err))?;
        Ok(key_ttl(pttl))
    }

    async fn transaction<B>(&self, key: &str, body: &B) -> Result<B::Output, StoreError>
    where
        B: TxBody,
    {
        let key = self.namespaced_key(key);
        let mut retry = TxRetryState::new(&self.retry);
        let mut conn = self.checkout().await?;
        let outcome = loop {
            let mut tx = RedisTx {
                conn: &mut conn,
                key: &key,
            };
            if let Err(err) = tx.watch().await {
                break Err(err);
            }

            match body.run(&mut tx).await {
                // A nil EXEC already cleared the watch; the next pass re-arms it.
                Err(err) if err.is_conflict() => match retry.next_delay() {
                    Some(delay) => {
                        trace!(key = %key, attempt = retry.attempts(), "redis transaction conflict");
                        sleep(delay).await;
                    }
                    None => {
                        break Err(StoreError::RetriesExhausted {
                            key: key.clone(),
                            attempts: retry.attempts(),
                        })
                    }
                },
                other => break other,
            }
        };

        // Connections that failed at the transport level are not reused.
        if !matches!(outcome, Err(StoreError::Unavailable(_))) {
            self.checkin(conn).await;
        }
        outcome
    }
}

struct RedisTx<'a> {
    conn: &'a mut MultiplexedConnection,
    key: &'a str,
}

impl RedisTx<'_> {
    async fn watch(&mut self) -> Result<(), StoreError> {
        redis::cmd("WATCH")
            .arg(self.key)
            .query_async::<_, ()>(&mut *self.conn)
            .await
            .map_err(|err| map_redis_err(self.key, "watch", err))
    }
}

#[async_trait]
impl StoreTx for RedisTx<'_> {
    async fn read_int(&mut self) -> Result<Option<i64>, StoreError> {
        let key = self.key;
        self.conn
            .get(key)
            .await
            .map_err(|err| map_redis_err(key, "get", err))
    }

    async fn set_with_ttl(&mut self, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let reply: Option<redis::Value> = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *self.conn)
            .await
            .map_err(|err| map_redis_err(self.key, "set", err))?;
        if reply.is_none() {
            return Err(StoreError::conflict(self.key));
        }
        // EXEC clears the watch; re-arm it for the rest of the body.
        self.watch().await
    }

    async fn increment_by(&mut self, amount: i64) -> Result<i64, StoreError> {
        let reply: Option<(i64,)> = redis::pipe()
            .atomic()
            .incr(self.key, amount)
            .query_async(&mut *self.conn)
            .await
            .map_err(|err| map_redis_err(self.key, "incrby", err))?;
        let (count,) = reply.ok_or_else(|| StoreError::conflict(self.key))?;
        self.watch().await?;
        Ok(count)
    }

    async fn remaining_ttl(&mut self) -> Result<KeyTtl, StoreError> {
        let pttl: i64 = redis::cmd("PTTL")
            .arg(self.key)
            .query_async(&mut *self.conn)
            .await
            .map_err(|err| map_redis_err(self.key, "pttl", err))?;
        Ok(key_ttl(pttl))
    }
}
