use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use super::retry::TxRetryState;
use super::{KeyTtl, QuotaStore, StoreTx, TxBody, TxRetryPolicy};
use crate::errors::StoreError;

/// In-process store for single-replica deployments and tests.
///
/// Expiry is evaluated lazily against the Tokio clock. Every write stamps the
/// slot with a version drawn from one store-wide sequence, which is what
/// transactions compare against.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Slots>>,
    retry: TxRetryPolicy,
}

#[derive(Debug, Default)]
struct Slots {
    map: HashMap<String, Slot>,
    sequence: u64,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    value: i64,
    expires_at: Option<Instant>,
    version: u64,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl Slots {
    fn live(&self, key: &str, now: Instant) -> Option<&Slot> {
        self.map.get(key).filter(|slot| slot.is_live(now))
    }

    fn version(&self, key: &str) -> Option<u64> {
        self.map.get(key).map(|slot| slot.version)
    }

    fn write(&mut self, key: &str, value: i64, expires_at: Option<Instant>) -> u64 {
        self.sequence += 1;
        let version = self.sequence;
        self.map.insert(
            key.to_string(),
            Slot {
                value,
                expires_at,
                version,
            },
        );
        version
    }

    fn increment(&mut self, key: &str, amount: i64, now: Instant) -> Result<(i64, u64), StoreError> {
        let (current, expires_at) = match self.live(key, now) {
            Some(slot) => (slot.value, slot.expires_at),
            None => (0, None),
        };
        let next = current
            .checked_add(amount)
            .ok_or_else(|| StoreError::corrupt(key, "increment overflows i64"))?;
        let version = self.write(key, next, expires_at);
        Ok((next, version))
    }

    fn ttl(&self, key: &str, now: Instant) -> KeyTtl {
        match self.live(key, now) {
            None => KeyTtl::Absent,
            Some(Slot {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(mut self, retry: TxRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Drops slots whose TTL has lapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.inner.lock();
        let before = slots.map.len();
        slots.map.retain(|_, slot| slot.is_live(now));
        before - slots.map.len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .map
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn read_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.lock().live(key, Instant::now()).map(|slot| slot.value))
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        self.inner.lock().write(key, value, Some(expires_at));
        Ok(())
    }

    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
        let (next, _) = self.inner.lock().increment(key, amount, Instant::now())?;
        Ok(next)
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        Ok(self.inner.lock().ttl(key, Instant::now()))
    }

    async fn transaction<B>(&self, key: &str, body: &B) -> Result<B::Output, StoreError>
    where
        B: TxBody,
    {
        let mut retry = TxRetryState::new(&self.retry);
        loop {
            let watched = self.inner.lock().version(key);
            let mut tx = MemoryTx {
                slots: &self.inner,
                key,
                watched,
            };
            match body.run(&mut tx).await {
                Err(err) if err.is_conflict() => match retry.next_delay() {
                    Some(delay) => {
                        trace!(key, attempt = retry.attempts(), "memory transaction conflict");
                        sleep(delay).await;
                    }
                    None => {
                        return Err(StoreError::RetriesExhausted {
                            key: key.to_string(),
                            attempts: retry.attempts(),
                        })
                    }
                },
                other => return other,
            }
        }
    }
}

struct MemoryTx<'a> {
    slots: &'a Mutex<Slots>,
    key: &'a str,
    watched: Option<u64>,
}

impl MemoryTx<'_> {
    fn check(&self, slots: &Slots) -> Result<(), StoreError> {
        if slots.version(self.key) == self.watched {
            Ok(())
        } else {
            Err(StoreError::conflict(self.key))
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx<'_> {
    async fn read_int(&mut self) -> Result<Option<i64>, StoreError> {
        let slots = self.slots.lock();
        self.check(&slots)?;
        Ok(slots.live(self.key, Instant::now()).map(|slot| slot.value))
    }

    async fn set_with_ttl(&mut self, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let mut slots = self.slots.lock();
        self.check(&slots)?;
        let expires_at = Instant::now() + ttl;
        self.watched = Some(slots.write(self.key, value, Some(expires_at)));
        Ok(())
    }

    async fn increment_by(&mut self, amount: i64) -> Result<i64, StoreError> {
        let mut slots = self.slots.lock();
        self.check(&slots)?;
        let (next, version) = slots.increment(self.key, amount, Instant::now())?;
        self.watched = Some(version);
        Ok(next)
    }

    async fn remaining_ttl(&mut self) -> Result<KeyTtl, StoreError> {
        let slots = self.slots.lock();
        self.check(&slots)?;
        Ok(slots.ttl(self.key, Instant::now()))
    }
}
