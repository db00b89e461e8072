//! Shared key-value capability the bucket is built on.
//!
//! Every quota decision funnels through [`QuotaStore::transaction`], a
//! single-key optimistic transaction: the body runs against a watched key and
//! is rerun from the start whenever another party modifies the key before the
//! body's writes land. Any store with CAS, versioned writes or server-side
//! scripting can provide it.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::StoreError;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod retry;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use retry::TxRetryPolicy;

/// Remaining lifetime of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyTtl {
    Absent,
    /// Key exists without an expiry.
    Persistent,
    Expires(Duration),
}

/// Operations available to a transaction body. All of them address the
/// watched key.
///
/// Writes fail with [`StoreError::Conflict`] when the key changed since it
/// was watched; bodies propagate that with `?` and the store reruns them.
#[async_trait]
pub trait StoreTx: Send {
    async fn read_int(&mut self) -> Result<Option<i64>, StoreError>;

    async fn set_with_ttl(&mut self, value: i64, ttl: Duration) -> Result<(), StoreError>;

    async fn increment_by(&mut self, amount: i64) -> Result<i64, StoreError>;

    async fn remaining_ttl(&mut self) -> Result<KeyTtl, StoreError>;
}

#[async_trait]
pub trait TxBody: Send + Sync {
    type Output: Send;

    async fn run(&self, tx: &mut dyn StoreTx) -> Result<Self::Output, StoreError>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn read_int(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError>;

    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64, StoreError>;

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    async fn transaction<B>(&self, key: &str, body: &B) -> Result<B::Output, StoreError>
    where
        B: TxBody;
}
