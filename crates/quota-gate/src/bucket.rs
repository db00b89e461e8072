//! Leaky-bucket consume/drain protocol over a shared counter.
//!
//! One counter per quota scope lives in the store with a TTL of one window.
//! `consume` reads and increments it inside a single optimistic transaction,
//! so concurrent callers in any number of processes serialize around the
//! key. The increment happens before the overflow check: under contention
//! the counter may overshoot capacity by one caller's amount, which is then
//! reported as exceeded and drained.
//!
//! Drain restarts a lapsed window through the same transaction primitive, so
//! a window another replica opened in the meantime is kept rather than
//! overwritten.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{BuildError, QuotaError, QuotaResult, StoreError};
use crate::metrics::QuotaMetrics;
use crate::state::BucketState;
use crate::store::{KeyTtl, QuotaStore, StoreTx, TxBody};

#[async_trait]
pub trait Bucket: Send + Sync {
    /// Consumes `amount` units. Implementations must be safe to call from
    /// many tasks at once and return [`QuotaError::QuotaExceeded`] when the
    /// quota is spent.
    async fn consume(&self, amount: u64) -> QuotaResult<BucketState>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketConfig {
    pub key: String,
    pub capacity: u64,
    pub window: Duration,
}

impl BucketConfig {
    pub fn new(key: impl Into<String>, capacity: u64, window: Duration) -> Self {
        Self {
            key: key.into(),
            capacity,
            window,
        }
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.key.trim().is_empty() {
            return Err(BuildError::Config("quota scope must not be empty".into()));
        }
        if self.capacity == 0 {
            return Err(BuildError::Config("capacity must be positive".into()));
        }
        if self.capacity > i64::MAX as u64 {
            return Err(BuildError::Config(format!(
                "capacity {} exceeds the store counter range",
                self.capacity
            )));
        }
        if self.window.is_zero() {
            return Err(BuildError::Config("window must be positive".into()));
        }
        Ok(())
    }
}

/// Local view of the scope. Guards only these advisory fields; it plays no
/// part in enforcing the quota.
struct Cached {
    space: u64,
    reset_at: Instant,
}

pub struct StoreBucket<S> {
    store: Arc<S>,
    key: String,
    capacity: u64,
    window: Duration,
    cached: Mutex<Cached>,
    metrics: QuotaMetrics,
}

impl<S: QuotaStore> StoreBucket<S> {
    /// Validates the config and checks the store is reachable before handing
    /// out a bucket.
    pub async fn connect(store: Arc<S>, config: BucketConfig) -> Result<Self, BuildError> {
        config.validate()?;
        store.ping().await.map_err(BuildError::Connectivity)?;
        debug!(
            key = %config.key,
            capacity = config.capacity,
            window_ms = config.window.as_millis() as u64,
            "quota bucket ready"
        );
        Ok(Self {
            store,
            key: config.key,
            capacity: config.capacity,
            window: config.window,
            cached: Mutex::new(Cached {
                space: config.capacity,
                reset_at: Instant::now(),
            }),
            metrics: QuotaMetrics::default(),
        })
    }

    pub fn with_metrics(mut self, metrics: QuotaMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn metrics(&self) -> &QuotaMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Last locally observed state, without touching the store.
    pub fn state(&self) -> BucketState {
        let cached = self.cached.lock();
        BucketState::new(self.capacity, cached.space, cached.reset_at)
    }

    /// Reconciles the window with the store. Never fails: store errors are
    /// logged and counted, and the last known state is returned.
    pub async fn drain(&self) -> BucketState {
        self.reconcile().await;
        self.state()
    }

    async fn reconcile(&self) -> Instant {
        if let Err(err) = self.try_drain().await {
            self.metrics.record_drain_failure();
            warn!(key = %self.key, error = %err, "quota drain failed");
        }
        let now = Instant::now();
        let mut cached = self.cached.lock();
        if cached.reset_at <= now {
            // No live window observed; assume a full one.
            cached.reset_at = now + self.window;
        }
        cached.reset_at
    }

    async fn try_drain(&self) -> Result<(), StoreError> {
        let body = DrainTx {
            window: self.window,
        };
        let reset_at = match self.store.transaction(&self.key, &body).await? {
            Window::Live(ttl) => Instant::now() + ttl,
            Window::Restarted => Instant::now() + self.window,
        };
        let mut cached = self.cached.lock();
        if reset_at > cached.reset_at {
            cached.reset_at = reset_at;
        }
        Ok(())
    }

    fn set_space(&self, space: u64) {
        self.cached.lock().space = space;
    }

    async fn reject(&self, counter: u64) -> QuotaError {
        self.set_space(0);
        let reset_at = self.reconcile().await;
        self.metrics.record_rejected();
        debug!(key = %self.key, counter, capacity = self.capacity, "quota exhausted");
        QuotaError::QuotaExceeded(BucketState::new(self.capacity, 0, reset_at))
    }
}

#[async_trait]
impl<S: QuotaStore> Bucket for StoreBucket<S> {
    async fn consume(&self, amount: u64) -> QuotaResult<BucketState> {
        let amount_i64 = i64::try_from(amount)
            .ok()
            .filter(|value| *value > 0)
            .ok_or(QuotaError::InvalidAmount(amount))?;

        let body = ConsumeTx {
            capacity: self.capacity as i64,
            window: self.window,
            amount: amount_i64,
        };
        let admission = match self.store.transaction(&self.key, &body).await {
            Ok(admission) => admission,
            Err(err) => {
                self.metrics.record_store_error();
                warn!(key = %self.key, error = %err, "quota consume failed");
                return Err(QuotaError::StoreUnavailable(err));
            }
        };

        match admission {
            Admission::Full { counter } => Err(self.reject(counter).await),
            Admission::Overflow { counter } => {
                self.metrics.record_overflow();
                Err(self.reject(counter).await)
            }
            Admission::Admitted { counter } => {
                let space = self.capacity.saturating_sub(counter);
                self.set_space(space);
                let reset_at = self.reconcile().await;
                self.metrics.record_accepted();
                let state = BucketState::new(self.capacity, space, reset_at);
                if state.is_exhausted() {
                    debug!(key = %self.key, "last unit of the window admitted");
                }
                Ok(state)
            }
        }
    }
}

#[derive(Debug)]
enum Admission {
    /// Counter already at capacity; nothing was written.
    Full { counter: u64 },
    /// Increment landed past capacity.
    Overflow { counter: u64 },
    Admitted { counter: u64 },
}

struct ConsumeTx {
    capacity: i64,
    window: Duration,
    amount: i64,
}

#[async_trait]
impl TxBody for ConsumeTx {
    type Output = Admission;

    async fn run(&self, tx: &mut dyn StoreTx) -> Result<Admission, StoreError> {
        let counter = match tx.read_int().await? {
            Some(counter) => counter,
            None => {
                tx.set_with_ttl(0, self.window).await?;
                0
            }
        };
        if counter >= self.capacity {
            return Ok(Admission::Full {
                counter: counter.max(0) as u64,
            });
        }

        let counter = tx.increment_by(self.amount).await?;
        let observed = counter.max(0) as u64;
        if counter > self.capacity {
            Ok(Admission::Overflow { counter: observed })
        } else {
            Ok(Admission::Admitted { counter: observed })
        }
    }
}

#[derive(Debug)]
enum Window {
    Live(Duration),
    Restarted,
}

/// Restarts the window when the counter has no live TTL. The check and the
/// reset share one watch, so a concurrent write reruns the body.
struct DrainTx {
    window: Duration,
}

#[async_trait]
impl TxBody for DrainTx {
    type Output = Window;

    async fn run(&self, tx: &mut dyn StoreTx) -> Result<Window, StoreError> {
        match tx.remaining_ttl().await? {
            KeyTtl::Expires(ttl) if !ttl.is_zero() => Ok(Window::Live(ttl)),
            _ => {
                tx.set_with_ttl(0, self.window).await?;
                Ok(Window::Restarted)
            }
        }
    }
}
