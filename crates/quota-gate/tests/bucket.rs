use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quota_gate::prelude::*;
use quota_gate::TxRetryPolicy;

async fn memory_bucket(key: &str, capacity: u64, window: Duration) -> StoreBucket<MemoryStore> {
    StoreBucket::connect(
        Arc::new(MemoryStore::new()),
        BucketConfig::new(key, capacity, window),
    )
    .await
    .expect("bucket")
}

#[tokio::test(start_paused = true)]
async fn sequential_consumes_follow_the_window() {
    let bucket = memory_bucket("scenario-a", 2, Duration::from_secs(1)).await;

    let first = bucket.consume(1).await.expect("first accepted");
    assert_eq!(first.space, 1);
    let second = bucket.consume(1).await.expect("second accepted");
    assert_eq!(second.space, 0);

    let err = bucket.consume(1).await.expect_err("third rejected");
    let rejected = err.state().copied().expect("quota exceeded");
    assert_eq!(rejected.space, 0);
    assert!(rejected.reset_secs() > 0);

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let fourth = bucket.consume(1).await.expect("fresh window");
    assert_eq!(fourth.space, 1);
    assert_eq!(fourth.reset_secs(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_admit_exactly_capacity() {
    const CAPACITY: u64 = 25;
    const CALLERS: usize = 100;

    let store = Arc::new(
        MemoryStore::new().with_retry_policy(TxRetryPolicy::default().with_max_attempts(64)),
    );
    // Several buckets over one store stand in for separate replicas.
    let mut replicas = Vec::new();
    for _ in 0..4 {
        let bucket = StoreBucket::connect(
            store.clone(),
            BucketConfig::new("shared", CAPACITY, Duration::from_secs(60)),
        )
        .await
        .expect("bucket");
        replicas.push(Arc::new(bucket));
    }

    let mut handles = Vec::new();
    for i in 0..CALLERS {
        let bucket = replicas[i % replicas.len()].clone();
        handles.push(tokio::spawn(async move { bucket.consume(1).await }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => accepted += 1,
            Err(QuotaError::QuotaExceeded(state)) => {
                assert_eq!(state.space, 0);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, CAPACITY as usize);
    assert_eq!(rejected, CALLERS - CAPACITY as usize);
    assert_eq!(
        store.read_int("shared").await.unwrap(),
        Some(CAPACITY as i64)
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_drains_leave_space_alone() {
    let bucket = memory_bucket("drain", 5, Duration::from_secs(10)).await;
    bucket.consume(2).await.unwrap();

    let mut last = bucket.drain().await;
    assert_eq!(last.space, 3);
    for _ in 0..5 {
        tokio::time::advance(Duration::from_millis(500)).await;
        let next = bucket.drain().await;
        assert_eq!(next.space, 3);
        assert!(next.reset_at >= last.reset_at);
        last = next;
    }
    assert_eq!(bucket.store().read_int("drain").await.unwrap(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn drain_after_window_starts_a_fresh_one() {
    let bucket = memory_bucket("lapsed", 3, Duration::from_secs(2)).await;
    bucket.consume(3).await.unwrap();
    let before = bucket.state().reset_at;

    tokio::time::advance(Duration::from_secs(3)).await;
    let state = bucket.drain().await;
    assert!(state.reset_at > before);
    assert_eq!(state.reset_secs(), 2);
    assert_eq!(bucket.store().read_int("lapsed").await.unwrap(), Some(0));

    let next = bucket.consume(1).await.unwrap();
    assert_eq!(next.space, 2);
}

#[tokio::test]
async fn counter_without_ttl_is_reset_by_drain() {
    let store = Arc::new(MemoryStore::new());
    store.increment_by("orphan", 1).await.unwrap();
    assert_eq!(
        store.remaining_ttl("orphan").await.unwrap(),
        KeyTtl::Persistent
    );

    let bucket = StoreBucket::connect(
        store.clone(),
        BucketConfig::new("orphan", 4, Duration::from_secs(30)),
    )
    .await
    .unwrap();
    bucket.drain().await;

    assert_eq!(store.read_int("orphan").await.unwrap(), Some(0));
    assert!(matches!(
        store.remaining_ttl("orphan").await.unwrap(),
        KeyTtl::Expires(_)
    ));
}

/// Store double whose behaviour is switched per test.
///
/// Faults and interference are injected into the watched TTL lookup that
/// drain performs inside its transaction.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    ping_fails: bool,
    transactions_fail: AtomicBool,
    ttl_fails: AtomicBool,
    /// Consumes once through another replica right after a transaction
    /// observes an absent counter.
    rival: Mutex<Option<Arc<StoreBucket<MemoryStore>>>>,
}

impl FlakyStore {
    /// A second replica sharing this store's data.
    async fn replica(&self, config: BucketConfig) -> Arc<StoreBucket<MemoryStore>> {
        let bucket = StoreBucket::connect(Arc::new(self.inner.clone()), config)
            .await
            .expect("replica");
        Arc::new(bucket)
    }
}

struct HookedBody<'a, B> {
    body: &'a B,
    store: &'a FlakyStore,
}

#[async_trait]
impl<'a, B: TxBody> TxBody for HookedBody<'a, B> {
    type Output = B::Output;

    async fn run(&self, tx: &mut dyn StoreTx) -> Result<B::Output, StoreError> {
        let mut hooked = HookedTx {
            tx,
            store: self.store,
        };
        self.body.run(&mut hooked).await
    }
}

struct HookedTx<'t, 's> {
    tx: &'t mut dyn StoreTx,
    store: &'s FlakyStore,
}

#[async_trait]
impl<'t, 's> StoreTx for HookedTx<'t, 's> {
    async fn read_int(&mut self) -> Result<Option<i64>, StoreError> {
        self.tx.read_int().await
    }

    async fn set_with_ttl(&mut self, value: i64, ttl: Duration) -> Result<(), StoreError> {
        self.tx.set_with_ttl(value, ttl).await
    }

    async fn increment_by(&mut self, amount: i64) -> Result<i64, StoreError> {
        self.tx.increment_by(amount).await
    }

    async fn remaining_ttl(&mut self) -> Result<KeyTtl, StoreError> {
        if self.store.ttl_fails.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("ttl lookup timed out"));
        }
        let ttl = self.tx.remaining_ttl().await?;
        if ttl == KeyTtl::Absent {
            let rival = self.store.rival.lock().take();
            if let Some(rival) = rival {
                rival.consume(1).await.expect("rival consume");
            }
        }
        Ok(ttl)
    }
}

#[async_trait]
impl QuotaStore for FlakyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.ping_fails {
            return Err(StoreError::unavailable("connection refused"));
        }
        self.inner.ping().await
    }

    async fn read_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.inner.read_int(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64, StoreError> {
        self.inner.increment_by(key, amount).await
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        self.inner.remaining_ttl(key).await
    }

    async fn transaction<B>(&self, key: &str, body: &B) -> Result<B::Output, StoreError>
    where
        B: TxBody,
    {
        if self.transactions_fail.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("connection reset"));
        }
        let hooked = HookedBody { body, store: self };
        self.inner.transaction(key, &hooked).await
    }
}

#[tokio::test]
async fn failed_liveness_check_refuses_construction() {
    let store = Arc::new(FlakyStore {
        ping_fails: true,
        ..FlakyStore::default()
    });
    let result =
        StoreBucket::connect(store, BucketConfig::new("down", 2, Duration::from_secs(1))).await;
    assert!(matches!(result, Err(BuildError::Connectivity(_))));
}

#[tokio::test]
async fn invalid_config_is_reported_before_ping() {
    let store = Arc::new(FlakyStore {
        ping_fails: true,
        ..FlakyStore::default()
    });
    let result = StoreBucket::connect(store, BucketConfig::new("", 2, Duration::from_secs(1))).await;
    assert!(matches!(result, Err(BuildError::Config(_))));
}

#[tokio::test]
async fn drain_failures_do_not_fail_consume() {
    let store = Arc::new(FlakyStore::default());
    let bucket = StoreBucket::connect(
        store.clone(),
        BucketConfig::new("flaky-ttl", 3, Duration::from_secs(5)),
    )
    .await
    .unwrap();

    store.ttl_fails.store(true, Ordering::SeqCst);
    let state = bucket.consume(1).await.expect("consume unaffected by drain");
    assert_eq!(state.space, 2);
    assert_eq!(bucket.metrics().snapshot().drain_failures, 1);
    assert_eq!(bucket.metrics().snapshot().accepted, 1);
}

#[tokio::test]
async fn store_faults_surface_on_consume() {
    let store = Arc::new(FlakyStore::default());
    let bucket = StoreBucket::connect(
        store.clone(),
        BucketConfig::new("flaky-tx", 3, Duration::from_secs(5)),
    )
    .await
    .unwrap();

    store.transactions_fail.store(true, Ordering::SeqCst);
    let err = bucket.consume(1).await.expect_err("store fault");
    assert!(matches!(err, QuotaError::StoreUnavailable(_)));
    assert!(!err.is_quota_exceeded());
    assert_eq!(bucket.metrics().snapshot().store_errors, 1);

    store.transactions_fail.store(false, Ordering::SeqCst);
    assert_eq!(bucket.consume(1).await.unwrap().space, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_drain_still_reports_a_future_reset() {
    let store = Arc::new(FlakyStore::default());
    let bucket = StoreBucket::connect(
        store.clone(),
        BucketConfig::new("blind", 1, Duration::from_secs(30)),
    )
    .await
    .unwrap();
    store.ttl_fails.store(true, Ordering::SeqCst);

    let accepted = bucket.consume(1).await.expect("accepted");
    assert!(accepted.reset_secs() > 0);

    let err = bucket.consume(1).await.expect_err("exhausted");
    let rejected = err.state().copied().expect("quota exceeded");
    assert_eq!(rejected.space, 0);
    assert_eq!(rejected.reset_secs(), 30);
    assert_eq!(bucket.metrics().snapshot().drain_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn drain_keeps_a_window_opened_by_another_replica() {
    let config = BucketConfig::new("contested", 2, Duration::from_secs(1));
    let store = Arc::new(FlakyStore::default());
    let ours = StoreBucket::connect(store.clone(), config.clone())
        .await
        .unwrap();
    let theirs = store.replica(config).await;

    ours.consume(1).await.unwrap();
    ours.consume(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    // The other replica opens the next window while our drain sits between
    // its TTL lookup and the reset.
    *store.rival.lock() = Some(theirs.clone());
    ours.drain().await;
    assert!(store.rival.lock().is_none());
    assert_eq!(store.read_int("contested").await.unwrap(), Some(1));

    let mut admitted = 1;
    for _ in 0..3 {
        if theirs.consume(1).await.is_ok() {
            admitted += 1;
        }
    }
    assert!(ours.consume(1).await.is_err());
    assert_eq!(admitted, 2);
    assert_eq!(store.read_int("contested").await.unwrap(), Some(2));
    assert_eq!(ours.metrics().snapshot().drain_failures, 0);
}
