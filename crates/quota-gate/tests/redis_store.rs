#![cfg(feature = "redis")]

//! Runs against a live server when `QUOTA_GATE_REDIS_ADDR` is set
//! (for example `127.0.0.1:6379`). Without it every test returns early.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use quota_gate::prelude::*;

fn settings(test: &str) -> Option<RedisSettings> {
    let addr = std::env::var("QUOTA_GATE_REDIS_ADDR").ok()?;
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    Some(RedisSettings::new(addr).with_prefix(format!("quota-gate-test:{test}:{nonce}")))
}

#[tokio::test]
async fn plain_commands() {
    let Some(settings) = settings("plain") else {
        eprintln!("QUOTA_GATE_REDIS_ADDR not set, skipping");
        return;
    };
    let store = RedisStore::connect(&settings).await.expect("connect");
    store.ping().await.expect("ping");

    assert_eq!(store.read_int("missing").await.unwrap(), None);
    assert_eq!(store.remaining_ttl("missing").await.unwrap(), KeyTtl::Absent);

    store
        .set_with_ttl("counter", 3, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(store.increment_by("counter", 2).await.unwrap(), 5);
    assert_eq!(store.read_int("counter").await.unwrap(), Some(5));
    match store.remaining_ttl("counter").await.unwrap() {
        KeyTtl::Expires(ttl) => assert!(ttl <= Duration::from_secs(30)),
        other => panic!("unexpected ttl: {other:?}"),
    }

    assert_eq!(store.increment_by("bare", 1).await.unwrap(), 1);
    assert_eq!(store.remaining_ttl("bare").await.unwrap(), KeyTtl::Persistent);
}

#[tokio::test]
async fn shared_quota_across_replicas() {
    let Some(settings) = settings("replicas") else {
        eprintln!("QUOTA_GATE_REDIS_ADDR not set, skipping");
        return;
    };

    let mut buckets = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(RedisStore::connect(&settings).await.expect("connect"));
        let bucket = StoreBucket::connect(
            store,
            BucketConfig::new("shared", 2, Duration::from_secs(30)),
        )
        .await
        .expect("bucket");
        buckets.push(bucket);
    }

    assert_eq!(buckets[0].consume(1).await.unwrap().space, 1);
    assert_eq!(buckets[1].consume(1).await.unwrap().space, 0);
    let err = buckets[0].consume(1).await.expect_err("exhausted");
    assert!(err.is_quota_exceeded());
    let err = buckets[1].consume(1).await.expect_err("exhausted");
    assert_eq!(err.state().map(|state| state.space), Some(0));
}

#[tokio::test]
async fn concurrent_consumers_admit_exactly_capacity() {
    let Some(settings) = settings("concurrent") else {
        eprintln!("QUOTA_GATE_REDIS_ADDR not set, skipping");
        return;
    };
    let store = Arc::new(
        RedisStore::connect(&settings)
            .await
            .expect("connect")
            .with_retry_policy(quota_gate::TxRetryPolicy::default().with_max_attempts(64)),
    );
    let bucket = Arc::new(
        StoreBucket::connect(store, BucketConfig::new("race", 10, Duration::from_secs(30)))
            .await
            .expect("bucket"),
    );

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let bucket = bucket.clone();
            tokio::spawn(async move { bucket.consume(1).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => accepted += 1,
            Err(err) => assert!(err.is_quota_exceeded(), "unexpected error: {err}"),
        }
    }
    assert_eq!(accepted, 10);
}

#[tokio::test]
async fn sequential_transactions_share_one_connection() {
    let Some(settings) = settings("pool") else {
        eprintln!("QUOTA_GATE_REDIS_ADDR not set, skipping");
        return;
    };
    let store = Arc::new(RedisStore::connect(&settings).await.expect("connect"));
    let bucket = StoreBucket::connect(
        store.clone(),
        BucketConfig::new("pooled", 5, Duration::from_secs(30)),
    )
    .await
    .expect("bucket");

    for expected in (2..=4).rev() {
        assert_eq!(bucket.consume(1).await.unwrap().space, expected);
    }
    assert_eq!(store.idle_connections(), 1);

    // A parked connection carries no watch: plain writes elsewhere must not
    // abort the next transaction.
    store.increment_by("pooled", 1).await.unwrap();
    assert_eq!(bucket.consume(1).await.unwrap().space, 0);
    assert_eq!(store.idle_connections(), 1);
}
