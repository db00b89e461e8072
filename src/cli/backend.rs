use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use quota_gate::prelude::*;
use quota_gate::QuotaStatsSnapshot;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Memory,
    Redis,
}

/// Applies a command line backend choice on top of the configured store.
/// Choosing the backend already configured keeps its settings.
pub fn apply_override(configured: &StoreSettings, kind: Option<BackendKind>) -> StoreSettings {
    match (kind, configured) {
        (None, settings) => settings.clone(),
        (Some(BackendKind::Memory), _) => StoreSettings::Memory,
        (Some(BackendKind::Redis), StoreSettings::Redis(redis)) => {
            StoreSettings::Redis(redis.clone())
        }
        (Some(BackendKind::Redis), StoreSettings::Memory) => {
            StoreSettings::Redis(RedisSettings::default())
        }
    }
}

/// A bucket over whichever store the configuration selected.
pub enum OpenedBucket {
    Memory(Arc<StoreBucket<MemoryStore>>),
    #[cfg(feature = "redis")]
    Redis(Arc<StoreBucket<RedisStore>>),
}

impl OpenedBucket {
    pub async fn open(store: &StoreSettings, quota: &QuotaSettings) -> Result<Self> {
        let config = quota.bucket_config();
        match store {
            StoreSettings::Memory => {
                let bucket = StoreBucket::connect(Arc::new(MemoryStore::new()), config)
                    .await
                    .context("Failed to create in-memory bucket")?;
                info!(key = %quota.key, "using in-memory store");
                Ok(Self::Memory(Arc::new(bucket)))
            }
            #[cfg(feature = "redis")]
            StoreSettings::Redis(settings) => {
                let redis = RedisStore::connect(settings)
                    .await
                    .with_context(|| format!("Failed to connect to redis at {}", settings.addr))?;
                let bucket = StoreBucket::connect(Arc::new(redis), config)
                    .await
                    .context("Failed to create redis bucket")?;
                info!(key = %quota.key, addr = %settings.addr, "using redis store");
                Ok(Self::Redis(Arc::new(bucket)))
            }
            #[cfg(not(feature = "redis"))]
            StoreSettings::Redis(_) => {
                anyhow::bail!("redis backend requested but this build lacks the `redis` feature")
            }
        }
    }

    pub fn shared(&self) -> Arc<dyn Bucket> {
        match self {
            Self::Memory(bucket) => bucket.clone() as Arc<dyn Bucket>,
            #[cfg(feature = "redis")]
            Self::Redis(bucket) => bucket.clone() as Arc<dyn Bucket>,
        }
    }

    pub async fn drain(&self) -> BucketState {
        match self {
            Self::Memory(bucket) => bucket.drain().await,
            #[cfg(feature = "redis")]
            Self::Redis(bucket) => bucket.drain().await,
        }
    }

    pub fn stats(&self) -> QuotaStatsSnapshot {
        match self {
            Self::Memory(bucket) => bucket.metrics().snapshot(),
            #[cfg(feature = "redis")]
            Self::Redis(bucket) => bucket.metrics().snapshot(),
        }
    }
}
