use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::bucket::BucketConfig;
use crate::errors::StoreError;

/// Quota scope settings as they appear in configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    /// Scope shared by every replica enforcing the same limit.
    pub key: String,
    pub capacity: u64,
    #[serde(with = "duration_str")]
    pub window: Duration,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            key: "default".to_string(),
            capacity: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl QuotaSettings {
    pub fn bucket_config(&self) -> BucketConfig {
        BucketConfig::new(self.key.clone(), self.capacity, self.window)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreSettings {
    #[default]
    Memory,
    Redis(RedisSettings),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// `host:port`
    pub addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub db: u32,
    pub key_prefix: String,
    pub max_tx_attempts: u32,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            key_prefix: "quota-gate".to_string(),
            max_tx_attempts: 16,
        }
    }
}

impl RedisSettings {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn connection_url(&self) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!("redis://{}/{}", self.addr, self.db)).map_err(|err| {
            StoreError::unavailable(format!("invalid redis address `{}`: {err}", self.addr))
        })?;
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| StoreError::unavailable("redis address cannot carry a password"))?;
        }
        Ok(url)
    }
}

/// Serde adapter for human readable durations such as `1s` or `1m 30s`.
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
