use thiserror::Error;

use crate::state::BucketState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
    #[error("key `{key}` changed during transaction")]
    Conflict { key: String },
    #[error("transaction on `{key}` abandoned after {attempts} conflicting attempts")]
    RetriesExhausted { key: String, attempts: u32 },
    #[error("value under `{key}` is not a counter: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }

    pub fn conflict(key: &str) -> Self {
        StoreError::Conflict {
            key: key.to_string(),
        }
    }

    pub fn corrupt(key: &str, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Outcome of a consume call that did not admit the units.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// Routine rejection. Carries the snapshot used for rate-limit headers.
    #[error("too many requests")]
    QuotaExceeded(BucketState),
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("invalid consume amount {0}")]
    InvalidAmount(u64),
}

impl QuotaError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, QuotaError::QuotaExceeded(_))
    }

    pub fn state(&self) -> Option<&BucketState> {
        match self {
            QuotaError::QuotaExceeded(state) => Some(state),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid bucket config: {0}")]
    Config(String),
    #[error("quota store liveness check failed: {0}")]
    Connectivity(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream connect failed: {0}")]
    Connect(String),
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream body error: {0}")]
    Body(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Quota check could not be completed; the request was not sent.
    #[error(transparent)]
    Quota(QuotaError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

pub type QuotaResult<T> = Result<T, QuotaError>;
