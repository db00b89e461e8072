pub use crate::bucket::{Bucket, BucketConfig, StoreBucket};
pub use crate::config::{QuotaSettings, RedisSettings, StoreSettings};
pub use crate::errors::{BuildError, QuotaError, StoreError, TransportError, UpstreamError};
pub use crate::executor::{Executor, OutboundRequest, OutboundResponse, ReqwestExecutor};
pub use crate::headers::{RATE_LIMIT_CAPACITY, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
pub use crate::metrics::QuotaMetrics;
pub use crate::state::BucketState;
#[cfg(feature = "redis")]
pub use crate::store::RedisStore;
pub use crate::store::{KeyTtl, MemoryStore, QuotaStore, StoreTx, TxBody};
pub use crate::transport::AdmissionTransport;
