pub mod bucket;
pub mod config;
pub mod errors;
pub mod executor;
pub mod headers;
pub mod metrics;
pub mod prelude;
pub mod state;
pub mod store;
pub mod transport;

pub use bucket::{Bucket, BucketConfig, StoreBucket};
pub use config::{QuotaSettings, RedisSettings, StoreSettings};
pub use errors::{BuildError, QuotaError, QuotaResult, StoreError, TransportError, UpstreamError};
pub use executor::{Executor, OutboundRequest, OutboundResponse, ReqwestExecutor};
pub use metrics::{QuotaMetrics, QuotaStatsSnapshot};
pub use state::BucketState;
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{KeyTtl, MemoryStore, QuotaStore, StoreTx, TxBody, TxRetryPolicy};
pub use transport::AdmissionTransport;
