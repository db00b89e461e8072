use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tracing::{debug, warn};

use crate::bucket::Bucket;
use crate::errors::{QuotaError, TransportError};
use crate::executor::{Executor, OutboundRequest, OutboundResponse};
use crate::headers;
use crate::state::BucketState;

/// Admission control in front of an executor.
///
/// Each request consumes one unit from the shared bucket. When the quota is
/// spent the request never leaves the process and a 429 is returned instead.
/// Store faults fail the request rather than letting it through.
#[derive(Clone)]
pub struct AdmissionTransport {
    bucket: Arc<dyn Bucket>,
    inner: Arc<dyn Executor>,
}

impl AdmissionTransport {
    pub fn new(bucket: Arc<dyn Bucket>, inner: Arc<dyn Executor>) -> Self {
        Self { bucket, inner }
    }

    pub fn bucket(&self) -> &Arc<dyn Bucket> {
        &self.bucket
    }
}

#[async_trait]
impl Executor for AdmissionTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let state = match self.bucket.consume(1).await {
            Ok(state) => state,
            Err(QuotaError::QuotaExceeded(state)) => {
                debug!(
                    method = %request.method,
                    url = %request.url,
                    reset_secs = state.reset_secs(),
                    "request held back by shared quota"
                );
                return Ok(too_many_requests(&state));
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "quota check failed, request not sent");
                return Err(TransportError::Quota(err));
            }
        };

        let mut response = self.inner.execute(request).await?;
        // Our own observation wins over whatever the upstream reported.
        headers::stamp(&mut response.headers, &state);
        Ok(response)
    }
}

fn too_many_requests(state: &BucketState) -> OutboundResponse {
    let mut headers = HeaderMap::new();
    headers::stamp(&mut headers, state);
    OutboundResponse::new(
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Bytes::new(),
        Duration::ZERO,
    )
}
