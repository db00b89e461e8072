use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::state::BucketState;

pub const RATE_LIMIT_CAPACITY: &str = "rate-limit-capacity";
pub const RATE_LIMIT_REMAINING: &str = "rate-limit-remaining";
pub const RATE_LIMIT_RESET: &str = "rate-limit-reset";

/// Writes the three rate-limit headers, replacing any existing values.
pub fn stamp(headers: &mut HeaderMap, state: &BucketState) {
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_CAPACITY),
        HeaderValue::from(state.capacity),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING),
        HeaderValue::from(state.space),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_RESET),
        HeaderValue::from(state.reset_secs()),
    );
}

/// Reads an integer rate-limit header back, if present and well formed.
pub fn read(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
