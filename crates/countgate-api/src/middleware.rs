//! Request middleware: ambient page-hit counting and the global rate limit.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use countgate_core::config::RateLimitConfig;
use governor::clock::Clock;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::ApiState;
use crate::error::ErrorBody;

/// Count the request against the ambient page-hit key, then run it.
///
/// A failed increment is logged and otherwise ignored.
pub async fn count_page_hits(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    if let Err(e) = state.gateway.record_page_hit().await {
        warn!(path = %req.uri().path(), error = %e, "failed to record page hit");
    }
    next.run(req).await
}

/// Process-wide token bucket shared by every limited route.
pub struct RequestLimiter {
    bucket: DefaultDirectRateLimiter,
    per_second: u32,
}

impl RequestLimiter {
    /// `None` when either the rate or the burst is zero.
    pub fn new(per_second: u32, burst: u32) -> Option<Self> {
        let quota = Quota::per_second(NonZeroU32::new(per_second)?)
            .allow_burst(NonZeroU32::new(burst)?);
        Some(Self {
            bucket: RateLimiter::direct(quota),
            per_second,
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        Self::new(config.per_second, config.burst())
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RequestLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    match limiter.bucket.check() {
        Ok(()) => next.run(req).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(limiter.bucket.clock().now());
            // Round up so clients never retry early.
            let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            debug!(path = %req.uri().path(), retry_after, "rate limited");
            let body = ErrorBody {
                error: format!("rate limit exceeded: {} per second", limiter.per_second),
            };
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rates_disable_the_limiter() {
        assert!(RequestLimiter::new(0, 5).is_none());
        assert!(RequestLimiter::new(5, 0).is_none());
        assert!(RequestLimiter::new(1, 1).is_some());
    }

    #[test]
    fn burst_defaults_to_rate() {
        let config = RateLimitConfig {
            per_second: 3,
            burst: None,
        };
        let limiter = RequestLimiter::from_config(&config).unwrap();
        for _ in 0..3 {
            assert!(limiter.bucket.check().is_ok());
        }
        assert!(limiter.bucket.check().is_err());
    }
}
