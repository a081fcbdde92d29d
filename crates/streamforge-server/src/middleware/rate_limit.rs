//! Governor-based rate limiting.
//!
//! Two unkeyed limiters: one for the whole `/api` tree and a tighter one for
//! stream start/stop operations. The limiter for a route is supplied as a
//! request extension.

use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::ApiResponse;

pub type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a limiter allowing `requests_per_minute`. Zero is treated as one.
pub fn create_limiter(requests_per_minute: u32) -> SharedLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Returns 429 `RATE_LIMIT_EXCEEDED` once the limiter in the request
/// extensions is exhausted.
pub async fn rate_limit_middleware(request: Request<axum::body::Body>, next: Next) -> Response {
    let limiter = request.extensions().get::<SharedLimiter>().cloned();

    if let Some(limiter) = limiter {
        if limiter.check().is_err() {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            return ApiResponse::failure(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests, please try again later",
            )
            .into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_enforced() {
        let limiter = create_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_quota_still_allows_one() {
        let limiter = create_limiter(0);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
