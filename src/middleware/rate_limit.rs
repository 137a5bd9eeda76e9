use crate::error::PayError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::sync::Arc;

pub type RateLimiter = Arc<DefaultDirectRateLimiter>;

/// Process-wide limiter. Zero values fall back to 1.
pub fn create_rate_limiter(per_second: u32, burst: u32) -> RateLimiter {
    let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(per_second);
    Arc::new(governor::RateLimiter::direct(
        Quota::per_second(per_second).allow_burst(burst),
    ))
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, PayError> {
    if limiter.check().is_err() {
        tracing::debug!(path = %request.uri().path(), "Rate limit hit");
        return Err(PayError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}
