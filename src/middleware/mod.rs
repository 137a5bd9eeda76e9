pub mod rate_limit;

pub use rate_limit::{create_rate_limiter, rate_limit_middleware, RateLimiter};
