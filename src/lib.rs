pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use handlers::*;
use middleware::{rate_limit_middleware, RateLimiter};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

/// Builds the HTTP surface. API and socket routes sit behind the rate limiter.
pub fn app(state: AppState, limiter: RateLimiter) -> Router {
    let api = Router::new()
        .route("/api/verify", post(verify_transfer))
        .route("/api/payments", post(create_payment))
        .route("/api/payments/:id", get(get_payment))
        .route("/api/payments/:id/reset", post(reset_payment))
        .route("/api/payments/:id/generate", post(generate_payment))
        .route("/ws/payments/:id", get(payment_socket))
        .layer(axum_middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    Router::new()
        // Public endpoints
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .merge(api)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
