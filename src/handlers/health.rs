use super::AppState;
use crate::models::HealthStatus;
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let ledger_ok = match state.rpc.get_health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Ledger RPC health check failed");
            false
        }
    };

    Json(HealthStatus {
        status: if ledger_ok { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger_rpc: ledger_ok,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
