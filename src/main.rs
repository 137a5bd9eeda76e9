use anyhow::{Context, Result};
use ledger_pay::{
    app,
    client::{LocalWallet, Wallet},
    config::Config,
    handlers::AppState,
    middleware::create_rate_limiter,
    services::*,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting ledger-pay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let rpc: Arc<dyn LedgerRpc> = Arc::new(HttpLedgerRpc::new(
        &config.rpc_url,
        config.rpc_fallback_url.as_deref(),
    ));
    let analytics = Arc::new(Analytics::new());

    let wallet: Option<Arc<dyn Wallet>> = match std::env::var("PAYER_SECRET_KEY") {
        Ok(secret) if config.connect_wallet => {
            let wallet = LocalWallet::from_base58(&secret).context("Invalid PAYER_SECRET_KEY")?;
            tracing::info!(payer = %wallet.public_key(), "Payer wallet connected");
            Some(Arc::new(wallet) as Arc<dyn Wallet>)
        }
        _ => None,
    };

    let sessions = Arc::new(
        PaymentSessions::new(Arc::new(config.payment_config()), rpc.clone(), analytics.clone())
            .with_wallet(wallet),
    );

    // Build application state
    let state = AppState {
        rpc,
        sessions,
        analytics,
    };
    let limiter = create_rate_limiter(config.rate_limit_per_second, config.rate_limit_burst);
    let router = app(state, limiter);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Payment updates: ws://{}/ws/payments/:id", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl+c");
        return;
    }
    tracing::info!("Shutting down gracefully...");
}
