use anyhow::{Context, Result};
use ledger_pay::{
    client::{LocalWallet, TransactionRequestClient, Wallet},
    config::Config,
    services::{HttpLedgerRpc, LedgerRpc, PaymentMachine},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let amount = Decimal::from_str(&std::env::var("AMOUNT").context("AMOUNT required")?)
        .context("Invalid AMOUNT")?;
    let message = std::env::var("MESSAGE").ok();

    println!("Ledger Pay Agent");
    println!("================");
    println!("RPC: {}", config.rpc_url);
    println!("Recipient: {}", config.recipient);
    if let Some(link) = &config.transaction_request_link {
        match TransactionRequestClient::new().fetch_info(link).await {
            Ok(info) => println!("Merchant: {} ({})", info.label, info.icon),
            Err(e) => tracing::warn!(error = %e, "Could not fetch merchant details"),
        }
    }
    println!();

    let rpc: Arc<dyn LedgerRpc> = Arc::new(HttpLedgerRpc::new(
        &config.rpc_url,
        config.rpc_fallback_url.as_deref(),
    ));
    let mut builder = PaymentMachine::builder(Arc::new(config.payment_config()), rpc);
    if let Ok(secret) = std::env::var("PAYER_SECRET_KEY") {
        let wallet = LocalWallet::from_base58(&secret).context("Invalid PAYER_SECRET_KEY")?;
        println!("Payer: {}", wallet.public_key());
        builder = builder.with_wallet(Arc::new(wallet));
    }
    let machine = builder.build();

    machine.set_amount(amount)?;
    machine.set_message(message)?;
    let reference = machine.generate()?;

    println!("Reference: {}", reference);
    println!("Request URL: {}", machine.url());
    println!();

    let mut updates = machine.subscribe();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        match snapshot.signature {
            Some(signature) => println!(
                "{:?}: {} ({} confirmations, {:.0}%)",
                snapshot.status,
                signature,
                snapshot.confirmations,
                snapshot.progress * 100.0
            ),
            None => println!("{:?}: waiting for payment", snapshot.status),
        }
        if snapshot.status.is_terminal() {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                machine.reset();
                println!("Cancelled");
                return Ok(());
            }
        }
    }

    println!();
    println!("Done");
    Ok(())
}
