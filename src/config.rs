use crate::models::{Finality, Pubkey, NATIVE_DECIMALS};
use crate::services::PaymentConfig;
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Ledger RPC
    pub rpc_url: String,
    pub rpc_fallback_url: Option<String>,
    pub finality: Finality,

    // Payment request
    pub recipient: Pubkey,
    pub label: String,
    pub spl_token: Option<Pubkey>,
    pub decimals: u32,
    pub required_confirmations: u64,
    pub connect_wallet: bool,
    pub transaction_request_link: Option<Url>,

    // Rate Limiting
    pub rate_limit_per_second: u32,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;
        let spl_token = Self::parse_optional_pubkey("SPL_TOKEN")?;

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_or("PORT", 8080)?,

            rpc_url: std::env::var("RPC_URL").context("RPC_URL required")?,
            rpc_fallback_url: std::env::var("RPC_FALLBACK_URL").ok(),
            finality: std::env::var("FINALITY")
                .unwrap_or_else(|_| "confirmed".to_string())
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid FINALITY")?,

            recipient: Self::parse_pubkey("RECIPIENT")?,
            label: std::env::var("LABEL").unwrap_or_else(|_| "Ledger Pay".to_string()),
            decimals: match spl_token {
                // Token precision differs per asset, so it must be stated.
                Some(_) => Self::parse_required("DECIMALS")?,
                None => Self::parse_or("DECIMALS", NATIVE_DECIMALS)?,
            },
            spl_token,
            required_confirmations: Self::parse_or("REQUIRED_CONFIRMATIONS", 1)?,
            connect_wallet: Self::parse_or("CONNECT_WALLET", false)?,
            transaction_request_link: std::env::var("TRANSACTION_REQUEST_LINK")
                .ok()
                .map(|link| Url::parse(&link))
                .transpose()
                .context("Invalid TRANSACTION_REQUEST_LINK")?,

            rate_limit_per_second: Self::parse_or("RATE_LIMIT_PER_SECOND", 10)?,
            rate_limit_burst: Self::parse_or("RATE_LIMIT_BURST", 30)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// The immutable settings every payment attempt is constructed with.
    pub fn payment_config(&self) -> PaymentConfig {
        PaymentConfig {
            recipient: self.recipient,
            spl_token: self.spl_token,
            label: self.label.clone(),
            link: self.transaction_request_link.clone(),
            decimals: self.decimals,
            required_confirmations: self.required_confirmations,
            connect_wallet: self.connect_wallet,
            finality: self.finality,
        }
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_or<T>(var: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(var) {
            Ok(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}", var)),
            Err(_) => Ok(default),
        }
    }

    fn parse_required<T>(var: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        std::env::var(var)
            .with_context(|| format!("{} required", var))?
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", var))
    }

    fn parse_pubkey(var: &str) -> Result<Pubkey> {
        let value = std::env::var(var).with_context(|| format!("{} required", var))?;
        Pubkey::from_str(&value).with_context(|| format!("Invalid address for {}", var))
    }

    fn parse_optional_pubkey(var: &str) -> Result<Option<Pubkey>> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Pubkey::from_str(&value)
                .map(Some)
                .with_context(|| format!("Invalid address for {}", var)),
            _ => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http") {
            bail!("RPC_URL must be HTTP(S) URL");
        }
        if let Some(fallback) = &self.rpc_fallback_url {
            if !fallback.starts_with("http") {
                bail!("RPC_FALLBACK_URL must be HTTP(S) URL");
            }
        }
        if !(1..=32).contains(&self.required_confirmations) {
            bail!("REQUIRED_CONFIRMATIONS must be between 1 and 32");
        }
        if self.decimals > 18 {
            bail!("DECIMALS must be at most 18");
        }
        if let Some(link) = &self.transaction_request_link {
            if link.scheme() != "https" && !matches!(self.environment, Environment::Development) {
                bail!("TRANSACTION_REQUEST_LINK must be HTTPS outside development");
            }
        }
        if self.connect_wallet && self.transaction_request_link.is_none() {
            tracing::warn!("CONNECT_WALLET is set but no TRANSACTION_REQUEST_LINK is configured");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}
