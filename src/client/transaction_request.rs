use crate::{error::WalletError, models::Pubkey};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequestInfo {
    pub label: String,
    pub icon: String,
}

#[derive(Serialize)]
struct AccountBody<'a> {
    account: &'a str,
}

#[derive(Deserialize)]
struct TransactionResponse {
    transaction: String,
    #[serde(default)]
    message: Option<String>,
}

/// A transaction handed back by a transaction-request link, ready for signing.
#[derive(Debug, Clone)]
pub struct FetchedTransaction {
    pub transaction: Vec<u8>,
    pub message: Option<String>,
}

/// Talks to the merchant link embedded in a transaction request URL.
#[derive(Clone)]
pub struct TransactionRequestClient {
    client: Client,
}

impl Default for TransactionRequestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRequestClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn fetch_info(&self, link: &Url) -> Result<TransactionRequestInfo, WalletError> {
        let response = self.client.get(link.clone()).send().await?;
        if !response.status().is_success() {
            return Err(WalletError::Rejected(response.status().to_string()));
        }
        Ok(response.json().await?)
    }

    /// POSTs the payer account to `link` and decodes the returned transaction.
    pub async fn fetch_transaction(
        &self,
        account: &Pubkey,
        link: &Url,
    ) -> Result<FetchedTransaction, WalletError> {
        let account = account.to_string();
        let response = self
            .client
            .post(link.clone())
            .json(&AccountBody { account: &account })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::Rejected(format!("{}: {}", status, body)));
        }

        let body: TransactionResponse = response.json().await?;
        let transaction = BASE64
            .decode(body.transaction.as_bytes())
            .map_err(|e| WalletError::InvalidTransaction(e.to_string()))?;

        if transaction.is_empty() {
            return Err(WalletError::InvalidTransaction("empty transaction".to_string()));
        }

        tracing::debug!(account = %account, bytes = transaction.len(), "Fetched transaction from link");

        Ok(FetchedTransaction {
            transaction,
            message: body.message,
        })
    }
}
