use crate::{
    error::RpcError,
    models::{Finality, Pubkey, Signature, SignatureInfo, SignatureStatus, TransactionRecord},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Options for `getSignaturesForAddress`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignaturesForAddressOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Signature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<Signature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Finality>,
}

/// The ledger surface the validator and payment machine depend on.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_transaction(
        &self,
        signature: &Signature,
        finality: Finality,
    ) -> Result<Option<TransactionRecord>, RpcError>;

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        options: SignaturesForAddressOptions,
    ) -> Result<Vec<SignatureInfo>, RpcError>;

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcError>;

    async fn send_transaction(&self, transaction: &[u8]) -> Result<Signature, RpcError>;

    async fn get_health(&self) -> Result<(), RpcError>;
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcContextValue<T> {
    value: T,
}

/// JSON-RPC client with an optional fallback endpoint.
pub struct HttpLedgerRpc {
    client: Client,
    primary: String,
    fallback: Option<String>,
    next_id: AtomicU64,
}

impl HttpLedgerRpc {
    pub fn new(rpc_url: &str, fallback_url: Option<&str>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            primary: rpc_url.to_string(),
            fallback: fallback_url.map(str::to_string),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        match self.call_endpoint(&self.primary, method, &params).await {
            Err(RpcError::Transport(e)) if self.fallback.is_some() => {
                tracing::warn!(method, error = %e, "Primary RPC failed, trying fallback");
                let fallback = self.fallback.as_deref().unwrap_or(&self.primary);
                self.call_endpoint(fallback, method, &params).await
            }
            result => result,
        }
    }

    async fn call_endpoint<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        params: &Value,
    ) -> Result<T, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: params.clone(),
        };

        let response: JsonRpcResponse = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn get_transaction(
        &self,
        signature: &Signature,
        finality: Finality,
    ) -> Result<Option<TransactionRecord>, RpcError> {
        self.call(
            "getTransaction",
            json!([
                signature.to_string(),
                {
                    "commitment": finality.as_str(),
                    "encoding": "json",
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        )
        .await
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        options: SignaturesForAddressOptions,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        self.call(
            "getSignaturesForAddress",
            json!([address.to_string(), options]),
        )
        .await
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcError> {
        let response: RpcContextValue<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(response.value.into_iter().next().flatten())
    }

    async fn send_transaction(&self, transaction: &[u8]) -> Result<Signature, RpcError> {
        let encoded = BASE64.encode(transaction);
        let signature: String = self
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": "base64" }]),
            )
            .await?;
        signature
            .parse()
            .map_err(|e| RpcError::InvalidResponse(format!("sendTransaction: {}", e)))
    }

    async fn get_health(&self) -> Result<(), RpcError> {
        let status: String = self.call("getHealth", json!([])).await?;
        if status == "ok" {
            Ok(())
        } else {
            Err(RpcError::InvalidResponse(format!("unhealthy: {}", status)))
        }
    }
}
