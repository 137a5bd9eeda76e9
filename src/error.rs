use crate::models::{Pubkey, PubkeyError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

/// Why a transaction does not (or does not yet) satisfy a payment request.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("not found")]
    NotFound,

    #[error("missing meta")]
    MissingMetadata,

    #[error("transaction failed on ledger: {0}")]
    LedgerExecution(Value),

    #[error("recipient not found")]
    RecipientNotFound,

    #[error("amount not transferred: expected {expected}, received {received}")]
    AmountNotTransferred { expected: Decimal, received: Decimal },

    #[error("reference not found: {0}")]
    ReferenceNotFound(Pubkey),

    #[error("unreadable token balance for account {account_index}")]
    UnreadableTokenBalance { account_index: usize },

    #[error("ledger unavailable: {0}")]
    Rpc(#[from] RpcError),
}

impl ValidationError {
    /// True when the ledger may simply not have propagated the transaction yet.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ValidationError::NotFound | ValidationError::MissingMetadata | ValidationError::Rpc(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum FindReferenceError {
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("amount must not be negative")]
    NegativeAmount,

    #[error("amount has more than {0} decimal places")]
    TooManyDecimals(u32),

    #[error("amount is required before generating a payment")]
    MissingAmount,

    #[error("payment already generated")]
    AlreadyGenerated,

    #[error("payment descriptor could not be encoded: {0}")]
    Descriptor(#[from] RequestUrlError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestUrlError {
    #[error("URL too long")]
    TooLong,

    #[error("protocol invalid")]
    InvalidProtocol,

    #[error("pathname missing")]
    MissingPathname,

    #[error("link invalid")]
    InvalidLink,

    #[error("recipient invalid")]
    InvalidRecipient,

    #[error("amount invalid")]
    InvalidAmount,

    #[error("spl-token invalid")]
    InvalidSplToken,

    #[error("reference invalid")]
    InvalidReference,

    #[error("malformed URL: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("transaction request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transaction request rejected: {0}")]
    Rejected(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("wallet {0} is not a required signer")]
    NotASigner(Pubkey),

    #[error("submission failed: {0}")]
    Submission(#[from] RpcError),

    #[error("payment attempt moved on")]
    Cancelled,
}

/// Errors surfaced by the HTTP API.
#[derive(Error, Debug)]
pub enum PayError {
    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(ValidationError),

    #[error("Transaction not found yet: {0}")]
    TransactionNotFound(ValidationError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("Payment rejected: {0}")]
    Payment(#[from] PaymentError),

    #[error("RPC error: {0}")]
    RpcError(#[from] RpcError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Too many open payment sessions")]
    SessionLimitReached,
}

impl From<ValidationError> for PayError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Rpc(e) => PayError::RpcError(e),
            e if e.is_retryable() => PayError::TransactionNotFound(e),
            e => PayError::PaymentVerificationFailed(e),
        }
    }
}

impl From<PubkeyError> for PayError {
    fn from(err: PubkeyError) -> Self {
        PayError::InvalidRequest(err.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for PayError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            PayError::PaymentVerificationFailed(_) => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_VERIFICATION_FAILED")
            }
            PayError::TransactionNotFound(_) => (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND"),
            PayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PayError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
            PayError::Payment(_) => (StatusCode::CONFLICT, "PAYMENT_REJECTED"),
            PayError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            PayError::RpcError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            PayError::SessionLimitReached => {
                (StatusCode::SERVICE_UNAVAILABLE, "SESSION_LIMIT_REACHED")
            }
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code = error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
