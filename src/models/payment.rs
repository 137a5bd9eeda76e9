use super::pubkey::{Pubkey, Signature};
use super::transaction::{Finality, TransactionRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of a single payment attempt.
///
/// Ordered: the happy path only ever moves forward through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    New,
    Pending,
    Confirmed,
    Valid,
    Finalized,
    Invalid,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Finalized | PaymentStatus::Invalid)
    }
}

/// Observable view of a payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub status: PaymentStatus,
    pub amount: Option<Decimal>,
    pub message: Option<String>,
    pub reference: Option<Pubkey>,
    pub signature: Option<Signature>,
    pub confirmations: u64,
    pub progress: f64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub signature: String,
    pub amount: Decimal,
    #[serde(default)]
    pub reference: Vec<String>,
    #[serde(default)]
    pub finality: Option<Finality>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedTransfer {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub recipient: Pubkey,
    pub amount: Decimal,
    pub spl_token: Option<Pubkey>,
}

impl VerifiedTransfer {
    pub fn from_record(
        record: &TransactionRecord,
        signature: Signature,
        recipient: Pubkey,
        amount: Decimal,
        spl_token: Option<Pubkey>,
    ) -> Self {
        Self {
            signature,
            slot: record.slot,
            block_time: record.block_time,
            recipient,
            amount,
            spl_token,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: Uuid,
    #[serde(flatten)]
    pub snapshot: PaymentSnapshot,
}
