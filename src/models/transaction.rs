use super::pubkey::{Pubkey, Signature};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Native units per whole coin (lamports).
pub const NATIVE_DECIMALS: u32 = 9;

/// Consistency level a read is performed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    #[default]
    Confirmed,
    Finalized,
}

impl Finality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Finality::Confirmed => "confirmed",
            Finality::Finalized => "finalized",
        }
    }
}

impl std::str::FromStr for Finality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirmed" => Ok(Finality::Confirmed),
            "finalized" => Ok(Finality::Finalized),
            other => Err(format!("unknown finality: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Processed,
    Confirmed,
    Finalized,
}

/// The ledger's settled view of a transaction, as returned by `getTransaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    pub transaction: TransactionEnvelope,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub signatures: Vec<Signature>,
    pub message: TransactionMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub account_keys: Vec<Pubkey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<Pubkey>,
    #[serde(default)]
    pub readonly: Vec<Pubkey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: Pubkey,
    #[serde(default)]
    pub owner: Option<Pubkey>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    /// Raw integer amount in the asset's smallest unit.
    pub amount: String,
    pub decimals: u32,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
}

impl UiTokenAmount {
    /// Exact display amount (`amount * 10^-decimals`). `None` if the raw amount is malformed.
    pub fn display_amount(&self) -> Option<Decimal> {
        let raw: i128 = self.amount.parse().ok()?;
        Decimal::try_from_i128_with_scale(raw, self.decimals).ok()
    }
}

impl TransactionRecord {
    /// Every account the transaction touches, including addresses loaded from lookup tables.
    pub fn account_keys(&self) -> Vec<Pubkey> {
        let mut keys = self.transaction.message.account_keys.clone();
        if let Some(loaded) = self.meta.as_ref().and_then(|m| m.loaded_addresses.as_ref()) {
            keys.extend(loaded.writable.iter().copied());
            keys.extend(loaded.readonly.iter().copied());
        }
        keys
    }

    pub fn account_index(&self, key: &Pubkey) -> Option<usize> {
        self.account_keys().iter().position(|k| k == key)
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.transaction.signatures.first()
    }
}

/// Converts a native balance in lamports into whole coins.
pub fn native_to_display(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(lamports as i128, NATIVE_DECIMALS)
}

/// One entry of `getSignaturesForAddress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub confirmation_status: Option<ConfirmationStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    /// `None` once the block is rooted.
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<ConfirmationStatus>,
}
