use crate::{
    error::ValidationError,
    models::{native_to_display, Finality, Pubkey, Signature, TokenBalance, TransactionRecord},
    services::{rpc::LedgerRpc, token::derive_asset_sub_account},
};
use rust_decimal::Decimal;

/// What a transfer must satisfy to count as payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCriteria {
    pub recipient: Pubkey,
    pub amount: Decimal,
    pub spl_token: Option<Pubkey>,
    pub references: Vec<Pubkey>,
    pub finality: Finality,
}

impl TransferCriteria {
    pub fn new(recipient: Pubkey, amount: Decimal) -> Self {
        Self {
            recipient,
            amount,
            spl_token: None,
            references: Vec::new(),
            finality: Finality::default(),
        }
    }

    pub fn with_spl_token(mut self, spl_token: Option<Pubkey>) -> Self {
        self.spl_token = spl_token;
        self
    }

    pub fn with_references(mut self, references: Vec<Pubkey>) -> Self {
        self.references = references;
        self
    }

    pub fn with_finality(mut self, finality: Finality) -> Self {
        self.finality = finality;
        self
    }
}

/// Fetches `signature` and checks it pays `criteria`. Never retries; the caller owns retry policy.
pub async fn validate_transfer(
    rpc: &dyn LedgerRpc,
    signature: &Signature,
    criteria: &TransferCriteria,
) -> Result<TransactionRecord, ValidationError> {
    let record = rpc
        .get_transaction(signature, criteria.finality)
        .await?
        .ok_or(ValidationError::NotFound)?;

    check_transfer(&record, criteria)?;

    tracing::debug!(
        signature = %signature,
        recipient = %criteria.recipient,
        amount = %criteria.amount,
        "Transfer validated"
    );

    Ok(record)
}

/// The offline half of validation, over an already-fetched record.
pub fn check_transfer(
    record: &TransactionRecord,
    criteria: &TransferCriteria,
) -> Result<(), ValidationError> {
    let meta = record
        .meta
        .as_ref()
        .ok_or(ValidationError::MissingMetadata)?;

    if let Some(err) = &meta.err {
        return Err(ValidationError::LedgerExecution(err.clone()));
    }

    let accounts = record.account_keys();

    let (pre, post) = match &criteria.spl_token {
        None => {
            let index = accounts
                .iter()
                .position(|k| *k == criteria.recipient)
                .ok_or(ValidationError::RecipientNotFound)?;
            let pre = meta.pre_balances.get(index).copied().unwrap_or(0);
            let post = meta.post_balances.get(index).copied().unwrap_or(0);
            (native_to_display(pre), native_to_display(post))
        }
        Some(asset) => {
            let sub_account = derive_asset_sub_account(asset, &criteria.recipient);
            let index = accounts
                .iter()
                .position(|k| *k == sub_account)
                .ok_or(ValidationError::RecipientNotFound)?;
            (
                token_balance_at(meta.pre_token_balances.as_deref(), index)?,
                token_balance_at(meta.post_token_balances.as_deref(), index)?,
            )
        }
    };

    let received = post - pre;
    if received < criteria.amount {
        return Err(ValidationError::AmountNotTransferred {
            expected: criteria.amount,
            received,
        });
    }

    for reference in &criteria.references {
        if !accounts.contains(reference) {
            return Err(ValidationError::ReferenceNotFound(*reference));
        }
    }

    Ok(())
}

// A sub-account created by this very transaction has no pre-balance entry, which counts as zero.
// An entry that is present but unreadable is rejected rather than treated as zero.
fn token_balance_at(
    balances: Option<&[TokenBalance]>,
    index: usize,
) -> Result<Decimal, ValidationError> {
    match balances
        .unwrap_or_default()
        .iter()
        .find(|b| b.account_index == index)
    {
        None => Ok(Decimal::ZERO),
        Some(balance) => balance
            .ui_token_amount
            .display_amount()
            .ok_or(ValidationError::UnreadableTokenBalance {
                account_index: index,
            }),
    }
}
