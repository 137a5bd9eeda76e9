//! Payment attempt lifecycle: `New → Pending → Confirmed → Valid → Finalized`, or `Invalid`.
//!
//! Each stage owns at most one polling loop (plus the optional submission loop while
//! pending). Loops run as spawned tasks holding the stage's [`CancellationToken`]; every
//! write goes through [`Shared::with_live_state`], which re-checks that token under the
//! state lock. Leaving a stage cancels its token, so a late iteration can never write.

use crate::{
    client::{TransactionRequestClient, Wallet},
    error::{FindReferenceError, PaymentError, RequestUrlError, RpcError, WalletError},
    models::{
        request::format_amount, ConfirmationStatus, Finality, PaymentSnapshot, PaymentStatus,
        Pubkey, Signature, TransactionRequest, TransferRequest,
    },
    services::{
        poll::{repeat_until, CancellationToken, PollIntervals, Schedule},
        reference::{find_reference, generate_reference},
        rpc::LedgerRpc,
        validator::{validate_transfer, TransferCriteria},
    },
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use url::Url;

/// Immutable settings shared by every payment attempt.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub recipient: Pubkey,
    pub spl_token: Option<Pubkey>,
    pub label: String,
    /// Transaction-request endpoint. Without one, descriptors are plain transfer requests.
    pub link: Option<Url>,
    pub decimals: u32,
    pub required_confirmations: u64,
    pub connect_wallet: bool,
    pub finality: Finality,
}

impl PaymentConfig {
    pub fn new(recipient: Pubkey, label: impl Into<String>) -> Self {
        Self {
            recipient,
            spl_token: None,
            label: label.into(),
            link: None,
            decimals: crate::models::NATIVE_DECIMALS,
            required_confirmations: 1,
            connect_wallet: false,
            finality: Finality::Confirmed,
        }
    }
}

struct PaymentState {
    status: PaymentStatus,
    amount: Option<Decimal>,
    message: Option<String>,
    reference: Option<Pubkey>,
    signature: Option<Signature>,
    confirmations: u64,
    stage_token: CancellationToken,
}

impl PaymentState {
    fn fresh() -> Self {
        Self {
            status: PaymentStatus::New,
            amount: None,
            message: None,
            reference: None,
            signature: None,
            confirmations: 0,
            stage_token: CancellationToken::new(),
        }
    }

    /// Cancels the current stage's loops and hands out a token for the next stage.
    fn enter(&mut self, status: PaymentStatus) -> CancellationToken {
        self.stage_token.cancel();
        self.stage_token = CancellationToken::new();
        self.status = status;
        self.stage_token.clone()
    }
}

struct Shared {
    config: Arc<PaymentConfig>,
    rpc: Arc<dyn LedgerRpc>,
    wallet: Option<Arc<dyn Wallet>>,
    requests: TransactionRequestClient,
    intervals: PollIntervals,
    state: Mutex<PaymentState>,
    updates: watch::Sender<PaymentSnapshot>,
}

pub struct PaymentMachineBuilder {
    config: Arc<PaymentConfig>,
    rpc: Arc<dyn LedgerRpc>,
    wallet: Option<Arc<dyn Wallet>>,
    intervals: PollIntervals,
}

impl PaymentMachineBuilder {
    pub fn with_wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn build(self) -> PaymentMachine {
        let state = PaymentState::fresh();
        let (updates, _) = watch::channel(snapshot_of(&self.config, &state));
        PaymentMachine {
            shared: Arc::new(Shared {
                config: self.config,
                rpc: self.rpc,
                wallet: self.wallet,
                requests: TransactionRequestClient::new(),
                intervals: self.intervals,
                state: Mutex::new(state),
                updates,
            }),
        }
    }
}

/// One payment attempt at a time; `reset` starts over with a fresh reference.
pub struct PaymentMachine {
    shared: Arc<Shared>,
}

impl PaymentMachine {
    pub fn new(config: Arc<PaymentConfig>, rpc: Arc<dyn LedgerRpc>) -> Self {
        Self::builder(config, rpc).build()
    }

    pub fn builder(config: Arc<PaymentConfig>, rpc: Arc<dyn LedgerRpc>) -> PaymentMachineBuilder {
        PaymentMachineBuilder {
            config,
            rpc,
            wallet: None,
            intervals: PollIntervals::default(),
        }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.shared.config
    }

    pub fn set_amount(&self, amount: Decimal) -> Result<(), PaymentError> {
        if amount.is_sign_negative() {
            return Err(PaymentError::NegativeAmount);
        }
        let decimals = self.shared.config.decimals;
        if amount.normalize().scale() > decimals {
            return Err(PaymentError::TooManyDecimals(decimals));
        }

        let mut state = self.shared.lock();
        if state.status != PaymentStatus::New {
            return Err(PaymentError::AlreadyGenerated);
        }
        state.amount = Some(amount);
        self.shared.publish(&state);
        Ok(())
    }

    pub fn set_message(&self, message: Option<String>) -> Result<(), PaymentError> {
        let mut state = self.shared.lock();
        if state.status != PaymentStatus::New {
            return Err(PaymentError::AlreadyGenerated);
        }
        descriptor(&self.shared.config, state.amount, state.reference, message.clone())?;
        state.message = message;
        self.shared.publish(&state);
        Ok(())
    }

    /// Binds a fresh reference and starts looking for the transaction that carries it.
    pub fn generate(&self) -> Result<Pubkey, PaymentError> {
        let (token, reference, amount) = {
            let mut state = self.shared.lock();
            if state.status != PaymentStatus::New || state.reference.is_some() {
                return Err(PaymentError::AlreadyGenerated);
            }
            let amount = state.amount.ok_or(PaymentError::MissingAmount)?;
            let reference = generate_reference();
            state.reference = Some(reference);
            let token = state.enter(PaymentStatus::Pending);
            self.shared.publish(&state);
            (token, reference, amount)
        };

        tracing::info!(reference = %reference, amount = %amount, "Payment pending");

        tokio::spawn(self.shared.clone().run_search(token.clone(), reference));
        self.shared.clone().maybe_start_submission(token, reference, amount);

        Ok(reference)
    }

    /// Abandons the attempt. Any in-flight loop observes cancellation and writes nothing.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.stage_token.cancel();
        *state = PaymentState::fresh();
        self.shared.publish(&state);
        tracing::info!("Payment reset");
    }

    pub fn snapshot(&self) -> PaymentSnapshot {
        self.shared.updates.borrow().clone()
    }

    pub fn status(&self) -> PaymentStatus {
        self.shared.lock().status
    }

    pub fn url(&self) -> String {
        self.snapshot().url
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Waits until the attempt reaches `Finalized` or `Invalid`.
    pub async fn settled(&self) -> PaymentSnapshot {
        let mut updates = self.subscribe();
        loop {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            if updates.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

impl Drop for PaymentMachine {
    fn drop(&mut self) {
        self.shared.lock().stage_token.cancel();
    }
}

enum ConfirmationError {
    NotYet,
    Ledger(Value),
    Rpc(RpcError),
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PaymentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &PaymentState) {
        let snapshot = snapshot_of(&self.config, state);
        self.updates.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    /// Runs `apply` only if `token` still belongs to the live stage.
    fn with_live_state<R>(
        &self,
        token: &CancellationToken,
        apply: impl FnOnce(&mut PaymentState) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        if token.is_cancelled() {
            return None;
        }
        let result = apply(&mut state);
        self.publish(&state);
        Some(result)
    }

    fn fail(&self, token: &CancellationToken) {
        let failed = self.with_live_state(token, |state| {
            state.enter(PaymentStatus::Invalid).cancel();
        });
        if failed.is_some() {
            tracing::warn!("Payment invalid");
        }
    }

    async fn run_search(self: Arc<Self>, token: CancellationToken, reference: Pubkey) {
        let rpc = self.rpc.clone();
        let finality = self.config.finality;
        let interval = self.intervals.search;

        let outcome = repeat_until(
            &token,
            Schedule::every(interval).starting_after(interval),
            move || {
                let rpc = rpc.clone();
                async move { find_reference(rpc.as_ref(), &reference, finality).await }
            },
            |e| {
                if let FindReferenceError::Rpc(e) = e {
                    tracing::error!(reference = %reference, error = %e, "Reference search failed");
                }
                true
            },
        )
        .await;

        let Some(Ok(found)) = outcome else {
            tracing::debug!(reference = %reference, "Reference search stopped");
            return;
        };

        let next = self.with_live_state(&token, |state| {
            state.signature = Some(found.signature);
            let token = state.enter(PaymentStatus::Confirmed);
            state.amount.map(|amount| (token, amount))
        });

        if let Some(Some((token, amount))) = next {
            tracing::info!(signature = %found.signature, slot = found.slot, "Payment confirmed");
            tokio::spawn(self.run_validation(token, found.signature, reference, amount));
        }
    }

    fn maybe_start_submission(
        self: Arc<Self>,
        token: CancellationToken,
        reference: Pubkey,
        amount: Decimal,
    ) {
        if !self.config.connect_wallet {
            return;
        }
        let Some(wallet) = self.wallet.clone() else {
            return;
        };
        let Some(link) = request_link(&self.config, Some(amount), Some(reference)) else {
            tracing::warn!("Wallet attached but no transaction request link configured");
            return;
        };
        tokio::spawn(self.run_submission(token, link, wallet));
    }

    async fn run_submission(
        self: Arc<Self>,
        token: CancellationToken,
        link: Url,
        wallet: Arc<dyn Wallet>,
    ) {
        let rpc = self.rpc.clone();
        let requests = self.requests.clone();
        let live = token.clone();

        let outcome = repeat_until(
            &token,
            Schedule::every(self.intervals.submission_retry),
            move || {
                let (rpc, requests, wallet, link, live) = (
                    rpc.clone(),
                    requests.clone(),
                    wallet.clone(),
                    link.clone(),
                    live.clone(),
                );
                async move {
                    let fetched = requests
                        .fetch_transaction(&wallet.public_key(), &link)
                        .await?;
                    let signed = wallet.sign_transaction(fetched.transaction).await?;
                    if live.is_cancelled() {
                        return Err(WalletError::Cancelled);
                    }
                    Ok::<_, WalletError>(rpc.send_transaction(&signed).await?)
                }
            },
            |e| {
                tracing::warn!(error = %e, "Transaction submission failed, retrying");
                true
            },
        )
        .await;

        if let Some(Ok(signature)) = outcome {
            tracing::info!(signature = %signature, "Transaction submitted");
        }
    }

    async fn run_validation(
        self: Arc<Self>,
        token: CancellationToken,
        signature: Signature,
        reference: Pubkey,
        amount: Decimal,
    ) {
        let rpc = self.rpc.clone();
        let criteria = Arc::new(
            TransferCriteria::new(self.config.recipient, amount)
                .with_spl_token(self.config.spl_token)
                .with_references(vec![reference])
                .with_finality(self.config.finality),
        );

        let outcome = repeat_until(
            &token,
            Schedule::every(self.intervals.validation_retry),
            move || {
                let (rpc, criteria) = (rpc.clone(), criteria.clone());
                async move { validate_transfer(rpc.as_ref(), &signature, &criteria).await }
            },
            |e| {
                if e.is_retryable() {
                    tracing::warn!(signature = %signature, error = %e, "Transaction not available yet");
                    true
                } else {
                    false
                }
            },
        )
        .await;

        match outcome {
            Some(Ok(_)) => {
                let next = self.with_live_state(&token, |state| state.enter(PaymentStatus::Valid));
                if let Some(token) = next {
                    tracing::info!(signature = %signature, "Payment valid");
                    tokio::spawn(self.run_confirmations(token, signature));
                }
            }
            Some(Err(e)) => {
                tracing::error!(signature = %signature, error = %e, "Transfer validation failed");
                self.fail(&token);
            }
            None => tracing::debug!(signature = %signature, "Validation stopped"),
        }
    }

    async fn run_confirmations(self: Arc<Self>, token: CancellationToken, signature: Signature) {
        let shared = self.clone();
        let live = token.clone();
        let required = self.config.required_confirmations;

        let outcome = repeat_until(
            &token,
            Schedule::every(self.intervals.confirmation).starting_after(self.intervals.confirmation),
            move || {
                let (shared, live) = (shared.clone(), live.clone());
                async move {
                    let status = shared
                        .rpc
                        .get_signature_status(&signature)
                        .await
                        .map_err(ConfirmationError::Rpc)?
                        .ok_or(ConfirmationError::NotYet)?;
                    if let Some(err) = status.err {
                        return Err(ConfirmationError::Ledger(err));
                    }

                    let confirmations = status.confirmations;
                    shared.with_live_state(&live, |state| {
                        if let Some(confirmations) = confirmations {
                            state.confirmations = confirmations;
                        }
                    });

                    let rooted = status.confirmation_status == Some(ConfirmationStatus::Finalized);
                    if rooted || confirmations.unwrap_or(0) >= required {
                        Ok(())
                    } else {
                        Err(ConfirmationError::NotYet)
                    }
                }
            },
            |e| match e {
                ConfirmationError::NotYet => true,
                ConfirmationError::Rpc(e) => {
                    tracing::warn!(signature = %signature, error = %e, "Signature status unavailable");
                    true
                }
                ConfirmationError::Ledger(_) => false,
            },
        )
        .await;

        match outcome {
            Some(Ok(())) => {
                let done = self.with_live_state(&token, |state| {
                    state.enter(PaymentStatus::Finalized).cancel();
                });
                if done.is_some() {
                    tracing::info!(signature = %signature, "Payment finalized");
                }
            }
            Some(Err(ConfirmationError::Ledger(err))) => {
                tracing::error!(signature = %signature, error = %err, "Transaction failed on ledger");
                self.fail(&token);
            }
            Some(Err(_)) | None => {}
        }
    }
}

fn snapshot_of(config: &PaymentConfig, state: &PaymentState) -> PaymentSnapshot {
    let progress = if state.status == PaymentStatus::Finalized {
        1.0
    } else {
        (state.confirmations as f64 / config.required_confirmations.max(1) as f64).min(1.0)
    };

    let url = descriptor(config, state.amount, state.reference, state.message.clone())
        .map(|url| url.to_string())
        .unwrap_or_default();

    PaymentSnapshot {
        status: state.status,
        amount: state.amount,
        message: state.message.clone(),
        reference: state.reference,
        signature: state.signature,
        confirmations: state.confirmations,
        progress,
        url,
    }
}

/// The request descriptor for the current amount, reference, and message.
pub fn descriptor(
    config: &PaymentConfig,
    amount: Option<Decimal>,
    reference: Option<Pubkey>,
    message: Option<String>,
) -> Result<Url, RequestUrlError> {
    match request_link(config, amount, reference) {
        Some(link) => TransactionRequest {
            link,
            label: Some(config.label.clone()),
            message,
        }
        .encode(),
        None => TransferRequest {
            amount,
            spl_token: config.spl_token,
            references: reference.into_iter().collect(),
            label: Some(config.label.clone()),
            message,
            ..TransferRequest::new(config.recipient)
        }
        .encode(),
    }
}

// The configured link with `amount` and `reference` appended, if a link is configured.
fn request_link(
    config: &PaymentConfig,
    amount: Option<Decimal>,
    reference: Option<Pubkey>,
) -> Option<Url> {
    let mut link = config.link.clone()?;
    let mut pairs = Vec::new();
    if let Some(amount) = amount {
        pairs.push(("amount", format_amount(amount)));
    }
    if let Some(reference) = reference {
        pairs.push(("reference", reference.to_string()));
    }
    if !pairs.is_empty() {
        link.query_pairs_mut().extend_pairs(pairs);
    }
    Some(link)
}
