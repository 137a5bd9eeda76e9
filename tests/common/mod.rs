#![allow(dead_code)]

use async_trait::async_trait;
use ledger_pay::{
    error::RpcError,
    models::{
        ConfirmationStatus, Finality, LoadedAddresses, Pubkey, Signature, SignatureInfo,
        SignatureStatus, TokenBalance, TransactionEnvelope, TransactionMessage, TransactionMeta,
        TransactionRecord, UiTokenAmount,
    },
    services::{LedgerRpc, PollIntervals, SignaturesForAddressOptions},
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What `getTransaction` answers with on one call.
#[derive(Debug, Clone)]
pub enum Lookup {
    Missing,
    NoMeta,
    Unavailable,
    Found(TransactionRecord),
}

/// In-memory ledger driven by scripted answers. The last scripted answer repeats.
#[derive(Default)]
pub struct ScriptedLedger {
    transactions: Mutex<VecDeque<Lookup>>,
    statuses: Mutex<VecDeque<Option<SignatureStatus>>>,
    signatures: Mutex<HashMap<Pubkey, Vec<SignatureInfo>>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    search_failures: AtomicUsize,
    fail_later_pages: AtomicBool,
    pub transaction_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_transactions(&self, lookups: impl IntoIterator<Item = Lookup>) {
        self.transactions.lock().unwrap().extend(lookups);
    }

    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = Option<SignatureStatus>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    /// Makes `signature` discoverable through `reference`.
    pub fn attach(&self, reference: Pubkey, signature: Signature) {
        self.signatures
            .lock()
            .unwrap()
            .entry(reference)
            .or_default()
            .push(SignatureInfo {
                signature,
                slot: 100,
                err: None,
                memo: None,
                block_time: None,
                confirmation_status: Some(ConfirmationStatus::Confirmed),
            });
    }

    /// The next `count` searches fail at the RPC level.
    pub fn fail_searches(&self, count: usize) {
        self.search_failures.store(count, Ordering::SeqCst);
    }

    /// Searches paging past the first page (`before` set) fail at the RPC level.
    pub fn fail_later_pages(&self) {
        self.fail_later_pages.store(true, Ordering::SeqCst);
    }

    /// Makes `count` distinct signatures discoverable through `reference`, newest first.
    pub fn attach_many(&self, reference: Pubkey, count: usize) -> Vec<Signature> {
        let signatures: Vec<Signature> = (0..count)
            .map(|i| {
                let mut bytes = [0u8; 64];
                bytes[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
                Signature::new(bytes)
            })
            .collect();
        for signature in &signatures {
            self.attach(reference, *signature);
        }
        signatures
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().unwrap().clone()
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl LedgerRpc for ScriptedLedger {
    async fn get_transaction(
        &self,
        _signature: &Signature,
        _finality: Finality,
    ) -> Result<Option<TransactionRecord>, RpcError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        match Self::next(&self.transactions).unwrap_or(Lookup::Missing) {
            Lookup::Missing => Ok(None),
            Lookup::Unavailable => Err(RpcError::Rpc {
                code: -32005,
                message: "Node is behind".to_string(),
            }),
            Lookup::NoMeta => Ok(Some(TransactionRecord {
                slot: 100,
                block_time: None,
                transaction: TransactionEnvelope {
                    signatures: vec![],
                    message: TransactionMessage {
                        account_keys: vec![],
                    },
                },
                meta: None,
            })),
            Lookup::Found(record) => Ok(Some(record)),
        }
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        options: SignaturesForAddressOptions,
    ) -> Result<Vec<SignatureInfo>, RpcError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .search_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || (options.before.is_some() && self.fail_later_pages.load(Ordering::SeqCst)) {
            return Err(RpcError::Rpc {
                code: -32603,
                message: "Internal error".to_string(),
            });
        }
        if options.before.is_some() {
            return Ok(vec![]);
        }
        Ok(self
            .signatures
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.statuses).flatten())
    }

    async fn send_transaction(&self, transaction: &[u8]) -> Result<Signature, RpcError> {
        self.submitted.lock().unwrap().push(transaction.to_vec());
        Ok(Signature::new([7u8; 64]))
    }

    async fn get_health(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

pub fn key(byte: u8) -> Pubkey {
    Pubkey::new([byte; 32])
}

pub fn signature(byte: u8) -> Signature {
    Signature::new([byte; 64])
}

pub fn fast_intervals() -> PollIntervals {
    PollIntervals {
        search: Duration::from_millis(5),
        validation_retry: Duration::from_millis(5),
        confirmation: Duration::from_millis(5),
        submission_retry: Duration::from_millis(20),
    }
}

pub fn status(confirmations: Option<u64>, err: Option<Value>) -> Option<SignatureStatus> {
    Some(SignatureStatus {
        slot: 100,
        confirmations,
        err,
        confirmation_status: Some(if confirmations.is_none() {
            ConfirmationStatus::Finalized
        } else {
            ConfirmationStatus::Confirmed
        }),
    })
}

/// A native transfer moving lamports from `payer` into `recipient`.
pub fn native_transfer(
    signature: Signature,
    payer: Pubkey,
    recipient: Pubkey,
    recipient_balances: (u64, u64),
    references: &[Pubkey],
) -> TransactionRecord {
    let mut account_keys = vec![payer, recipient];
    account_keys.extend_from_slice(references);

    let mut pre_balances = vec![5_000_000_000, recipient_balances.0];
    let mut post_balances = vec![4_000_000_000, recipient_balances.1];
    pre_balances.resize(account_keys.len(), 0);
    post_balances.resize(account_keys.len(), 0);

    record(signature, account_keys, pre_balances, post_balances, None, None)
}

/// A token transfer into `sub_account`. `pre` is `None` when the account is created in the same transaction.
pub fn token_transfer(
    signature: Signature,
    asset: Pubkey,
    sub_account: Pubkey,
    pre: Option<&str>,
    post: &str,
    decimals: u32,
    references: &[Pubkey],
) -> TransactionRecord {
    let mut account_keys = vec![key(1), sub_account];
    account_keys.extend_from_slice(references);
    let balances = vec![0; account_keys.len()];

    let balance = |amount: &str| TokenBalance {
        account_index: 1,
        mint: asset,
        owner: None,
        ui_token_amount: UiTokenAmount {
            amount: amount.to_string(),
            decimals,
            ui_amount_string: None,
        },
    };

    record(
        signature,
        account_keys,
        balances.clone(),
        balances,
        Some(pre.map(balance).into_iter().collect()),
        Some(vec![balance(post)]),
    )
}

fn record(
    signature: Signature,
    account_keys: Vec<Pubkey>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
    pre_token_balances: Option<Vec<TokenBalance>>,
    post_token_balances: Option<Vec<TokenBalance>>,
) -> TransactionRecord {
    TransactionRecord {
        slot: 100,
        block_time: Some(1_700_000_000),
        transaction: TransactionEnvelope {
            signatures: vec![signature],
            message: TransactionMessage { account_keys },
        },
        meta: Some(TransactionMeta {
            err: None,
            fee: 5000,
            pre_balances,
            post_balances,
            pre_token_balances,
            post_token_balances,
            loaded_addresses: Some(LoadedAddresses::default()),
        }),
    }
}
