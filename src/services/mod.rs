pub mod analytics;
pub mod payment;
pub mod poll;
pub mod reference;
pub mod rpc;
pub mod sessions;
pub mod token;
pub mod validator;

pub use analytics::Analytics;
pub use payment::{PaymentConfig, PaymentMachine, PaymentMachineBuilder};
pub use poll::{repeat_until, CancellationToken, PollIntervals, Schedule};
pub use reference::{find_reference, generate_reference};
pub use rpc::{HttpLedgerRpc, LedgerRpc, SignaturesForAddressOptions};
pub use sessions::PaymentSessions;
pub use token::derive_asset_sub_account;
pub use validator::{check_transfer, validate_transfer, TransferCriteria};
