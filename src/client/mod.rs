pub mod transaction_request;
pub mod wallet;

pub use transaction_request::{FetchedTransaction, TransactionRequestClient, TransactionRequestInfo};
pub use wallet::{LocalWallet, Wallet};
