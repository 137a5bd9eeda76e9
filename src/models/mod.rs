pub mod pubkey;
pub mod request;
pub mod response;
pub mod transaction;
pub mod payment;

pub use pubkey::*;
pub use request::{parse_url, PaymentRequest, TransactionRequest, TransferRequest};
pub use response::*;
pub use transaction::*;
pub use payment::*;
