pub mod health;
pub mod payments;
pub mod stats;
pub mod verify;
pub mod ws;

pub use health::*;
pub use payments::*;
pub use stats::*;
pub use verify::*;
pub use ws::*;

use crate::services::{Analytics, LedgerRpc, PaymentSessions};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub rpc: Arc<dyn LedgerRpc>,
    pub sessions: Arc<PaymentSessions>,
    pub analytics: Arc<Analytics>,
}
