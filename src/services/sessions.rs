use crate::{
    client::Wallet,
    error::{PayError, PaymentError},
    models::{PaymentSession, PaymentStatus},
    services::{Analytics, LedgerRpc, PaymentConfig, PaymentMachine, PollIntervals},
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_SESSIONS: usize = 10_000;
const PENDING_TTL: Duration = Duration::from_secs(15 * 60);

struct Session {
    machine: Arc<PaymentMachine>,
    started_at: Instant,
}

impl Session {
    // Terminal, reset, or pending for longer than `pending_ttl`.
    fn is_stale(&self, pending_ttl: Duration) -> bool {
        match self.machine.status() {
            PaymentStatus::New | PaymentStatus::Finalized | PaymentStatus::Invalid => true,
            PaymentStatus::Pending => self.started_at.elapsed() >= pending_ttl,
            _ => false,
        }
    }
}

/// Payment attempts driven through the HTTP API, keyed by an opaque id.
pub struct PaymentSessions {
    config: Arc<PaymentConfig>,
    rpc: Arc<dyn LedgerRpc>,
    wallet: Option<Arc<dyn Wallet>>,
    intervals: PollIntervals,
    analytics: Arc<Analytics>,
    capacity: usize,
    pending_ttl: Duration,
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl PaymentSessions {
    pub fn new(
        config: Arc<PaymentConfig>,
        rpc: Arc<dyn LedgerRpc>,
        analytics: Arc<Analytics>,
    ) -> Self {
        Self {
            config,
            rpc,
            wallet: None,
            intervals: PollIntervals::default(),
            analytics,
            capacity: MAX_SESSIONS,
            pending_ttl: PENDING_TTL,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_wallet(mut self, wallet: Option<Arc<dyn Wallet>>) -> Self {
        self.wallet = wallet;
        self
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Caps live attempts. Once full, stale attempts are evicted and new ones refused if none are.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// How long an attempt may wait for its transaction before it can be evicted.
    pub fn with_pending_ttl(mut self, pending_ttl: Duration) -> Self {
        self.pending_ttl = pending_ttl;
        self
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Creates an attempt and generates its reference straight away.
    pub async fn create(
        &self,
        amount: Decimal,
        message: Option<String>,
    ) -> Result<PaymentSession, PayError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.capacity {
            self.evict_stale(&mut sessions);
            if sessions.len() >= self.capacity {
                tracing::warn!(capacity = self.capacity, "Payment session limit reached");
                return Err(PayError::SessionLimitReached);
            }
        }

        let mut builder = PaymentMachine::builder(self.config.clone(), self.rpc.clone())
            .with_intervals(self.intervals);
        if let Some(wallet) = &self.wallet {
            builder = builder.with_wallet(wallet.clone());
        }
        let machine = Arc::new(builder.build());
        let id = Uuid::new_v4();

        self.start(&machine, amount, message)?;
        sessions.insert(
            id,
            Session {
                machine: machine.clone(),
                started_at: Instant::now(),
            },
        );

        tracing::info!(payment_id = %id, "Payment session created");

        Ok(PaymentSession {
            id,
            snapshot: machine.snapshot(),
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<PaymentMachine>, PayError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|session| session.machine.clone())
            .ok_or(PayError::PaymentNotFound(id))
    }

    pub async fn reset(&self, id: Uuid) -> Result<PaymentSession, PayError> {
        let machine = self.get(id).await?;
        machine.reset();
        Ok(PaymentSession {
            id,
            snapshot: machine.snapshot(),
        })
    }

    /// Starts a fresh attempt on a session that was reset.
    pub async fn regenerate(
        &self,
        id: Uuid,
        amount: Decimal,
        message: Option<String>,
    ) -> Result<PaymentSession, PayError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(PayError::PaymentNotFound(id))?;
        self.start(&session.machine, amount, message)?;
        session.started_at = Instant::now();
        Ok(PaymentSession {
            id,
            snapshot: session.machine.snapshot(),
        })
    }

    fn start(
        &self,
        machine: &Arc<PaymentMachine>,
        amount: Decimal,
        message: Option<String>,
    ) -> Result<(), PaymentError> {
        machine.set_amount(amount)?;
        machine.set_message(message)?;
        machine.generate()?;
        self.analytics.record_payment_started();
        tokio::spawn(watch_outcome(machine.clone(), self.analytics.clone()));
        Ok(())
    }

    // Expired pending attempts are reset so their search loops stop.
    fn evict_stale(&self, sessions: &mut HashMap<Uuid, Session>) {
        let before = sessions.len();
        sessions.retain(|id, session| {
            if !session.is_stale(self.pending_ttl) {
                return true;
            }
            if session.machine.status() == PaymentStatus::Pending {
                tracing::info!(payment_id = %id, "Pending payment expired");
                session.machine.reset();
            }
            false
        });
        tracing::debug!(evicted = before - sessions.len(), "Evicted stale payment sessions");
    }
}

// Records the terminal stage of one attempt; gives up if the attempt is reset first.
async fn watch_outcome(machine: Arc<PaymentMachine>, analytics: Arc<Analytics>) {
    let mut updates = machine.subscribe();
    drop(machine);
    loop {
        let status = updates.borrow_and_update().status;
        if status.is_terminal() {
            analytics.record_payment_settled(status);
            return;
        }
        if status == PaymentStatus::New || updates.changed().await.is_err() {
            return;
        }
    }
}
