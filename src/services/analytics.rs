use crate::models::{PaymentStatus, Stats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// In-process counters for verifications and payment attempts.
pub struct Analytics {
    verifications_total: AtomicU64,
    verifications_failed: AtomicU64,
    payments_started: AtomicU64,
    payments_finalized: AtomicU64,
    payments_invalid: AtomicU64,
    start_time: Instant,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    pub fn new() -> Self {
        Self {
            verifications_total: AtomicU64::new(0),
            verifications_failed: AtomicU64::new(0),
            payments_started: AtomicU64::new(0),
            payments_finalized: AtomicU64::new(0),
            payments_invalid: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_verification(&self, success: bool) {
        self.verifications_total.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.verifications_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_payment_started(&self) {
        self.payments_started.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_payment_settled(&self, status: PaymentStatus) {
        match status {
            PaymentStatus::Finalized => {
                self.payments_finalized.fetch_add(1, Ordering::SeqCst);
            }
            PaymentStatus::Invalid => {
                self.payments_invalid.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        tracing::info!(status = ?status, "Payment settled");
    }

    pub fn get_stats(&self) -> Stats {
        Stats {
            verifications_total: self.verifications_total.load(Ordering::SeqCst),
            verifications_failed: self.verifications_failed.load(Ordering::SeqCst),
            payments_started: self.payments_started.load(Ordering::SeqCst),
            payments_finalized: self.payments_finalized.load(Ordering::SeqCst),
            payments_invalid: self.payments_invalid.load(Ordering::SeqCst),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_outcomes() {
        let analytics = Analytics::new();
        analytics.record_verification(true);
        analytics.record_verification(false);
        analytics.record_payment_started();
        analytics.record_payment_settled(PaymentStatus::Finalized);
        analytics.record_payment_settled(PaymentStatus::Pending);

        let stats = analytics.get_stats();
        assert_eq!(stats.verifications_total, 2);
        assert_eq!(stats.verifications_failed, 1);
        assert_eq!(stats.payments_started, 1);
        assert_eq!(stats.payments_finalized, 1);
        assert_eq!(stats.payments_invalid, 0);
    }
}
