//! Cancellable repeat-until loop used to bridge an eventually-consistent ledger.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Cooperative cancellation flag shared between a loop and its owner.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Schedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval,
        }
    }

    pub fn starting_after(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

/// Poll intervals for each loop of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub search: Duration,
    pub validation_retry: Duration,
    pub confirmation: Duration,
    pub submission_retry: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            search: Duration::from_millis(250),
            validation_retry: Duration::from_millis(250),
            confirmation: Duration::from_millis(250),
            submission_retry: Duration::from_millis(5000),
        }
    }
}

/// Sleeps for `duration`, returning `false` if `token` was cancelled first.
pub async fn sleep_unless_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => !token.is_cancelled(),
    }
}

/// Runs `action` until it succeeds or fails with an error `should_retry` rejects.
///
/// Returns `None` once `token` is cancelled, including when cancellation lands while
/// `action` is in flight; its result is then discarded.
pub async fn repeat_until<T, E, F, Fut, P>(
    token: &CancellationToken,
    schedule: Schedule,
    mut action: F,
    mut should_retry: P,
) -> Option<Result<T, E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    if !sleep_unless_cancelled(token, schedule.initial_delay).await {
        return None;
    }

    loop {
        let result = action().await;
        if token.is_cancelled() {
            return None;
        }

        match result {
            Ok(value) => return Some(Ok(value)),
            Err(e) if should_retry(&e) => {
                if !sleep_unless_cancelled(token, schedule.interval).await {
                    return None;
                }
            }
            Err(e) => return Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_retries_until_success() {
        let token = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Option<Result<usize, &str>> = repeat_until(
            &token,
            Schedule::every(Duration::from_millis(1)),
            || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Err("not yet")
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Some(Ok(3)));
    }

    #[tokio::test]
    async fn test_stops_on_fatal_error() {
        let token = CancellationToken::new();
        let result: Option<Result<(), &str>> = repeat_until(
            &token,
            Schedule::every(Duration::from_millis(1)),
            || async { Err("fatal") },
            |e| *e != "fatal",
        )
        .await;

        assert_eq!(result, Some(Err("fatal")));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Option<Result<(), ()>> = repeat_until(
            &token,
            Schedule::every(Duration::from_millis(1)),
            || async { Ok(()) },
            |_| true,
        )
        .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_result_discarded_when_cancelled_in_flight() {
        let token = CancellationToken::new();
        let inner = token.clone();
        let result: Option<Result<(), ()>> = repeat_until(
            &token,
            Schedule::every(Duration::from_millis(1)),
            || {
                let inner = inner.clone();
                async move {
                    inner.cancel();
                    Ok(())
                }
            },
            |_| true,
        )
        .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_cancel_wakes_sleeping_loop() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let awake = sleep_unless_cancelled(&token, Duration::from_secs(30)).await;

        assert!(!awake);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
