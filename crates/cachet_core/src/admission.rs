//! Token-bucket admission control.
//!
//! One bucket per process. Request tasks call [`TokenBucket::take_token`],
//! which never waits: it either consumes a token or denies on the spot.
//! Refilling happens on a separate periodic task ([`RefillTask`]) so the
//! request path never touches a timer.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

/// Shortest refill period the refill task accepts.
pub const MIN_REFILL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Throttled. A normal outcome, not an error.
    Denied,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    refill_rate: u64,
    refill_interval: Duration,
    tokens: Mutex<u64>,
    running: AtomicBool,
    log: Span,
}

impl TokenBucket {
    /// A full bucket in the running state, without a refill task.
    /// [`TokenBucket::spawn`] is what servers use.
    pub fn new(capacity: u64, refill_rate: u64, refill_interval: Duration, log: Span) -> Self {
        Self {
            capacity,
            refill_rate,
            refill_interval,
            tokens: Mutex::new(capacity),
            running: AtomicBool::new(true),
            log,
        }
    }

    /// Creates the bucket and starts its refill task. The first refill lands
    /// one full interval from now. Intervals below [`MIN_REFILL_INTERVAL`]
    /// are raised to it.
    pub fn spawn(
        capacity: u64,
        refill_rate: u64,
        refill_interval: Duration,
        log: Span,
    ) -> (Arc<Self>, RefillTask) {
        let refill_interval = if refill_interval < MIN_REFILL_INTERVAL {
            warn!(
                target: "cachet::admission",
                parent: &log,
                requested_ms = refill_interval.as_millis() as u64,
                "Refill interval too short; using the minimum"
            );
            MIN_REFILL_INTERVAL
        } else {
            refill_interval
        };

        let bucket = Arc::new(Self::new(capacity, refill_rate, refill_interval, log));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(refill_loop(bucket.clone(), cancel.clone()));

        info!(
            target: "cachet::admission",
            parent: &bucket.log,
            capacity,
            refill_rate,
            refill_interval_ms = refill_interval.as_millis() as u64,
            "Token bucket refill task started"
        );

        let task = RefillTask {
            bucket: bucket.clone(),
            cancel,
            handle,
        };
        (bucket, task)
    }

    /// Consumes one token if any is left. Never blocks beyond the counter lock.
    pub fn take_token(&self) -> Admission {
        let mut tokens = self.lock_tokens();
        if *tokens > 0 {
            *tokens -= 1;
            Admission::Admitted
        } else {
            Admission::Denied
        }
    }

    /// Adds `refill_rate` tokens, clamped at capacity. No-op once stopped.
    /// Returns the count after the refill.
    pub fn refill(&self) -> u64 {
        let mut tokens = self.lock_tokens();
        if self.is_running() {
            *tokens = tokens.saturating_add(self.refill_rate).min(self.capacity);
        }
        *tokens
    }

    /// Snapshot of the current count.
    pub fn available(&self) -> u64 {
        *self.lock_tokens()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn lock_tokens(&self) -> MutexGuard<'_, u64> {
        // Poison is ignored: the counter is always a valid value.
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner handle of the refill task. [`RefillTask::stop`] consumes it, so the
/// task is stopped at most once.
#[derive(Debug)]
pub struct RefillTask {
    bucket: Arc<TokenBucket>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefillTask {
    /// Moves the bucket to Stopped and waits for the refill task to exit.
    /// `take_token` keeps working against the last count.
    pub async fn stop(self) {
        let Self {
            bucket,
            cancel,
            handle,
        } = self;

        bucket.running.store(false, Ordering::Release);
        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(
                target: "cachet::admission",
                parent: &bucket.log,
                error = ?e,
                "Refill task ended abnormally"
            );
        }
        info!(
            target: "cachet::admission",
            parent: &bucket.log,
            tokens = bucket.available(),
            "Token bucket stopped"
        );
    }
}

async fn refill_loop(bucket: Arc<TokenBucket>, cancel: CancellationToken) {
    let period = bucket.refill_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let tokens = bucket.refill();
                debug!(target: "cachet::admission", parent: &bucket.log, tokens, "Refilled");
            }
        }
    }
}
