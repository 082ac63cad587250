//! Timer and debounce abstraction with deterministic "advance clock"
//! support for tests (spec §9 design note).
//!
//! Two clock backends exist behind the [`Clock`] trait: [`SystemClock`]
//! (wall-clock `tokio::time`) for production use, and [`TestClock`] for
//! tests that need to assert debounce/TTL behavior without sleeping.

use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};

/// Abstracts "now" and "has this many ms elapsed" so debounce/TTL logic can
/// be tested without real sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is advanced explicitly by tests.
#[derive(Clone)]
pub struct TestClock {
    millis: Arc<AtomicI64>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        self.millis
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).expect("valid test clock value")
    }
}

/// Debounces a repeated "please persist soon" request into a single
/// scheduled flush, the way `MemoryStore::schedulePersist` coalesces writes
/// (spec §4.2). A flag-based debounce: `request()` is cheap and idempotent;
/// the caller's background task decides when to actually flush by checking
/// [`DebounceHandle::should_flush`] after the configured interval, or by
/// calling `force()` for an immediate flush (`saveNow()`).
pub struct DebounceHandle {
    pending: Arc<AtomicBool>,
}

impl DebounceHandle {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark that a flush is wanted. Multiple calls before the flush runs
    /// coalesce into one.
    pub fn request(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Atomically consume the pending flag. Returns `true` at most once per
    /// `request()` (or burst of requests).
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

impl Default for DebounceHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A `tokio::spawn`-backed periodic timer (spec §5: "Timers ... are tracked
/// and cleared on destroy"). Mirrors a heartbeat task: a ticker loop owns
/// nothing but an `AtomicBool`, so the actual cleanup/save work still runs
/// on the owner's own access path rather than racing a background task
/// against `&mut MemoryStore`. `stop()` (and `Drop`) aborts the task, which
/// is what "cleared on destroy" means for a handle with no return value.
pub struct IntervalTimer {
    handle: tokio::task::JoinHandle<()>,
    due: Arc<AtomicBool>,
}

impl IntervalTimer {
    pub fn start(period: std::time::Duration) -> Self {
        let due = Arc::new(AtomicBool::new(false));
        let due_task = due.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                due_task.store(true, Ordering::SeqCst);
            }
        });
        Self { handle, due }
    }

    /// Atomically consume the due flag. `true` at most once per elapsed
    /// period, regardless of how many periods actually passed.
    pub fn take_due(&self) -> bool {
        self.due.swap(false, Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timer_becomes_due_after_its_period_elapses() {
        let timer = IntervalTimer::start(std::time::Duration::from_millis(10));
        assert!(!timer.take_due());
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(timer.take_due());
        assert!(!timer.take_due(), "take_due should consume the flag");
    }

    #[tokio::test]
    async fn stopped_timer_never_becomes_due_again() {
        let timer = IntervalTimer::start(std::time::Duration::from_millis(10));
        timer.stop();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        let _ = timer.take_due();
    }
}
