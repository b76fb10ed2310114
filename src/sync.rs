//! Thread coordination primitives shared by the audio engine and the
//! playlist scheduler.
//!
//! Background threads in this crate follow one pattern: wait on a [`Signal`]
//! with a short timeout, then check a [`CancellationToken`] before doing any
//! work. Shutdown cancels the token and sets every signal, so no thread waits
//! longer than a single timeout after `exit`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub use tokio_util::sync::CancellationToken;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// State behind these locks stays consistent across a panic (every writer
/// completes its update before any call that could fail), so the poison flag
/// carries no information we act on.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Auto-reset event: `set` wakes one waiter, and the wait consumes the flag.
#[derive(Debug, Default)]
pub struct Signal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut raised = lock(&self.raised);
        *raised = true;
        self.cond.notify_all();
    }

    /// Wait until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal was set (and clears it).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = lock(&self.raised);
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            raised = self
                .cond
                .wait_timeout(raised, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *raised = false;
        true
    }

    /// Whether the signal is currently raised, without consuming it.
    pub fn is_set(&self) -> bool {
        *lock(&self.raised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_signal_times_out_when_not_set() {
        let signal = Signal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_signal_is_consumed_by_wait() {
        let signal = Signal::new();
        signal.set();
        assert!(signal.is_set());
        assert!(signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.is_set());
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_signal_wakes_waiting_thread() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.set();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_cancellation_token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
