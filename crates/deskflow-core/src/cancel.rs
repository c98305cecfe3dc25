use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{CoreError, Result};

/// Cooperative cancellation shared between a flow's worker thread and
/// whoever may want to stop it. Cloning yields another handle to the same
/// token.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    flag: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.condvar.notify_all();
    }

    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::Release);
    }

    /// Returns `Err(Stopped)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CoreError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Sleeps up to `ms` milliseconds. Returns `false` if woken by
    /// cancellation.
    pub fn sleep(&self, ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(ms);
        let mut guard = self.inner.lock.lock();

        while !self.is_cancelled() {
            if self
                .inner
                .condvar
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }

        !self.is_cancelled()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_runs_full_duration() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(token.sleep(60));
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(10_000));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_check_and_reset() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert_eq!(token.check(), Err(CoreError::Stopped));
        assert!(!token.sleep(100));
        token.reset();
        assert!(token.check().is_ok());
    }
}
