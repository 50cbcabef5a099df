//! Cooperative stop signal shared between the module manager and the threads it owns.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct StopState {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Cloneable cancellation flag. Cloning shares the same underlying signal.
#[derive(Clone, Default)]
pub struct StopToken {
    inner: Arc<StopState>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop and wakes every thread blocked in [`StopToken::wait_timeout`].
    pub fn stop(&self) {
        let mut stopped = match self.inner.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *stopped = true;
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        match self.inner.stopped.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleeps for up to `timeout`, returning early when a stop is requested.
    ///
    /// Returns `true` if the token was stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = match self.inner.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = match self.inner.wake.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *stopped
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_the_signal() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_stopped());
        token.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn wait_times_out_when_not_stopped() {
        let token = StopToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn wait_wakes_on_stop() {
        let token = StopToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.stop();
        assert!(handle.join().unwrap());
    }
}
