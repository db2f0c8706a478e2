//! Flags a worker thread can block on.
//!
//! The streaming session only needs "set", "clear" and "wait for set with
//! a timeout". [`PollingFlag`] does this with an atomic and a short sleep;
//! [`NotifyFlag`] wakes waiters through a condition variable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default sleep between checks of a [`PollingFlag`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub trait WaitableFlag: Send + Sync {
    fn set(&self);

    fn clear(&self);

    fn is_set(&self) -> bool;

    /// Block until the flag is set or `timeout` elapses. Returns whether it is set.
    fn wait(&self, timeout: Duration) -> bool;
}

/// Atomic flag checked in a sleep loop.
#[derive(Debug)]
pub struct PollingFlag {
    flag: AtomicBool,
    interval: Duration,
}

impl PollingFlag {
    pub fn new(interval: Duration) -> Self {
        Self {
            flag: AtomicBool::new(false),
            interval: interval.max(Duration::from_millis(1)),
        }
    }
}

impl Default for PollingFlag {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl WaitableFlag for PollingFlag {
    fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.interval.min(deadline - now));
        }
    }
}

/// Flag guarded by a mutex, waking waiters on `set`.
#[derive(Debug, Default)]
pub struct NotifyFlag {
    flag: Mutex<bool>,
    changed: Condvar,
}

impl NotifyFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitableFlag for NotifyFlag {
    fn set(&self) {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.changed.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn is_set(&self) -> bool {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn wakes_waiter(flag: Arc<dyn WaitableFlag>) {
        assert!(!flag.wait(Duration::from_millis(20)));

        let setter = Arc::clone(&flag);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            setter.set();
        });

        let start = Instant::now();
        assert!(flag.wait(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();

        flag.clear();
        assert!(!flag.is_set());
    }

    #[test]
    fn polling_flag_wakes_waiter() {
        wakes_waiter(Arc::new(PollingFlag::default()));
    }

    #[test]
    fn notify_flag_wakes_waiter() {
        wakes_waiter(Arc::new(NotifyFlag::new()));
    }

    #[test]
    fn set_flag_returns_immediately() {
        let flag = PollingFlag::new(Duration::from_secs(60));
        flag.set();
        let start = Instant::now();
        assert!(flag.wait(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
