use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// The `ShutdownSignal` is shared between the interrupt handler and the control thread.
/// Waiting on it replaces plain sleeps so that an interrupt wakes the control thread immediately.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as triggered and wakes every waiting thread.
    pub fn trigger(&self) {
        let (lock, condvar) = &*self.state;
        let mut triggered = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *triggered = true;
        condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.state;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until the signal is triggered.
    pub fn wait(&self) {
        let (lock, condvar) = &*self.state;
        let mut triggered = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*triggered {
            triggered = condvar.wait(triggered).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Blocks for at most `timeout`. Returns true if the signal was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, condvar) = &*self.state;
        let mut triggered = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = condvar
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            triggered = guard;
        }
        *triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_timeout_expires_when_not_triggered() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.is_triggered());
    }

    #[test]
    fn trigger_wakes_waiting_thread() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));

        signal.trigger();

        assert!(handle.join().unwrap());
        assert!(signal.is_triggered());
    }
}
