use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Event the committer signals after every commit pass.
#[derive(Debug, Default)]
pub struct WakeupEvent {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl WakeupEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every waiter.
    pub fn signal(&self) {
        *self.generation.lock() += 1;
        self.condvar.notify_all();
    }

    /// Number of signals so far.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Block until the next signal. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock();
        let start = *generation;
        while *generation == start {
            if self.condvar.wait_until(&mut generation, deadline).timed_out() {
                return *generation != start;
            }
        }
        true
    }

    /// Block until `condition` holds, re-checking it after every signal.
    ///
    /// `condition` must only turn true before a [`signal`](Self::signal) call,
    /// otherwise the wake-up can be missed until the deadline.
    pub fn wait_until(&self, timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock();
        loop {
            if condition() {
                return true;
            }
            if self.condvar.wait_until(&mut generation, deadline).timed_out() {
                return condition();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_wait_times_out() {
        let event = WakeupEvent::new();
        assert!(!event.wait(Duration::from_millis(5)));
        assert!(!event.wait_until(Duration::from_millis(5), || false));
        assert!(event.wait_until(Duration::from_millis(5), || true));
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let event = Arc::new(WakeupEvent::new());
        let flag = Arc::new(AtomicBool::new(false));
        let waiter = {
            let event = event.clone();
            let flag = flag.clone();
            std::thread::spawn(move || {
                event.wait_until(Duration::from_secs(10), || flag.load(Ordering::Acquire))
            })
        };
        flag.store(true, Ordering::Release);
        event.signal();
        assert!(waiter.join().unwrap());
        assert_eq!(event.generation(), 1);
    }
}
