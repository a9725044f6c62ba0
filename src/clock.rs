use chrono::Utc;
use std::thread;
use std::time::Duration;

/// Fractional seconds since the Unix epoch (or an arbitrary epoch when a
/// virtual clock is injected).
pub type TimeT = f64;

/// The single source of time for every scheduling decision.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeT;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeT {
        Utc::now().timestamp_micros() as TimeT / 1_000_000.0
    }
}

/// Blocks the current thread until a duration has elapsed.
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration` seconds. Non-positive durations are a no-op.
    fn sleep(&self, duration: TimeT);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: TimeT) {
        if duration > 0.0 && duration.is_finite() {
            thread::sleep(Duration::from_secs_f64(duration));
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::{Clock, Sleeper, TimeT};
    use parking_lot::Mutex;
    use std::sync::Arc;

    pub struct FakeClock {
        current: Mutex<TimeT>,
    }

    impl FakeClock {
        pub fn new(start: TimeT) -> Self {
            Self {
                current: Mutex::new(start),
            }
        }

        pub fn advance(&self, duration: TimeT) {
            let mut guard = self.current.lock();
            *guard += duration;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> TimeT {
            *self.current.lock()
        }
    }

    /// Advances the linked clock instead of blocking, recording every
    /// requested duration so tests can assert on sleep behaviour.
    pub struct FakeSleeper {
        clock: Arc<FakeClock>,
        log: Mutex<Vec<TimeT>>,
    }

    impl FakeSleeper {
        pub fn new(clock: Arc<FakeClock>) -> Self {
            Self {
                clock,
                log: Mutex::new(Vec::new()),
            }
        }

        pub fn slept(&self) -> Vec<TimeT> {
            self.log.lock().clone()
        }
    }

    impl Sleeper for FakeSleeper {
        fn sleep(&self, duration: TimeT) {
            self.clock.advance(duration);
            self.log.lock().push(duration);
        }
    }
}
