use super::{Callback, CallbackId, Timer, TimerCore};
use crate::clock::{Clock, SystemClock, TimeT};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// How many future trigger instants a periodic timer keeps queued.
pub const TRIGGER_POOL_SIZE: usize = 1_000;

/// A timer that fires every `period` seconds, forever.
///
/// The trigger queue is lazily topped up to [`TRIGGER_POOL_SIZE`] instants,
/// each one `period` after the last, on every scheduling query. Computing a
/// ladder of instants ahead of time keeps the next run time stable between
/// queries (recomputing against a moving `now` would drift) while bounding
/// memory.
pub struct PeriodicTimer {
    core: TimerCore,
    period: TimeT,
    immediate: Mutex<bool>,
}

impl PeriodicTimer {
    /// A timer firing every `period` seconds. When `immediate` is set, one
    /// extra trigger is seeded at the current instant before the periodic
    /// ladder, so the first tick happens without waiting a full period.
    pub fn new(clock: Arc<dyn Clock>, period: TimeT, immediate: bool) -> Self {
        Self {
            core: TimerCore::new(clock),
            period,
            immediate: Mutex::new(immediate),
        }
    }

    pub fn period(&self) -> TimeT {
        self.period
    }

    fn schedule_trigger_pool(&self) {
        let now = self.core.now();
        let mut immediate = self.immediate.lock();
        self.core.with_state(|state| {
            if state.queue.is_empty() && *immediate {
                state.queue.push(now);
                *immediate = false;
            }

            // The ladder extends from the queue tail, not from `now`, so a
            // partially drained queue never collects duplicate instants
            // and stays sorted ascending by construction.
            let base = state.queue.last().copied().unwrap_or(now);
            let missing = TRIGGER_POOL_SIZE.saturating_sub(state.queue.len());
            for k in 1..=missing {
                state.queue.push(base + k as TimeT * self.period);
            }
        });
    }
}

impl Timer for PeriodicTimer {
    fn is_scheduled(&self) -> bool {
        self.schedule_trigger_pool();
        self.core.is_scheduled()
    }

    fn get_next_run_time(&self) -> Option<TimeT> {
        self.schedule_trigger_pool();
        self.core.next_run_time()
    }

    fn tick(&self) -> Result<usize> {
        self.core.tick()
    }

    fn add_callback(&self, callback: Callback) -> CallbackId {
        self.core.add_callback(callback)
    }

    fn remove_callback(&self, id: &CallbackId) -> bool {
        self.core.remove_callback(id)
    }
}

/// A process-wide heartbeat timer shared by subsystems that do not want to
/// own a timer of their own. Lazily constructed; lives for the lifetime of
/// the program.
pub struct GlobalTimer;

impl GlobalTimer {
    /// Seconds between heartbeat ticks.
    pub const PERIOD: TimeT = 0.01;

    pub fn get() -> Arc<PeriodicTimer> {
        static INSTANCE: OnceLock<Arc<PeriodicTimer>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                Arc::new(PeriodicTimer::new(
                    Arc::new(SystemClock),
                    Self::PERIOD,
                    false,
                ))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::FakeClock;
    use test_case::test_case;

    fn setup() -> Arc<FakeClock> {
        Arc::new(FakeClock::new(1000.0))
    }

    #[test]
    fn is_scheduled_once_constructed() {
        let sut = PeriodicTimer::new(setup(), 10.0, false);
        assert!(sut.is_scheduled());
        assert_eq!(sut.is_scheduled(), sut.get_next_run_time().is_some());
    }

    #[test_case(1.0; "short_period")]
    #[test_case(100.0; "long_period")]
    fn next_run_time_is_one_period_away(period: TimeT) {
        let sut = PeriodicTimer::new(setup(), period, false);
        assert_eq!(Some(1000.0 + period), sut.get_next_run_time());
    }

    #[test]
    fn next_run_time_immediate() {
        let sut = PeriodicTimer::new(setup(), 1.0, true);
        assert_eq!(Some(1000.0), sut.get_next_run_time());
    }

    #[test]
    fn immediate_trigger_consumed_exactly_once() {
        let clock = setup();
        let sut = PeriodicTimer::new(clock.clone(), 1.0, true);

        assert_eq!(Some(1000.0), sut.get_next_run_time());
        assert_eq!(1, sut.tick().unwrap());

        // The seeded "now" instant is gone; only the ladder remains.
        assert_eq!(Some(1001.0), sut.get_next_run_time());
    }

    #[test]
    fn next_run_time_immediate_multiple_ticks() {
        let clock = setup();
        let sut = PeriodicTimer::new(clock.clone(), 1.0, true);

        for i in 0..100 {
            assert_eq!(Some(1000.0 + i as TimeT), sut.get_next_run_time());
            sut.tick().unwrap();
            clock.advance(1.0);
        }
    }

    #[test]
    fn next_run_time_never_decreases() {
        let clock = setup();
        let sut = PeriodicTimer::new(clock.clone(), 5.0, false);

        let mut previous = sut.get_next_run_time().unwrap();
        for _ in 0..50 {
            clock.advance(3.0);
            sut.tick().unwrap();
            let next = sut.get_next_run_time().unwrap();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn global_timer_uses_the_heartbeat_period() {
        let sut = GlobalTimer::get();
        assert_eq!(GlobalTimer::PERIOD, sut.period());
        assert!(sut.is_scheduled());
    }

    #[test]
    fn queue_replenishes_before_going_empty() {
        let clock = setup();
        let sut = PeriodicTimer::new(clock.clone(), 1.0, false);

        // Jump far past the whole queued ladder; the timer must still
        // report a future run time on the next query.
        clock.advance(2.0 * TRIGGER_POOL_SIZE as TimeT);
        sut.tick().unwrap();
        assert!(sut.get_next_run_time().is_some());
        assert!(sut.is_scheduled());
    }
}
