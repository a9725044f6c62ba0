use super::{Callback, CallbackId, Timer, TimerCore};
use crate::clock::{Clock, TimeT};
use anyhow::Result;
use std::sync::Arc;

/// A timer whose trigger instants are populated explicitly by the caller.
///
/// The queue never replenishes itself: once every instant has fired the
/// timer reports unscheduled and the owning loop moves on without it.
pub struct IndividualTimer {
    core: TimerCore,
}

impl IndividualTimer {
    /// An empty timer; schedule it with [`IndividualTimer::add_trigger_time`].
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            core: TimerCore::new(clock),
        }
    }

    /// A timer due `delay` seconds from now, per the injected clock. A
    /// negative delay produces an already-due instant.
    pub fn after(clock: Arc<dyn Clock>, delay: TimeT) -> Self {
        let timer = Self::new(clock);
        let due = timer.core.now() + delay;
        timer.add_trigger_time(due);
        timer
    }

    /// Queues an absolute trigger instant, keeping the queue sorted.
    pub fn add_trigger_time(&self, instant: TimeT) {
        self.core.push_trigger(instant);
    }
}

impl Timer for IndividualTimer {
    fn is_scheduled(&self) -> bool {
        self.core.is_scheduled()
    }

    fn get_next_run_time(&self) -> Option<TimeT> {
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
