use super::Timer;
use crate::clock::TimeT;
use std::sync::Arc;

/// A snapshot of scheduled timers sorted by next run time.
///
/// Rebuilt from the live timer collection at the start of every scheduling
/// pass and thrown away at the end; it has no lifecycle of its own. Timers
/// due at the same instant keep their registration order (the sort is
/// stable).
pub struct TimerOrder {
    entries: Vec<OrderEntry>,
    cursor: usize,
}

struct OrderEntry {
    epoch: TimeT,
    timer: Arc<dyn Timer>,
}

impl TimerOrder {
    pub fn new(timers: &[Arc<dyn Timer>]) -> Self {
        let mut entries: Vec<OrderEntry> = timers
            .iter()
            .filter_map(|timer| {
                timer.get_next_run_time().map(|epoch| OrderEntry {
                    epoch,
                    timer: timer.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.epoch.total_cmp(&b.epoch));

        Self { entries, cursor: 0 }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The next run time of the timer at the cursor, as captured when this
    /// order was built.
    pub fn current_epoch(&self) -> Option<TimeT> {
        self.entries.get(self.cursor).map(|entry| entry.epoch)
    }

    pub fn current_timer(&self) -> Option<Arc<dyn Timer>> {
        self.entries.get(self.cursor).map(|entry| entry.timer.clone())
    }

    pub fn advance(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
    }

    /// A fresh order over the timers from the cursor onwards.
    ///
    /// Run times are re-queried and re-sorted, so the subset reflects how
    /// the world looks now rather than when this order was built.
    pub fn subset(&self) -> TimerOrder {
        let remaining: Vec<Arc<dyn Timer>> = self.entries[self.cursor..]
            .iter()
            .map(|entry| entry.timer.clone())
            .collect();
        TimerOrder::new(&remaining)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Arc<dyn Timer>> {
        self.entries[self.cursor..].iter().map(|entry| &entry.timer)
    }
}
