mod individual;
mod order;
mod periodic;

pub use individual::IndividualTimer;
pub use order::TimerOrder;
pub use periodic::{GlobalTimer, PeriodicTimer, TRIGGER_POOL_SIZE};

use crate::clock::{Clock, TimeT};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// A Universally Unique Identifier (UUID) for callbacks registered on a
/// timer, used for remove-by-identity.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct CallbackId(pub Uuid);

impl CallbackId {
    pub fn new() -> Self {
        CallbackId(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallbackId {
    fn default() -> Self {
        Self::new()
    }
}

type CallbackFn = Box<dyn FnMut() -> Result<()> + Send>;

/// A zero-argument side-effecting callback behind a shared handle.
///
/// Cloning a `Callback` clones the handle, not the closure, so the same
/// unit of work can be held by a [`crate::Deferred`] and sit on a timer's
/// callback list at the same time.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<Mutex<CallbackFn>>,
}

impl Callback {
    pub fn new(f: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(f))),
        }
    }

    pub(crate) fn invoke(&self) -> Result<()> {
        let mut f = self.inner.lock();
        (*f)()
    }
}

/// Represents one or more trigger instants. When [`Timer::tick`] is called
/// on a due timer, every registered callback executes once per overdue
/// instant.
///
/// `tick` could be called in a busy loop, but for better use of CPU cycles
/// the owning [`crate::Loop`] sleeps until the timer's next run time.
pub trait Timer: Send + Sync {
    /// Whether at least one future trigger instant is queued.
    ///
    /// Always equal to `get_next_run_time().is_some()`.
    fn is_scheduled(&self) -> bool;

    /// The earliest queued trigger instant, if any.
    fn get_next_run_time(&self) -> Option<TimeT>;

    /// Fires every overdue trigger instant and returns how many fired
    /// (zero when the timer was not due).
    ///
    /// The current time is read once at entry; each overdue instant is
    /// popped from the queue and then replays the full callback list in
    /// registration order. The first callback error aborts the tick and is
    /// returned to the caller; the instant it belonged to stays popped.
    fn tick(&self) -> Result<usize>;

    /// Appends a callback. Insertion order is invocation order.
    fn add_callback(&self, callback: Callback) -> CallbackId;

    /// Removes a callback by identity, preserving the order of the rest.
    /// Removing an id that was never added is a no-op returning `false`.
    fn remove_callback(&self, id: &CallbackId) -> bool;
}

/// Trigger queue and callback list shared by every timer variant.
///
/// The queue is kept sorted ascending. No lock is held while a callback
/// runs, so callbacks may re-enter the timer they are registered on.
pub(crate) struct TimerCore {
    clock: Arc<dyn Clock>,
    state: Mutex<CoreState>,
}

pub(crate) struct CoreState {
    pub queue: Vec<TimeT>,
    pub callbacks: Vec<(CallbackId, Callback)>,
}

impl TimerCore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(CoreState {
                queue: Vec::new(),
                callbacks: Vec::new(),
            }),
        }
    }

    pub fn now(&self) -> TimeT {
        self.clock.now()
    }

    pub fn is_scheduled(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    pub fn next_run_time(&self) -> Option<TimeT> {
        self.state.lock().queue.first().copied()
    }

    pub fn push_trigger(&self, instant: TimeT) {
        let mut state = self.state.lock();
        state.queue.push(instant);
        state.queue.sort_by(|a, b| a.total_cmp(b));
    }

    pub fn add_callback(&self, callback: Callback) -> CallbackId {
        let id = CallbackId::new();
        self.state.lock().callbacks.push((id.clone(), callback));
        id
    }

    pub fn remove_callback(&self, id: &CallbackId) -> bool {
        let mut state = self.state.lock();
        let before = state.callbacks.len();
        state.callbacks.retain(|(existing, _)| existing != id);
        state.callbacks.len() != before
    }

    pub fn tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut fired = 0;

        loop {
            // Pop the head and snapshot the callback list under the lock,
            // then invoke without it. The snapshot is retaken per instant
            // so a callback removing itself stops replaying immediately.
            let callbacks = {
                let mut state = self.state.lock();
                match state.queue.first() {
                    Some(&head) if head <= now => {
                        state.queue.remove(0);
                        state
                            .callbacks
                            .iter()
                            .map(|(_, callback)| callback.clone())
                            .collect::<Vec<_>>()
                    }
                    _ => break,
                }
            };

            fired += 1;
            for callback in callbacks {
                callback.invoke()?;
            }
        }

        Ok(fired)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> R {
        f(&mut self.state.lock())
    }
}
