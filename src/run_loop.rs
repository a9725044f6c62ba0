use crate::clock::{Clock, Sleeper, SystemClock, ThreadSleeper, TimeT};
use crate::deferred::{Deferred, DeferredId};
use crate::timer::{Callback, CallbackId, GlobalTimer, Timer, TimerOrder};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, trace};

struct DeferredBinding {
    timer: Arc<dyn Timer>,
    callback_ids: Vec<CallbackId>,
}

/// The central wait/trigger cycle over a collection of timers.
///
/// Each scheduling pass sorts the scheduled timers by next run time,
/// sleeps until the earliest instant, ticks that timer, then batch-fires
/// any other timer that became due while sleeping or while callbacks ran.
/// Everything happens on the calling thread; a slow callback delays every
/// other timer by its full duration, and the batch step compensates after
/// the fact.
///
/// The loop holds shared references to its timers, not ownership: callers
/// keep their own handles and may mutate timers between or during passes.
pub struct Loop {
    // Handed to deferred completion hooks, which outlive any one borrow
    // of the loop.
    me: Weak<Loop>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    timers: Mutex<Vec<Arc<dyn Timer>>>,
    trigger_count: AtomicU64,
    forever: AtomicBool,
    halt_callbacks: Mutex<Vec<Callback>>,
    active_deferred: Mutex<HashSet<DeferredId>>,
    bindings: Mutex<HashMap<DeferredId, DeferredBinding>>,
    halt_when_drained: AtomicBool,
}

impl Loop {
    pub fn new(clock: Arc<dyn Clock>, sleeper: Arc<dyn Sleeper>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            clock,
            sleeper,
            timers: Mutex::new(Vec::new()),
            trigger_count: AtomicU64::new(0),
            forever: AtomicBool::new(false),
            halt_callbacks: Mutex::new(Vec::new()),
            active_deferred: Mutex::new(HashSet::new()),
            bindings: Mutex::new(HashMap::new()),
            halt_when_drained: AtomicBool::new(false),
        })
    }

    /// A loop over the real wall clock and thread sleeping.
    pub fn system() -> Arc<Self> {
        Self::new(Arc::new(SystemClock), Arc::new(ThreadSleeper))
    }

    pub fn add_timer(&self, timer: Arc<dyn Timer>) {
        self.timers.lock().push(timer);
    }

    /// Total trigger instants fired across every run of this loop.
    pub fn get_trigger_count(&self) -> u64 {
        self.trigger_count.load(Ordering::Relaxed)
    }

    /// Runs scheduling passes until one fires nothing or [`Loop::halt`]
    /// clears the run flag. A loop with only [`crate::IndividualTimer`]s
    /// terminates naturally once their queues drain; a loop holding a
    /// [`crate::PeriodicTimer`] runs until halted.
    pub fn run(&self) -> Result<()> {
        self.run_inner(true)
    }

    /// A single scheduling pass.
    pub fn run_once(&self) -> Result<()> {
        self.run_inner(false)
    }

    fn run_inner(&self, forever: bool) -> Result<()> {
        self.forever.store(forever, Ordering::Relaxed);
        debug!(forever, "loop started");

        loop {
            let fired = self.trigger_next_timers()?;
            self.trigger_count.fetch_add(fired as u64, Ordering::Relaxed);
            if fired == 0 || !self.forever.load(Ordering::Relaxed) {
                break;
            }
        }

        debug!(
            trigger_count = self.get_trigger_count(),
            "loop finished"
        );
        Ok(())
    }

    /// One scheduling pass: sleep until the earliest scheduled instant,
    /// tick that timer, then fire every other timer that became due in the
    /// meantime. Returns the number of trigger instants fired; zero means
    /// nothing was scheduled.
    pub fn trigger_next_timers(&self) -> Result<usize> {
        let timers = self.timers.lock().clone();
        let mut order = TimerOrder::new(&timers);
        let (Some(epoch), Some(timer)) = (order.current_epoch(), order.current_timer()) else {
            return Ok(0);
        };

        self.wait_until(epoch);
        let mut fired = timer.tick()?;

        // Sleeping and ticking consumed real time, so later timers may
        // have become due for free. Time is re-measured after every fire:
        // a slow callback can legitimately make further timers newly due
        // within this same pass.
        order.advance();
        let remaining = order.subset();
        for timer in remaining.timers() {
            if let Some(next) = timer.get_next_run_time() {
                if next <= self.clock.now() {
                    fired += timer.tick()?;
                }
            }
        }

        trace!(fired, "scheduling pass complete");
        Ok(fired)
    }

    /// Sleeps until `epoch` via the injected sleeper. A past or present
    /// instant is already due; no sleep happens.
    pub fn wait_until(&self, epoch: TimeT) {
        let diff = epoch - self.clock.now();
        if diff > 0.0 {
            trace!(seconds = diff, "sleeping until next trigger");
            self.sleeper.sleep(diff);
        }
    }

    /// Stops the run loop after the current scheduling pass completes and
    /// invokes every registered halt callback in registration order.
    ///
    /// The run flag is idempotent, but the callbacks run on every call;
    /// callers needing exactly-once semantics must call `halt` once.
    pub fn halt(&self) -> Result<()> {
        debug!("halt requested");
        self.forever.store(false, Ordering::Relaxed);

        let callbacks = self.halt_callbacks.lock().clone();
        for callback in callbacks {
            callback.invoke()?;
        }
        Ok(())
    }

    pub fn add_halt_callback(&self, f: impl FnMut() -> Result<()> + Send + 'static) {
        self.halt_callbacks.lock().push(Callback::new(f));
    }

    /// When set, the loop halts as soon as its last active deferred
    /// settles.
    pub fn halt_when_all_deferred_complete(&self, halt: bool) {
        self.halt_when_drained.store(halt, Ordering::Relaxed);
    }

    /// Binds `deferred` to a timer: every process callback of the deferred
    /// is appended to the timer's callback list, advancing the work once
    /// per tick, interleaved with whatever else shares the timer. When the
    /// deferred settles it unbinds itself automatically.
    ///
    /// With no explicit `timer`, the loop's first registered timer drives
    /// the work; it is an error to bind against a loop with no timers.
    pub fn add_deferred_to_timer<T: Send + Sync + 'static>(
        &self,
        deferred: &Arc<Deferred<T>>,
        timer: Option<Arc<dyn Timer>>,
    ) -> Result<()> {
        let timer = match timer {
            Some(timer) => timer,
            None => self
                .timers
                .lock()
                .first()
                .cloned()
                .context("no timer available to drive the deferred")?,
        };

        let callback_ids = deferred
            .process_callbacks()
            .into_iter()
            .map(|callback| timer.add_callback(callback))
            .collect();
        self.bindings.lock().insert(
            deferred.id(),
            DeferredBinding {
                timer,
                callback_ids,
            },
        );
        self.active_deferred.lock().insert(deferred.id());
        trace!(deferred = %deferred.id().uuid(), "deferred bound to timer");

        // Registered after the binding exists, so a deferred that has
        // already settled unbinds immediately instead of lingering.
        let weak = self.me.clone();
        let id = deferred.id();
        deferred.on_complete(move || {
            if let Some(this) = weak.upgrade() {
                this.remove_deferred(id);
            }
        });
        Ok(())
    }

    /// Unbinds a deferred's process callbacks from the timer they were
    /// added to. Normally invoked through the completion hook; calling it
    /// for an unbound deferred is a no-op.
    pub fn remove_deferred_from_timer<T>(&self, deferred: &Deferred<T>) {
        self.remove_deferred(deferred.id());
    }

    fn remove_deferred(&self, id: DeferredId) {
        if let Some(binding) = self.bindings.lock().remove(&id) {
            for callback_id in &binding.callback_ids {
                binding.timer.remove_callback(callback_id);
            }
        }

        let drained = {
            let mut active = self.active_deferred.lock();
            active.remove(&id) && active.is_empty()
        };
        if drained && self.halt_when_drained.load(Ordering::Relaxed) {
            trace!("all deferred work complete");
            if let Err(err) = self.halt() {
                error!(%err, "halt callback failed after deferred drain");
            }
        }
    }
}

/// A process-wide loop sharing the [`GlobalTimer`] heartbeat. Lazily
/// constructed; lives for the lifetime of the program.
pub struct GlobalLoop;

impl GlobalLoop {
    pub fn get() -> Arc<Loop> {
        static INSTANCE: OnceLock<Arc<Loop>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                let run_loop = Loop::system();
                run_loop.add_timer(GlobalTimer::get());
                run_loop
            })
            .clone()
    }
}
