//! # Pendulum
//!
//! A single-threaded, cooperative, time-triggered task scheduler.
//!
//! Timers own an ascending queue of trigger instants and a list of
//! callbacks. A [`Loop`] repeatedly sorts its timers by next run time,
//! sleeps until the earliest instant, fires the due timer, then batch-fires
//! anything else that became due while it waited. Long-running work can be
//! split into per-tick steps with a [`Deferred`], whose [`Promise`] settles
//! when the work completes.
//!
//! Time and sleeping are injected through the [`Clock`] and [`Sleeper`]
//! traits, so the whole scheduling logic runs under a virtual clock in
//! tests without any real elapsed time.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pendulum::{Callback, Clock, IndividualTimer, Loop, SystemClock, ThreadSleeper, Timer};
//!
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let run_loop = Loop::new(clock.clone(), Arc::new(ThreadSleeper));
//!
//! let timer = Arc::new(IndividualTimer::after(clock, 1.0));
//! timer.add_callback(Callback::new(|| {
//!     println!("one second elapsed");
//!     Ok(())
//! }));
//!
//! run_loop.add_timer(timer);
//! run_loop.run().unwrap();
//! ```

mod clock;
mod deferred;
mod promise;
mod run_loop;
mod timer;

pub use clock::{Clock, Sleeper, SystemClock, ThreadSleeper, TimeT};
pub use deferred::{Deferred, DeferredId};
pub use promise::{Promise, SettleResult};
pub use run_loop::{GlobalLoop, Loop};
pub use timer::{
    Callback, CallbackId, GlobalTimer, IndividualTimer, PeriodicTimer, TRIGGER_POOL_SIZE, Timer,
    TimerOrder,
};
