use crate::promise::Promise;
use crate::timer::Callback;
use anyhow::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// A Universally Unique Identifier (UUID) for deferred work.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct DeferredId(pub Uuid);

impl DeferredId {
    pub fn new() -> Self {
        DeferredId(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DeferredId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of incremental work driven by timer ticks.
///
/// Process callbacks registered here are bound onto a timer by
/// [`crate::Loop::add_deferred_to_timer`]; each tick of that timer calls
/// them once, and each call should make a small bounded amount of progress
/// before eventually resolving or rejecting. The owned [`Promise`] is how
/// the caller observes the eventual outcome.
pub struct Deferred<T> {
    id: DeferredId,
    promise: Arc<Promise<T>>,
    process: Mutex<Vec<Callback>>,
    active: AtomicBool,
}

impl<T> Deferred<T> {
    pub fn id(&self) -> DeferredId {
        self.id
    }

    /// True until resolved or rejected, then permanently false.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    pub fn new() -> Self {
        Self {
            id: DeferredId::new(),
            promise: Arc::new(Promise::new()),
            process: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }

    pub fn get_promise(&self) -> Arc<Promise<T>> {
        self.promise.clone()
    }

    pub fn resolve(&self, value: T) {
        self.promise.resolve(value);
        self.active.store(false, Ordering::Relaxed);
    }

    pub fn reject(&self, reason: Error) {
        self.promise.reject(reason);
        self.active.store(false, Ordering::Relaxed);
    }

    /// Appends a process callback, invoked once per tick of the timer this
    /// deferred is bound to.
    pub fn add_process(&self, f: impl FnMut() -> Result<()> + Send + 'static) {
        self.process.lock().push(Callback::new(f));
    }

    /// Shared handles to the process callbacks, for timer binding.
    pub fn process_callbacks(&self) -> Vec<Callback> {
        self.process.lock().clone()
    }

    /// Runs `f` when this deferred settles (resolve or reject), or
    /// immediately if it already has.
    pub fn on_complete(&self, f: impl FnOnce() + Send + 'static) {
        self.promise.on_settled(move |_| f());
    }
}

impl<T: Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_until_resolved() {
        let sut = Deferred::<u32>::new();
        assert!(sut.is_active());
        sut.resolve(1);
        assert!(!sut.is_active());
    }

    #[test]
    fn active_until_rejected() {
        let sut = Deferred::<u32>::new();
        sut.reject(anyhow::anyhow!("abandoned"));
        assert!(!sut.is_active());
    }

    #[test]
    fn resolve_settles_the_promise() {
        let sut = Deferred::<u32>::new();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        sut.get_promise().on_resolved(move |value| *slot.lock() = Some(*value));

        sut.resolve(31);
        assert_eq!(Some(31), *seen.lock());
    }

    #[test]
    fn on_complete_fires_for_both_outcomes() {
        let resolved = Deferred::<u32>::new();
        let rejected = Deferred::<u32>::new();
        let count = Arc::new(Mutex::new(0usize));

        let counter = count.clone();
        resolved.on_complete(move || *counter.lock() += 1);
        let counter = count.clone();
        rejected.on_complete(move || *counter.lock() += 1);

        resolved.resolve(1);
        rejected.reject(anyhow::anyhow!("abandoned"));
        assert_eq!(2, *count.lock());
    }

    #[test]
    fn process_callbacks_share_the_closure() {
        let sut = Deferred::<u32>::new();
        let count = Arc::new(Mutex::new(0usize));
        let counter = count.clone();
        sut.add_process(move || {
            *counter.lock() += 1;
            Ok(())
        });

        for callback in sut.process_callbacks() {
            callback.invoke().unwrap();
        }
        for callback in sut.process_callbacks() {
            callback.invoke().unwrap();
        }
        assert_eq!(2, *count.lock());
    }
}
