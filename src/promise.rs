use anyhow::Error;
use parking_lot::Mutex;
use std::sync::Arc;

/// The settled outcome of a [`Promise`].
pub type SettleResult<T> = Result<T, Error>;

type Observer<T> = Box<dyn FnOnce(&Arc<SettleResult<T>>) + Send>;

/// A single-assignment settlement cell with ordered observers.
///
/// The first call to [`Promise::resolve`] or [`Promise::reject`] settles
/// the cell permanently; later settlements are ignored. Observers run
/// exactly once, in registration order, at settlement time. An observer
/// registered after settlement runs immediately and synchronously.
pub struct Promise<T> {
    state: Mutex<PromiseState<T>>,
}

enum PromiseState<T> {
    Pending { observers: Vec<Observer<T>> },
    Settled(Arc<SettleResult<T>>),
}

impl<T: Send + Sync + 'static> Promise<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PromiseState::Pending {
                observers: Vec::new(),
            }),
        }
    }

    pub fn resolve(&self, value: T) {
        self.settle(Arc::new(Ok(value)));
    }

    pub fn reject(&self, reason: Error) {
        self.settle(Arc::new(Err(reason)));
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.lock(), PromiseState::Settled(_))
    }

    /// The settled outcome, or `None` while pending.
    pub fn result(&self) -> Option<Arc<SettleResult<T>>> {
        match &*self.state.lock() {
            PromiseState::Settled(result) => Some(result.clone()),
            PromiseState::Pending { .. } => None,
        }
    }

    pub fn on_settled(&self, f: impl FnOnce(&SettleResult<T>) + Send + 'static) {
        self.subscribe(Box::new(move |result| f(result)));
    }

    pub fn on_resolved(&self, f: impl FnOnce(&T) + Send + 'static) {
        self.on_settled(move |result| {
            if let Ok(value) = result {
                f(value);
            }
        });
    }

    pub fn on_rejected(&self, f: impl FnOnce(&Error) + Send + 'static) {
        self.on_settled(move |result| {
            if let Err(reason) = result {
                f(reason);
            }
        });
    }

    /// Settle this promise with whatever `other` settles with, once it
    /// does. Settlement of this promise is deferred until `other` settles;
    /// if `other` has already settled, this promise settles immediately.
    pub fn follow(self: &Arc<Self>, other: &Arc<Promise<T>>) -> anyhow::Result<()> {
        if Arc::ptr_eq(self, other) {
            anyhow::bail!("a promise cannot settle itself");
        }

        let this = Arc::downgrade(self);
        other.subscribe(Box::new(move |result| {
            if let Some(promise) = this.upgrade() {
                promise.settle(result.clone());
            }
        }));
        Ok(())
    }

    fn subscribe(&self, observer: Observer<T>) {
        let settled = {
            let mut state = self.state.lock();
            match &mut *state {
                PromiseState::Pending { observers } => {
                    observers.push(observer);
                    None
                }
                PromiseState::Settled(result) => Some((observer, result.clone())),
            }
        };

        // Late registration: run outside the lock, like any other observer.
        if let Some((observer, result)) = settled {
            observer(&result);
        }
    }

    fn settle(&self, result: Arc<SettleResult<T>>) {
        let previous = {
            let mut state = self.state.lock();
            if matches!(&*state, PromiseState::Settled(_)) {
                return;
            }
            std::mem::replace(&mut *state, PromiseState::Settled(result.clone()))
        };

        if let PromiseState::Pending { observers } = previous {
            for observer in observers {
                observer(&result);
            }
        }
    }
}

impl<T: Send + Sync + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observers_run_in_registration_order() {
        let promise = Promise::<u32>::new();
        let log: Arc<Mutex<Vec<&str>>> = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = log.clone();
            promise.on_settled(move |_| log.lock().push(name));
        }

        assert!(log.lock().is_empty());
        promise.resolve(1);
        assert_eq!(vec!["first", "second", "third"], *log.lock());
    }

    #[test]
    fn late_observer_runs_immediately() {
        let promise = Promise::<u32>::new();
        promise.resolve(7);

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        promise.on_resolved(move |value| *slot.lock() = Some(*value));
        assert_eq!(Some(7), *seen.lock());
    }

    #[test]
    fn first_settlement_wins() {
        let promise = Promise::<u32>::new();
        promise.resolve(1);
        promise.resolve(2);
        promise.reject(anyhow::anyhow!("too late"));

        let result = promise.result().unwrap();
        assert!(matches!(*result, Ok(1)));
    }

    #[test]
    fn rejection_reaches_on_rejected() {
        let promise = Promise::<u32>::new();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        promise.on_rejected(move |reason| *slot.lock() = Some(reason.to_string()));

        promise.reject(anyhow::anyhow!("workload failed"));
        assert_eq!(Some("workload failed".to_string()), *seen.lock());
    }

    #[test]
    fn follow_defers_until_inner_settles() {
        let inner = Arc::new(Promise::<u32>::new());
        let outer = Arc::new(Promise::<u32>::new());

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        outer.on_resolved(move |value| *slot.lock() = Some(*value));

        outer.follow(&inner).unwrap();
        assert!(!outer.is_settled());

        inner.resolve(42);
        assert!(outer.is_settled());
        assert_eq!(Some(42), *seen.lock());
    }

    #[test]
    fn follow_settled_promise_settles_immediately() {
        let inner = Arc::new(Promise::<u32>::new());
        inner.resolve(9);

        let outer = Arc::new(Promise::<u32>::new());
        outer.follow(&inner).unwrap();
        assert!(outer.is_settled());
    }

    #[test]
    fn promise_cannot_settle_itself() {
        let promise = Arc::new(Promise::<u32>::new());
        assert!(promise.follow(&promise.clone()).is_err());
    }
}
