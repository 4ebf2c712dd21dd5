//! The read path: classify an entry, invoke its factory at most once,
//! memoize the result and keep the original factory for introspection.
//!
//! Resolution is re-entrant: a factory reads other keys through the
//! container it receives. Before invoking a factory the resolver puts a
//! [`Slot::Resolving`] sentinel in its place, so re-entry on the same
//! thread fails fast and readers on other threads wait for the result.
//! A reader about to wait first follows the chain of blocked builders;
//! if it leads back to the reader, the cycle is reported instead.

use std::any::{Any, type_name};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use pantry_support::rendering::shorten_type_name;
use parking_lot::MutexGuard;
use tracing::{debug, trace};

use crate::container::{Container, unknown_identifier};
use crate::entry::{FactoryFn, Slot, Value};
use crate::error::{ContainerError, Result};
use crate::key::ServiceKey;
use crate::store::EntryStore;

/// What the resolver does next, decided under the store lock.
enum Step {
    /// Invoke a protected factory without caching.
    Invoke(ServiceKey, FactoryFn),
    /// Build and memoize a pending factory.
    Build(ServiceKey, FactoryFn),
    /// Another thread (`owner`) is building this key.
    Wait(ThreadId, ServiceKey),
    /// This thread is already building this key.
    Reentered(ServiceKey),
}

impl Container {
    /// Resolve `key`.
    ///
    /// Literals are returned as-is. A factory is invoked on first read
    /// with this container as its argument; its result is memoized and
    /// the key frozen. Protected factories are invoked on every read.
    ///
    /// # Errors
    /// - [`ContainerError::UnknownIdentifier`] if `key` is absent
    /// - [`ContainerError::RecursionInfiniteLoop`] if the factory reads
    ///   its own key, directly or transitively
    /// - whatever the factory itself returns
    pub fn get(&self, key: &str) -> Result<Value> {
        trace!(key, "Resolving");
        let me = thread::current().id();
        let mut store = self.store.lock();

        loop {
            let step = match store.entry(key) {
                None => return Err(unknown_identifier(&store, key)),
                Some((_, Slot::Ready(value))) => return Ok(value.clone()),
                Some((stored, Slot::Pending(factory) | Slot::Resolving { factory, .. }))
                    if store.is_protected(key) =>
                {
                    Step::Invoke(stored.clone(), factory.clone())
                }
                Some((stored, Slot::Resolving { owner, .. })) if *owner == me => {
                    Step::Reentered(stored.clone())
                }
                Some((stored, Slot::Resolving { owner, .. })) => Step::Wait(*owner, stored.clone()),
                Some((stored, Slot::Pending(factory))) => Step::Build(stored.clone(), factory.clone()),
            };

            match step {
                Step::Wait(owner, stored) => {
                    if let Some(err) = self.blocked_cycle(&store, me, &stored, owner) {
                        return Err(err);
                    }

                    trace!(key, "Waiting for another thread to resolve");
                    let _waiting = self.guard.wait_on(&stored);
                    self.settled.wait(&mut store);
                }
                Step::Reentered(stored) => return Err(self.guard.cycle(&stored)),
                Step::Invoke(stored, factory) => {
                    drop(store);
                    return self.invoke_protected(&stored, &factory);
                }
                Step::Build(stored, factory) => return self.build(store, stored, factory),
            }
        }
    }

    /// Resolve `key` and downcast the result to `T`.
    ///
    /// # Errors
    /// Everything [`get`](Container::get) returns, plus
    /// [`ContainerError::TypeMismatch`] if the value is not a `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        downcast(key, self.get(key)?)
    }

    /// Follows `owner` through the keys blocked builders wait on.
    /// Returns the cycle error if the chain reaches `me`.
    fn blocked_cycle(
        &self,
        store: &EntryStore,
        me: ThreadId,
        requested: &ServiceKey,
        mut owner: ThreadId,
    ) -> Option<ContainerError> {
        let mut links = vec![requested.clone()];

        // a chain longer than the store loops among other threads
        while links.len() <= store.len() {
            let waited = self.guard.waiting_on(owner)?;
            let Some(Slot::Resolving { owner: next, .. }) = store.slot(&waited) else {
                return None;
            };
            let next = *next;
            links.push(waited);

            if next == me {
                return Some(self.guard.cross_thread_cycle(links));
            }
            owner = next;
        }

        None
    }

    fn invoke_protected(&self, key: &ServiceKey, factory: &FactoryFn) -> Result<Value> {
        let _ticket = self.guard.enter(key)?;
        trace!(key = %key, "Invoking protected factory");
        factory(self)
    }

    fn build(
        &self,
        mut store: MutexGuard<'_, EntryStore>,
        key: ServiceKey,
        factory: FactoryFn,
    ) -> Result<Value> {
        let _ticket = self.guard.enter(&key)?;

        store.replace_slot(
            &key,
            Slot::Resolving {
                owner: thread::current().id(),
                factory: factory.clone(),
            },
        );
        let mut pending = PendingBuild {
            container: self,
            key,
            factory: factory.clone(),
            armed: true,
        };
        drop(store);

        debug!(key = %pending.key, "Invoking factory");
        let outcome = factory(self);
        pending.settle(outcome.as_ref().ok().cloned());
        outcome
    }
}

/// Downcasts a resolved value, reporting the expected type on failure.
pub(crate) fn downcast<T: Any + Send + Sync>(key: &str, value: Value) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
        key: ServiceKey::from(key),
        expected: shorten_type_name(type_name::<T>()),
    })
}

/// Replaces the sentinel once the factory returns.
///
/// Dropped while still armed (the factory panicked), it restores the
/// pending factory so the key can be resolved again.
struct PendingBuild<'a> {
    container: &'a Container,
    key: ServiceKey,
    factory: FactoryFn,
    armed: bool,
}

impl PendingBuild<'_> {
    fn settle(&mut self, value: Option<Value>) {
        self.armed = false;
        let me = thread::current().id();
        let mut store = self.container.store.lock();

        // A write, delete or extend during resolution replaced our sentinel.
        let ours = matches!(
            store.slot(&self.key),
            Some(Slot::Resolving { owner, factory })
                if *owner == me && Arc::ptr_eq(factory, &self.factory)
        );

        if ours {
            match value {
                Some(value) if !store.is_protected(&self.key) => {
                    store.memoize(&self.key, value, self.factory.clone());
                    debug!(key = %self.key, "Memoized service");
                }
                _ => store.replace_slot(&self.key, Slot::Pending(self.factory.clone())),
            }
        }

        drop(store);
        self.container.settled.notify_all();
    }
}

impl Drop for PendingBuild<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.settle(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[test]
    fn factory_invoked_once_and_memoized() {
        let calls = counter();
        let container = Container::new();
        container
            .set_factory("db", {
                let calls = calls.clone();
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(String::from("postgres://localhost"))
                }
            })
            .unwrap();

        let a = container.get("db").unwrap();
        let b = container.get("db").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(container.is_frozen("db"));
    }

    #[test]
    fn literal_passthrough() {
        let container = Container::new();
        container.set_value("list", vec!["apple", "banana", "cherry"]).unwrap();
        container.set_value("flag", true).unwrap();

        let list = container.get_as::<Vec<&str>>("list").unwrap();
        assert_eq!(*list, vec!["apple", "banana", "cherry"]);
        assert!(*container.get_as::<bool>("flag").unwrap());

        assert!(!container.is_frozen("list"));
        assert!(!container.is_frozen("flag"));
    }

    #[test]
    fn stored_callable_is_not_invoked() {
        let calls = counter();
        let constructor: Arc<dyn Fn(&str) -> String + Send + Sync> = {
            let calls = calls.clone();
            Arc::new(move |name: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                format!("storage({name})")
            })
        };

        let container = Container::new();
        container.set_value("storage_cls", constructor).unwrap();
        container
            .set_factory("storage", |c| {
                let cls = c.get_as::<Arc<dyn Fn(&str) -> String + Send + Sync>>("storage_cls")?;
                let construct: &(dyn Fn(&str) -> String + Send + Sync) = &**cls;
                Ok(construct("SESSION_ID"))
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*container.get_as::<String>("storage").unwrap(), "storage(SESSION_ID)");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!container.is_frozen("storage_cls"));
    }

    #[test]
    fn cycle_detection() {
        let container = Container::new();
        container.set_factory("a", |c| c.get("b")).unwrap();
        container.set_factory("b", |c| c.get("a")).unwrap();

        match container.get("a") {
            Err(ContainerError::RecursionInfiniteLoop(err)) => {
                let chain: Vec<&str> = err.chain.iter().map(|k| k.as_str()).collect();
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("Expected RecursionInfiniteLoop, got: {other:?}"),
        }

        // failed resolution leaves both keys resolvable and unfrozen
        assert!(!container.is_frozen("a"));
        assert!(!container.is_frozen("b"));
        assert!(matches!(container.raw("a").unwrap(), Raw::Factory(_)));
    }

    #[test]
    fn self_reference_detected() {
        let container = Container::new();
        container.set_factory("me", |c| c.get("me")).unwrap();

        assert!(matches!(
            container.get("me"),
            Err(ContainerError::RecursionInfiniteLoop(_))
        ));
    }

    #[test]
    fn protected_self_reference_detected() {
        let container = Container::new();
        container.set_protected("p", |c| c.get("p")).unwrap();

        assert!(matches!(
            container.get("p"),
            Err(ContainerError::RecursionInfiniteLoop(_))
        ));
    }

    #[test]
    fn protection_bypasses_caching() {
        let calls = counter();
        let container = Container::new();
        container
            .set_factory("f", {
                let calls = calls.clone();
                move |_| Ok(calls.fetch_add(1, Ordering::SeqCst))
            })
            .unwrap();
        container.protect("f").unwrap();

        let first = container.get_as::<u32>("f").unwrap();
        let second = container.get_as::<u32>("f").unwrap();
        assert_ne!(first, second);
        assert!(!container.is_frozen("f"));
        assert!(matches!(container.raw("f").unwrap(), Raw::Factory(_)));
    }

    #[test]
    fn unprotected_returns_same_value() {
        let calls = counter();
        let container = Container::new();
        container
            .set_factory("f", {
                let calls = calls.clone();
                move |_| Ok(calls.fetch_add(1, Ordering::SeqCst))
            })
            .unwrap();

        assert_eq!(container.get_as::<u32>("f").unwrap(), container.get_as::<u32>("f").unwrap());
    }

    #[test]
    fn raw_survives_memoization() {
        let container = Container::new();
        container.set_factory("func", |_| Ok(String::from("test"))).unwrap();

        let cold = container.raw("func").unwrap();
        container.get("func").unwrap();
        let warm = container.raw("func").unwrap();

        let (Raw::Factory(cold), Raw::Factory(warm)) = (cold, warm) else {
            panic!("Expected factories from raw()");
        };
        assert!(Arc::ptr_eq(&cold, &warm));
    }

    #[test]
    fn failed_factory_stays_unresolved() {
        let calls = counter();
        let container = Container::new();
        container
            .set_factory("flaky", {
                let calls = calls.clone();
                move |_| {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ContainerError::construction("flaky", "first attempt"))
                    } else {
                        Ok(7u8)
                    }
                }
            })
            .unwrap();

        assert!(matches!(
            container.get("flaky"),
            Err(ContainerError::ConstructionFailed { .. })
        ));
        assert!(!container.is_frozen("flaky"));
        assert_eq!(*container.get_as::<u8>("flaky").unwrap(), 7);
        assert!(container.is_frozen("flaky"));
    }

    #[test]
    fn panicking_factory_restores_entry() {
        let container = Container::new();
        container
            .set_factory("boom", |_| -> Result<u8> { panic!("factory exploded") })
            .unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| container.get("boom")));
        assert!(outcome.is_err());

        assert!(!container.is_frozen("boom"));
        assert!(matches!(container.raw("boom").unwrap(), Raw::Factory(_)));
        container.set_value("boom", 1u8).unwrap();
    }

    #[test]
    fn type_mismatch() {
        let container = Container::new();
        container.set_value("port", 8080u16).unwrap();

        match container.get_as::<String>("port") {
            Err(ContainerError::TypeMismatch { key, expected }) => {
                assert_eq!(key, "port");
                assert_eq!(expected, "String");
            }
            other => panic!("Expected TypeMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn concurrent_first_reads_build_once() {
        let calls = counter();
        let container = Container::new();
        container
            .set_factory("slow", {
                let calls = calls.clone();
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(String::from("built"))
                }
            })
            .unwrap();

        let values: Vec<Value> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| container.get("slow").unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn cycle_across_threads_fails_instead_of_blocking() {
        let barrier = Arc::new(Barrier::new(2));
        let container = Container::new();

        for (key, next) in [("a", "b"), ("b", "a")] {
            let barrier = barrier.clone();
            let first = AtomicBool::new(true);
            container
                .set_factory(key, move |c| {
                    // both sentinels are in place before either reads the other
                    if first.swap(false, Ordering::SeqCst) {
                        barrier.wait();
                    }
                    c.get(next)
                })
                .unwrap();
        }

        let (a, b) = std::thread::scope(|s| {
            let a = s.spawn(|| container.get("a"));
            let b = s.spawn(|| container.get("b"));
            (a.join().unwrap(), b.join().unwrap())
        });

        for outcome in [a, b] {
            match outcome {
                Err(ContainerError::RecursionInfiniteLoop(err)) => {
                    assert!(err.chain.len() >= 3);
                    assert_eq!(err.chain.first(), err.chain.last());
                }
                other => panic!("Expected RecursionInfiniteLoop, got: {other:?}"),
            }
        }

        assert!(!container.is_frozen("a"));
        assert!(!container.is_frozen("b"));
        assert!(matches!(container.raw("a").unwrap(), Raw::Factory(_)));
    }

    #[test]
    fn other_keys_resolve_while_one_is_building() {
        let container = Container::new();
        container
            .set_factory("slow", |_| {
                std::thread::sleep(Duration::from_millis(50));
                Ok(1u8)
            })
            .unwrap();
        container.set_factory("fast", |_| Ok(2u8)).unwrap();

        std::thread::scope(|s| {
            let slow = s.spawn(|| container.get_as::<u8>("slow").unwrap());
            assert_eq!(*container.get_as::<u8>("fast").unwrap(), 2);
            assert_eq!(*slow.join().unwrap(), 1);
        });
    }
}
