//! Request-scoped typed slot storage threaded through all resolvers.

use std::{
    any::Any,
    future::Future,
    marker::PhantomData,
    sync::{Arc, RwLock},
};

use derive_more::{Display, Error};
use fnv::FnvHashMap;

/// A typed handle into the [`ContextStore`].
///
/// Slots are identified by name; the type parameter pins the stored type at
/// the access sites. Names are global, so two modules creating a slot with
/// the same name share (and can clobber) the binding.
pub struct Slot<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

// `PhantomData<fn() -> T>` keeps `Slot` `Copy` regardless of `T`.
impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> Slot<T> {
    /// The slot's name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Creates a typed slot identity with the given name.
pub fn make<T>(name: &'static str) -> Slot<T> {
    Slot {
        name,
        _marker: PhantomData,
    }
}

/// Failure to read a slot that has no binding.
#[derive(Clone, Debug, Display, Error, PartialEq)]
#[display("no resolver context value for slot `{name}`")]
pub struct MissingContext {
    /// The name of the unbound slot.
    pub name: String,
}

type StoredValue = Arc<dyn Any + Send + Sync>;

/// The per-request slot store: a keyed map behind a write-synchronized
/// reference. Created when a request starts and dropped with it.
#[derive(Clone, Default)]
pub struct ContextStore {
    slots: Arc<RwLock<FnvHashMap<&'static str, StoredValue>>>,
}

impl ContextStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the slot, failing with [`MissingContext`] when unbound or bound
    /// at a different type.
    pub fn get<T: Send + Sync + 'static>(&self, slot: Slot<T>) -> Result<Arc<T>, MissingContext> {
        self.get_option(slot).ok_or(MissingContext {
            name: slot.name.into(),
        })
    }

    /// Reads the slot, returning `None` when unbound.
    pub fn get_option<T: Send + Sync + 'static>(&self, slot: Slot<T>) -> Option<Arc<T>> {
        let slots = self.slots.read().expect("context store lock poisoned");
        slots.get(slot.name).cloned()?.downcast::<T>().ok()
    }

    /// Binds the slot to `value` for the remainder of the request (or until
    /// overwritten).
    pub fn set<T: Send + Sync + 'static>(&self, slot: Slot<T>, value: T) {
        let mut slots = self.slots.write().expect("context store lock poisoned");
        slots.insert(slot.name, Arc::new(value));
    }

    /// Binds the slot around `effect`, restoring the previous binding
    /// (including absence) on every exit path, cancellation included.
    pub async fn scoped<T, F>(&self, slot: Slot<T>, value: T, effect: F) -> F::Output
    where
        T: Send + Sync + 'static,
        F: Future,
    {
        let previous = {
            let mut slots = self.slots.write().expect("context store lock poisoned");
            slots.insert(slot.name, Arc::new(value))
        };
        let _restore = RestoreGuard {
            store: self,
            name: slot.name,
            previous: Some(previous),
        };
        effect.await
    }
}

struct RestoreGuard<'a> {
    store: &'a ContextStore,
    name: &'static str,
    previous: Option<Option<StoredValue>>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.store.slots.write() {
            match self.previous.take().flatten() {
                Some(prev) => {
                    slots.insert(self.name, prev);
                }
                None => {
                    slots.remove(self.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_fails_on_unbound_slot() {
        let store = ContextStore::new();
        let slot = make::<i32>("tests.unbound");
        assert_eq!(
            store.get(slot).unwrap_err(),
            MissingContext {
                name: "tests.unbound".into()
            },
        );
        assert_eq!(store.get_option(slot), None);
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = ContextStore::new();
        let slot = make::<String>("tests.user");
        store.set(slot, "alice".into());
        assert_eq!(*store.get(slot).unwrap(), "alice");
    }

    #[tokio::test]
    async fn scoped_restores_previous_binding() {
        let store = ContextStore::new();
        let slot = make::<i32>("tests.depth");
        store.set(slot, 1);
        store
            .scoped(slot, 2, async {
                assert_eq!(*store.get(slot).unwrap(), 2);
            })
            .await;
        assert_eq!(*store.get(slot).unwrap(), 1);
    }

    #[tokio::test]
    async fn scoped_restores_absence() {
        let store = ContextStore::new();
        let slot = make::<i32>("tests.transient");
        store.scoped(slot, 7, async {}).await;
        assert_eq!(store.get_option(slot), None);
    }

    #[tokio::test]
    async fn scoped_restores_on_drop_mid_effect() {
        let store = ContextStore::new();
        let slot = make::<i32>("tests.cancelled");
        store.set(slot, 1);
        {
            let fut = store.scoped(slot, 2, std::future::pending::<()>());
            futures::pin_mut!(fut);
            // Poll once so the binding is installed, then drop the future.
            assert!(futures::poll!(fut.as_mut()).is_pending());
        }
        assert_eq!(*store.get(slot).unwrap(), 1);
    }
}
