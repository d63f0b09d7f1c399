//! Per-request dependency provisioning.
//!
//! Resolvers demand collaborators (data sources, loaders, clients) from a
//! [`ServiceContainer`] scoped to the request. The [`Services`] spec is
//! composed once by the host and stamped into a fresh container for every
//! request the engine runs.

use std::{
    any::{type_name, Any, TypeId},
    sync::Arc,
};

use derive_more::{Display, Error};
use fnv::FnvHashMap;

/// Failure to resolve a service the resolver demanded.
#[derive(Clone, Debug, Display, Error, PartialEq)]
#[display("no service registered for `{type_name}`")]
pub struct MissingService {
    /// The Rust type name of the missing service.
    pub type_name: &'static str,
}

type Provider = Arc<dyn Fn(&mut ServiceContainer) + Send + Sync>;

/// A composable specification of the services available to resolvers.
#[derive(Clone, Default)]
pub struct Services {
    providers: Vec<Provider>,
}

impl Services {
    /// Creates an empty specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service instance shared by all requests.
    pub fn provide<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        let shared = Arc::new(value);
        self.providers.push(Arc::new(move |container| {
            container.insert_arc(shared.clone());
        }));
        self
    }

    /// Registers a factory producing a fresh service instance per request.
    pub fn provide_with<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.providers.push(Arc::new(move |container| {
            container.insert_arc(Arc::new(factory()));
        }));
        self
    }

    /// Merges another specification after this one; later registrations of
    /// the same service type win.
    pub fn merge(mut self, other: Services) -> Self {
        self.providers.extend(other.providers);
        self
    }

    /// Stamps a fresh container for one request.
    pub fn build(&self) -> ServiceContainer {
        let mut container = ServiceContainer::default();
        for provider in &self.providers {
            provider(&mut container);
        }
        container
    }
}

/// The request-scoped service container; lives exactly as long as the
/// request it was built for.
#[derive(Default)]
pub struct ServiceContainer {
    entries: FnvHashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContainer {
    fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.entries.insert(TypeId::of::<T>(), value);
    }

    /// Looks up a service by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, MissingService> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
            .ok_or(MissingService {
                type_name: type_name::<T>(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug)]
    struct Repo(&'static str);

    #[test]
    fn shared_instances_are_shared_across_requests() {
        let services = Services::new().provide(Repo("users"));
        let a = services.build().get::<Repo>().unwrap();
        let b = services.build().get::<Repo>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.0, "users");
    }

    #[test]
    fn factories_run_per_request() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        let services = Services::new().provide_with(|| {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Repo("fresh")
        });
        services.build();
        services.build();
        assert_eq!(BUILDS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_service_is_reported_by_type_name() {
        let err = Services::new().build().get::<Repo>().unwrap_err();
        assert!(err.type_name.contains("Repo"));
    }

    #[test]
    fn later_registration_wins() {
        let services = Services::new().provide(Repo("first")).provide(Repo("second"));
        assert_eq!(services.build().get::<Repo>().unwrap().0, "second");
    }
}
