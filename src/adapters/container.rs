//! Service container - Explicit registration and resolution of shared services.
//!
//! Services are registered under a name with an explicit factory closure and
//! a lifetime. Nothing is constructed until first resolution; singletons are
//! cached, transients are rebuilt per resolution, and scoped services live
//! as long as their [`ServiceScope`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::foundation::{DomainError, ErrorCode};

/// How long a resolved service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Built once, cached for the container's lifetime.
    Singleton,
    /// Built fresh on every resolution.
    Transient,
    /// Built once per [`ServiceScope`].
    Scoped,
}

type Service = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&ServiceContainer) -> Result<Service, DomainError> + Send + Sync>;
type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), DomainError>> + Send>;

struct Registration {
    lifetime: Lifetime,
    factory: Factory,
}

thread_local! {
    // Names on the current resolution chain. Factories run synchronously,
    // so a nested resolve stays on this thread; a repeated name here is a
    // cycle, while the same name mid-build on another thread is not.
    static RESOLUTION_CHAIN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Name-keyed service registry.
///
/// Resolution is by name plus an explicit type parameter; a mismatch between
/// the registered factory's type and the requested one is an error, never a
/// panic.
pub struct ServiceContainer {
    registrations: RwLock<HashMap<String, Registration>>,
    singletons: RwLock<HashMap<String, Service>>,
    cleanups: Mutex<Vec<(String, CleanupFn)>>,
    disposed: AtomicBool,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            cleanups: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register a service built once and shared.
    pub fn register_singleton<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Result<Arc<T>, DomainError> + Send + Sync + 'static,
    {
        self.register(name, Lifetime::Singleton, factory);
    }

    /// Register a service rebuilt on every resolution.
    pub fn register_transient<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Result<Arc<T>, DomainError> + Send + Sync + 'static,
    {
        self.register(name, Lifetime::Transient, factory);
    }

    /// Register a service built once per scope.
    pub fn register_scoped<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Result<Arc<T>, DomainError> + Send + Sync + 'static,
    {
        self.register(name, Lifetime::Scoped, factory);
    }

    /// Register an already-built instance as a singleton.
    pub fn register_instance<T>(&self, name: impl Into<String>, instance: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        let name = name.into();
        self.singletons
            .write()
            .expect("singleton cache lock poisoned")
            .insert(name.clone(), instance);
        self.registrations
            .write()
            .expect("registration lock poisoned")
            .insert(
                name,
                Registration {
                    lifetime: Lifetime::Singleton,
                    // Cache hit always wins; this factory never runs.
                    factory: Arc::new(|_| {
                        Err(DomainError::new(
                            ErrorCode::InternalError,
                            "instance registration has no factory",
                        ))
                    }),
                },
            );
    }

    fn register<T, F>(&self, name: impl Into<String>, lifetime: Lifetime, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> Result<Arc<T>, DomainError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(service = %name, lifetime = ?lifetime, "service registered");
        let previous = self
            .registrations
            .write()
            .expect("registration lock poisoned")
            .insert(
                name.clone(),
                Registration {
                    lifetime,
                    factory: Arc::new(move |container| {
                        factory(container).map(|service| service as Service)
                    }),
                },
            );
        if previous.is_some() {
            warn!(service = %name, "service registration replaced");
            // A stale singleton from the old registration must not satisfy
            // the new one.
            self.singletons
                .write()
                .expect("singleton cache lock poisoned")
                .remove(&name);
        }
    }

    /// Register an async cleanup hook run at disposal, newest first.
    pub fn add_cleanup<F>(&self, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), DomainError>> + Send + 'static,
    {
        self.cleanups
            .lock()
            .expect("cleanup list lock poisoned")
            .push((name.into(), Box::new(cleanup)));
    }

    /// Whether a name has been registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations
            .read()
            .expect("registration lock poisoned")
            .contains_key(name)
    }

    /// Resolve a service by name.
    ///
    /// Scoped registrations cannot be resolved here; open a
    /// [`ServiceScope`] for those.
    pub fn resolve<T>(&self, name: &str) -> Result<Arc<T>, DomainError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_live()?;

        let lifetime = self.lifetime_of(name)?;
        match lifetime {
            Lifetime::Singleton => {
                if let Some(cached) = self
                    .singletons
                    .read()
                    .expect("singleton cache lock poisoned")
                    .get(name)
                    .cloned()
                {
                    return downcast(name, cached);
                }
                let service = self.build(name)?;
                // Two tasks may have raced to build; the first insert wins
                // and the loser's instance is discarded.
                let service = Arc::clone(
                    self.singletons
                        .write()
                        .expect("singleton cache lock poisoned")
                        .entry(name.to_string())
                        .or_insert(service),
                );
                downcast(name, service)
            }
            Lifetime::Transient => downcast(name, self.build(name)?),
            Lifetime::Scoped => Err(DomainError::new(
                ErrorCode::InternalError,
                format!("service '{name}' is scoped; resolve it through a scope"),
            )),
        }
    }

    /// Open a resolution scope for scoped services.
    pub fn create_scope(self: &Arc<Self>) -> ServiceScope {
        ServiceScope {
            container: Arc::clone(self),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run all cleanup hooks (newest first) and drop every cached service.
    ///
    /// A failing hook does not stop the rest; all failures are collected
    /// into the returned error. The container rejects resolution afterwards.
    pub async fn dispose(&self) -> Result<(), DomainError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let cleanups: Vec<(String, CleanupFn)> = {
            let mut list = self.cleanups.lock().expect("cleanup list lock poisoned");
            list.drain(..).rev().collect()
        };

        let mut failures = Vec::new();
        for (name, cleanup) in cleanups {
            debug!(service = %name, "running cleanup");
            if let Err(err) = cleanup().await {
                warn!(service = %name, error = %err, "cleanup failed");
                failures.push(format!("{name}: {err}"));
            }
        }

        self.singletons
            .write()
            .expect("singleton cache lock poisoned")
            .clear();
        self.registrations
            .write()
            .expect("registration lock poisoned")
            .clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::InternalError,
                format!("{} cleanup hook(s) failed", failures.len()),
            )
            .with_detail("failures", failures.join("; ")))
        }
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::ContainerDisposed,
                "service container has been disposed",
            ));
        }
        Ok(())
    }

    fn lifetime_of(&self, name: &str) -> Result<Lifetime, DomainError> {
        self.registrations
            .read()
            .expect("registration lock poisoned")
            .get(name)
            .map(|r| r.lifetime)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::ServiceNotRegistered,
                    format!("no service registered under '{name}'"),
                )
            })
    }

    /// Run the factory for a name, guarding against cycles.
    fn build(&self, name: &str) -> Result<Service, DomainError> {
        let entered = RESOLUTION_CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();
            if chain.iter().any(|n| n == name) {
                return false;
            }
            chain.push(name.to_string());
            true
        });
        if !entered {
            return Err(DomainError::new(
                ErrorCode::CircularDependency,
                format!("circular dependency while resolving '{name}'"),
            ));
        }

        let factory = self
            .registrations
            .read()
            .expect("registration lock poisoned")
            .get(name)
            .map(|r| Arc::clone(&r.factory));

        let result = match factory {
            Some(factory) => factory(self),
            None => Err(DomainError::new(
                ErrorCode::ServiceNotRegistered,
                format!("no service registered under '{name}'"),
            )),
        };

        RESOLUTION_CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();
            if let Some(pos) = chain.iter().rposition(|n| n == name) {
                chain.remove(pos);
            }
        });
        result
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<T>(name: &str, service: Service) -> Result<Arc<T>, DomainError>
where
    T: Send + Sync + 'static,
{
    service.downcast::<T>().map_err(|_| {
        DomainError::new(
            ErrorCode::InternalError,
            format!("service '{name}' is not of the requested type"),
        )
    })
}

/// One resolution scope.
///
/// Scoped services resolved here are cached for the scope's lifetime and
/// dropped with it; singleton and transient resolution passes through to
/// the container.
pub struct ServiceScope {
    container: Arc<ServiceContainer>,
    cache: Mutex<HashMap<String, Service>>,
}

impl ServiceScope {
    /// Resolve a service within this scope.
    pub fn resolve<T>(&self, name: &str) -> Result<Arc<T>, DomainError>
    where
        T: Send + Sync + 'static,
    {
        self.container.ensure_live()?;

        match self.container.lifetime_of(name)? {
            Lifetime::Scoped => {
                if let Some(cached) = self
                    .cache
                    .lock()
                    .expect("scope cache lock poisoned")
                    .get(name)
                    .cloned()
                {
                    return downcast(name, cached);
                }
                let service = self.container.build(name)?;
                self.cache
                    .lock()
                    .expect("scope cache lock poisoned")
                    .insert(name.to_string(), Arc::clone(&service));
                downcast(name, service)
            }
            _ => self.container.resolve(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Greeter {
        greeting: String,
    }

    #[test]
    fn singleton_is_built_once_and_shared() {
        let container = ServiceContainer::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let builds_in_factory = Arc::clone(&builds);

        container.register_singleton("greeter", move |_| {
            builds_in_factory.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Greeter {
                greeting: "hello".to_string(),
            }))
        });

        let a: Arc<Greeter> = container.resolve("greeter").unwrap();
        let b: Arc<Greeter> = container.resolve("greeter").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.greeting, "hello");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_is_rebuilt_each_time() {
        let container = ServiceContainer::new();
        container.register_transient("greeter", |_| {
            Ok(Arc::new(Greeter {
                greeting: "hi".to_string(),
            }))
        });

        let a: Arc<Greeter> = container.resolve("greeter").unwrap();
        let b: Arc<Greeter> = container.resolve("greeter").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn factories_can_resolve_dependencies() {
        let container = ServiceContainer::new();
        container.register_singleton("greeting", |_| Ok(Arc::new("hallo".to_string())));
        container.register_singleton("greeter", |c| {
            let greeting: Arc<String> = c.resolve("greeting")?;
            Ok(Arc::new(Greeter {
                greeting: greeting.as_ref().clone(),
            }))
        });

        let greeter: Arc<Greeter> = container.resolve("greeter").unwrap();
        assert_eq!(greeter.greeting, "hallo");
    }

    #[test]
    fn circular_dependency_is_detected() {
        let container = ServiceContainer::new();
        container.register_singleton("a", |c| {
            let _b: Arc<Greeter> = c.resolve("b")?;
            Ok(Arc::new(Greeter {
                greeting: "a".to_string(),
            }))
        });
        container.register_singleton("b", |c| {
            let _a: Arc<Greeter> = c.resolve("a")?;
            Ok(Arc::new(Greeter {
                greeting: "b".to_string(),
            }))
        });

        let err = container.resolve::<Greeter>("a").unwrap_err();
        assert_eq!(err.code, ErrorCode::CircularDependency);
    }

    #[test]
    fn concurrent_singleton_resolution_is_not_a_cycle() {
        let container = Arc::new(ServiceContainer::new());
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let barrier_in_factory = Arc::clone(&barrier);
        container.register_singleton("greeter", move |_| {
            // Hold both factories in flight at the same time.
            barrier_in_factory.wait();
            Ok(Arc::new(Greeter {
                greeting: "shared".to_string(),
            }))
        });

        let resolvers: Vec<_> = (0..2)
            .map(|_| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || container.resolve::<Greeter>("greeter"))
            })
            .collect();

        let resolved: Vec<Arc<Greeter>> = resolvers
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        // Neither racer fails; the first cache insert wins and both callers
        // share that instance.
        assert!(Arc::ptr_eq(&resolved[0], &resolved[1]));
    }

    #[test]
    fn unregistered_name_is_an_error() {
        let container = ServiceContainer::new();
        let err = container.resolve::<Greeter>("missing").unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceNotRegistered);
    }

    #[test]
    fn wrong_type_is_an_error_not_a_panic() {
        let container = ServiceContainer::new();
        container.register_singleton("greeter", |_| {
            Ok(Arc::new(Greeter {
                greeting: "hello".to_string(),
            }))
        });

        let err = container.resolve::<String>("greeter").unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[test]
    fn registered_instance_resolves() {
        let container = ServiceContainer::new();
        let instance = Arc::new(Greeter {
            greeting: "pre-built".to_string(),
        });
        container.register_instance("greeter", Arc::clone(&instance));

        let resolved: Arc<Greeter> = container.resolve("greeter").unwrap();
        assert!(Arc::ptr_eq(&resolved, &instance));
    }

    #[test]
    fn scoped_service_is_cached_per_scope() {
        let container = Arc::new(ServiceContainer::new());
        container.register_scoped("greeter", |_| {
            Ok(Arc::new(Greeter {
                greeting: "scoped".to_string(),
            }))
        });

        let scope_one = container.create_scope();
        let a: Arc<Greeter> = scope_one.resolve("greeter").unwrap();
        let b: Arc<Greeter> = scope_one.resolve("greeter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let scope_two = container.create_scope();
        let c: Arc<Greeter> = scope_two.resolve("greeter").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn scoped_service_rejected_outside_scope() {
        let container = ServiceContainer::new();
        container.register_scoped("greeter", |_| {
            Ok(Arc::new(Greeter {
                greeting: "scoped".to_string(),
            }))
        });

        assert!(container.resolve::<Greeter>("greeter").is_err());
    }

    #[tokio::test]
    async fn dispose_runs_cleanups_newest_first_and_collects_errors() {
        let container = ServiceContainer::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        container.add_cleanup("first", move || {
            Box::pin(async move {
                order_a.lock().unwrap().push("first");
                Ok(())
            })
        });
        container.add_cleanup("failing", || {
            Box::pin(async {
                Err(DomainError::new(ErrorCode::InternalError, "cleanup broke"))
            })
        });
        let order_b = Arc::clone(&order);
        container.add_cleanup("last", move || {
            Box::pin(async move {
                order_b.lock().unwrap().push("last");
                Ok(())
            })
        });

        let err = container.dispose().await.unwrap_err();
        assert!(err.details.get("failures").unwrap().contains("failing"));
        // Newest hook ran first; the failure did not stop the older one.
        assert_eq!(*order.lock().unwrap(), vec!["last", "first"]);
    }

    #[tokio::test]
    async fn resolve_after_dispose_is_rejected() {
        let container = ServiceContainer::new();
        container.register_singleton("greeter", |_| {
            Ok(Arc::new(Greeter {
                greeting: "hello".to_string(),
            }))
        });

        container.dispose().await.unwrap();
        let err = container.resolve::<Greeter>("greeter").unwrap_err();
        assert_eq!(err.code, ErrorCode::ContainerDisposed);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let container = ServiceContainer::new();
        container.add_cleanup("failing", || {
            Box::pin(async { Err(DomainError::new(ErrorCode::InternalError, "boom")) })
        });

        assert!(container.dispose().await.is_err());
        // Second disposal has nothing left to run.
        assert!(container.dispose().await.is_ok());
    }
}
