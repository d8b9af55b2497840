// Copyright 2025 Cowboy AI, LLC.

//! Keyed service container for dependency resolution
//!
//! Services are bound to string keys so that wiring can be driven by
//! configuration, while [`ServiceKey`] tokens give call sites a statically
//! typed handle on the same bindings.
//!
//! Re-registering a key replaces the previous binding (last write wins).
//! Resolving an unbound key is an error, never an empty value.

use std::any::{type_name, Any};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::config::ContainerConfig;
use crate::errors::{CompositionError, CompositionResult};

/// A type-erased service as stored by the container.
///
/// The erased value is always an `Arc<T>` for the `T` it was registered
/// with, so `downcast_ref::<Arc<T>>()` recovers the shared instance.
pub type AnyService = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&ServiceContainer) -> anyhow::Result<AnyService> + Send + Sync>;

/// Holds the built instance of a lazy binding; locked while the factory runs
type Slot = Arc<Mutex<Option<AnyService>>>;

/// Typed token naming a service and the type it resolves to
///
/// ```
/// use cim_compose::{ServiceContainer, ServiceKey};
/// use std::sync::Arc;
///
/// const GREETING: ServiceKey<String> = ServiceKey::new("greeting");
///
/// let container = ServiceContainer::new();
/// container.register_keyed(&GREETING, Arc::new("hello".to_string()));
/// assert_eq!(*container.resolve_keyed(&GREETING).unwrap(), "hello");
/// ```
pub struct ServiceKey<T: ?Sized> {
    name: Cow<'static, str>,
    _service: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> ServiceKey<T> {
    /// Create a key from a static name, usable in `const` items
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _service: PhantomData,
        }
    }

    /// Create a key from a runtime name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            _service: PhantomData,
        }
    }

    /// The string key this token binds to
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: ?Sized> Clone for ServiceKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _service: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ServiceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("name", &self.name)
            .field("service", &type_name::<T>())
            .finish()
    }
}

#[derive(Clone)]
enum Binding {
    Instance {
        service: AnyService,
        type_name: &'static str,
    },
    Lazy {
        factory: Factory,
        slot: Slot,
        type_name: &'static str,
    },
}

impl Binding {
    fn type_name(&self) -> &'static str {
        match self {
            Binding::Instance { type_name, .. } | Binding::Lazy { type_name, .. } => *type_name,
        }
    }
}

/// Registry mapping string keys to shared service instances
///
/// All operations take `&self`; the container is normally shared behind an
/// `Arc` and guarded by a single lock per instance.
pub struct ServiceContainer {
    config: ContainerConfig,
    entries: RwLock<HashMap<String, Binding>>,
    parent: Option<Arc<ServiceContainer>>,
    constructing: Mutex<HashSet<(ThreadId, String)>>,
}

/// Removes the in-construction marker even if a factory panics
struct ConstructionGuard<'a> {
    constructing: &'a Mutex<HashSet<(ThreadId, String)>>,
    marker: (ThreadId, String),
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        self.constructing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.marker);
    }
}

impl ServiceContainer {
    /// Create an empty container with default settings
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Create an empty container
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            parent: None,
            constructing: Mutex::new(HashSet::new()),
        }
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Create a child scope
    ///
    /// Bindings made in the scope shadow the parent's; keys the scope does
    /// not know are resolved through the parent chain. The parent is never
    /// modified through the scope.
    pub fn create_scope(self: &Arc<Self>) -> ServiceContainer {
        let config = ContainerConfig {
            name: format!("{}::scope", self.config.name),
            ..self.config.clone()
        };
        ServiceContainer {
            parent: Some(Arc::clone(self)),
            ..ServiceContainer::with_config(config)
        }
    }

    /// The container this scope falls back to, if any
    pub fn parent(&self) -> Option<&Arc<ServiceContainer>> {
        self.parent.as_ref()
    }

    /// Bind `key` to a shared instance, replacing any previous binding
    ///
    /// `T` may be a trait object, e.g. `register::<dyn Logger>("logger", arc)`;
    /// resolution must then ask for the same `T`.
    pub fn register<T>(&self, key: impl Into<String>, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service: AnyService = Arc::new(instance);
        self.bind(
            key.into(),
            Binding::Instance {
                service,
                type_name: type_name::<T>(),
            },
        );
    }

    /// Bind `key` to a value, returning the shared handle that was stored
    pub fn register_instance<T>(&self, key: impl Into<String>, value: T) -> Arc<T>
    where
        T: Send + Sync + 'static,
    {
        let instance = Arc::new(value);
        self.register(key, Arc::clone(&instance));
        instance
    }

    /// Bind a typed key to a shared instance
    pub fn register_keyed<T>(&self, key: &ServiceKey<T>, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(key.name().to_string(), instance);
    }

    /// Bind `key` to a factory that runs once, on first resolution
    ///
    /// The built instance replaces the factory, so every later resolve
    /// returns the same object. A failing factory stays registered and is
    /// retried on the next resolve.
    pub fn register_lazy<T, F>(&self, key: impl Into<String>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |container: &ServiceContainer| {
            let instance = factory(container)?;
            Ok(Arc::new(instance) as AnyService)
        });
        self.bind(
            key.into(),
            Binding::Lazy {
                factory,
                slot: Arc::new(Mutex::new(None)),
                type_name: type_name::<T>(),
            },
        );
    }

    /// Resolve the instance bound to `key`
    ///
    /// # Errors
    ///
    /// - [`CompositionError::NotRegistered`] if neither this container nor
    ///   any parent binds `key`
    /// - [`CompositionError::TypeMismatch`] if the binding holds another type
    /// - [`CompositionError::ProviderFailed`] or
    ///   [`CompositionError::CircularDependency`] from lazy construction
    pub fn resolve<T>(&self, key: &str) -> CompositionResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let service = self.resolve_any(key)?;
        service
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| CompositionError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolve through a typed key
    pub fn resolve_keyed<T>(&self, key: &ServiceKey<T>) -> CompositionResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve(key.name())
    }

    /// Resolve a binding that is allowed to be absent
    ///
    /// Only [`CompositionError::NotRegistered`] becomes `None`; every other
    /// failure is still reported.
    pub fn resolve_optional<T>(&self, key: &str) -> CompositionResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.resolve(key) {
            Ok(service) => Ok(Some(service)),
            Err(CompositionError::NotRegistered { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve the type-erased instance bound to `key`
    pub fn resolve_any(&self, key: &str) -> CompositionResult<AnyService> {
        let binding = self.read_entries().get(key).cloned();
        match binding {
            Some(Binding::Instance { service, .. }) => Ok(service),
            Some(Binding::Lazy { factory, slot, .. }) => self.construct(key, factory, slot),
            None => match &self.parent {
                Some(parent) => parent.resolve_any(key),
                None => Err(CompositionError::not_registered(key)),
            },
        }
    }

    /// Check whether `key` resolves here or in a parent
    pub fn contains(&self, key: &str) -> bool {
        self.read_entries().contains_key(key)
            || self.parent.as_ref().is_some_and(|parent| parent.contains(key))
    }

    /// Keys bound directly in this container, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read_entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of keys bound directly in this container
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Check if no keys are bound directly in this container
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    fn bind(&self, key: String, binding: Binding) {
        let service = binding.type_name();
        let previous = self.write_entries().insert(key.clone(), binding);

        if let Some(previous) = previous {
            if self.config.log_overwrites {
                warn!(
                    container = %self.config.name,
                    key = %key,
                    previous = previous.type_name(),
                    replacement = service,
                    "Service key re-registered, previous binding replaced"
                );
            }
        }
        debug!(container = %self.config.name, key = %key, service, "Registered service");
    }

    fn construct(&self, key: &str, factory: Factory, slot: Slot) -> CompositionResult<AnyService> {
        // Checked before taking the slot lock, which a re-entrant resolve would deadlock on
        let marker = (thread::current().id(), key.to_string());
        if !self.lock_constructing().insert(marker.clone()) {
            return Err(CompositionError::CircularDependency {
                key: key.to_string(),
            });
        }
        let _guard = ConstructionGuard {
            constructing: &self.constructing,
            marker,
        };

        let mut built = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let service = match built.as_ref() {
            Some(service) => Arc::clone(service),
            None => {
                let service = factory(self).map_err(|err| {
                    warn!(container = %self.config.name, key = %key, error = %err, "Service provider failed");
                    CompositionError::ProviderFailed {
                        key: key.to_string(),
                        reason: format!("{err:#}"),
                    }
                })?;
                *built = Some(Arc::clone(&service));
                debug!(container = %self.config.name, key = %key, "Constructed lazy service");
                service
            }
        };
        drop(built);

        let mut entries = self.write_entries();
        match entries.get(key).cloned() {
            Some(Binding::Lazy {
                slot: current,
                type_name,
                ..
            }) if Arc::ptr_eq(&current, &slot) => {
                entries.insert(
                    key.to_string(),
                    Binding::Instance {
                        service: Arc::clone(&service),
                        type_name,
                    },
                );
                Ok(service)
            }
            // Another thread stored it first, or the key was re-bound meanwhile
            Some(Binding::Instance { service: current, .. }) => Ok(current),
            _ => Ok(service),
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, Binding>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, Binding>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_constructing(&self) -> MutexGuard<'_, HashSet<(ThreadId, String)>> {
        self.constructing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("name", &self.config.name)
            .field("keys", &self.keys())
            .field("scoped", &self.parent.is_some())
            .finish()
    }
}
