// Copyright 2025 Cowboy AI, LLC.

//! Composition root owning the container, bus, mediator and composed objects
//!
//! The root replaces module-level singletons: everything a program wires
//! together is created here, handed out explicitly, and torn down by
//! [`CompositionRoot::shutdown`].

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::component::OwnerId;
use crate::composed_object::ComposedObject;
use crate::config::CompositionConfig;
use crate::errors::CompositionResult;
use crate::event_bus::EventBus;
use crate::mediator::{Colleague, Mediator};
use crate::service_container::ServiceContainer;

type Registration = Box<dyn FnOnce(&ServiceContainer) + Send>;

/// What was released by [`CompositionRoot::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSummary {
    /// Services bound in the root container
    pub services: usize,
    /// Event subscriptions removed from the bus
    pub subscriptions: usize,
    /// Colleagues removed from the mediator
    pub colleagues: usize,
    /// Composed objects dropped
    pub objects: usize,
}

/// Top-level owner of one container, one bus and one mediator
pub struct CompositionRoot {
    config: CompositionConfig,
    container: Arc<ServiceContainer>,
    bus: EventBus,
    mediator: Mediator,
    objects: IndexMap<OwnerId, ComposedObject>,
}

impl CompositionRoot {
    /// Start building a root
    pub fn builder() -> CompositionRootBuilder {
        CompositionRootBuilder::new()
    }

    /// Create a root with empty parts
    pub fn new(config: CompositionConfig) -> CompositionResult<Self> {
        config.validate()?;
        let root = Self {
            container: Arc::new(ServiceContainer::with_config(config.container.clone())),
            bus: EventBus::with_config(config.event_bus.clone()),
            mediator: Mediator::with_config(config.mediator.clone()),
            objects: IndexMap::new(),
            config,
        };
        info!(
            container = %root.container.name(),
            bus = %root.bus.name(),
            "Composition root created"
        );
        Ok(root)
    }

    /// Configuration the root was built with
    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// The root service container
    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    /// A child scope of the root container
    pub fn create_scope(&self) -> ServiceContainer {
        self.container.create_scope()
    }

    /// The event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The mediator
    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    /// Create a composed object owned by the root
    pub fn spawn_object(&mut self, label: impl Into<String>) -> OwnerId {
        let object = ComposedObject::new(label);
        let id = object.id();
        self.objects.insert(id, object);
        id
    }

    /// Look up an owned object
    pub fn object(&self, id: OwnerId) -> Option<&ComposedObject> {
        self.objects.get(&id)
    }

    /// Look up an owned object for modification
    pub fn object_mut(&mut self, id: OwnerId) -> Option<&mut ComposedObject> {
        self.objects.get_mut(&id)
    }

    /// Remove an object from the root, handing ownership to the caller
    pub fn despawn_object(&mut self, id: OwnerId) -> Option<ComposedObject> {
        self.objects.shift_remove(&id)
    }

    /// Owned objects in creation order
    pub fn objects(&self) -> impl Iterator<Item = &ComposedObject> {
        self.objects.values()
    }

    /// Tear everything down
    ///
    /// Subscriptions and colleagues are removed explicitly, so clones of the
    /// bus or mediator held elsewhere stop dispatching as well.
    pub fn shutdown(self) -> ShutdownSummary {
        let subscriptions = self.bus.clear_all();
        let colleagues = self
            .mediator
            .names()
            .iter()
            .filter(|name| self.mediator.unregister(name).is_some())
            .count();
        let summary = ShutdownSummary {
            services: self.container.len(),
            subscriptions,
            colleagues,
            objects: self.objects.len(),
        };
        info!(
            container = %self.container.name(),
            services = summary.services,
            subscriptions = summary.subscriptions,
            colleagues = summary.colleagues,
            objects = summary.objects,
            "Composition root shut down"
        );
        summary
    }
}

impl std::fmt::Debug for CompositionRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionRoot")
            .field("container", &self.container)
            .field("bus", &self.bus)
            .field("mediator", &self.mediator)
            .field("objects", &self.objects.len())
            .finish()
    }
}

/// Builder for configuring a [`CompositionRoot`]
#[derive(Default)]
pub struct CompositionRootBuilder {
    config: CompositionConfig,
    services: Vec<Registration>,
    colleagues: Vec<(String, Arc<dyn Colleague>)>,
}

impl CompositionRootBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the defaults
    pub fn config(mut self, config: CompositionConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind a service in the root container
    pub fn service<T>(mut self, key: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = key.into();
        self.services.push(Box::new(move |container: &ServiceContainer| {
            container.register(key, instance)
        }));
        self
    }

    /// Bind a lazily constructed service in the root container
    pub fn lazy_service<T, F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceContainer) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let key = key.into();
        self.services.push(Box::new(move |container: &ServiceContainer| {
            container.register_lazy(key, factory)
        }));
        self
    }

    /// Register a mediator colleague
    pub fn colleague(mut self, name: impl Into<String>, colleague: Arc<dyn Colleague>) -> Self {
        self.colleagues.push((name.into(), colleague));
        self
    }

    /// Validate the configuration and assemble the root
    pub fn build(self) -> CompositionResult<CompositionRoot> {
        let root = CompositionRoot::new(self.config)?;
        for register in self.services {
            register(&root.container);
        }
        for (name, colleague) in self.colleagues {
            root.mediator.register(name, colleague);
        }
        Ok(root)
    }
}
