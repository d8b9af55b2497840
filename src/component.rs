// Copyright 2025 Cowboy AI, LLC.

//! Component trait and per-owner registry for has-a composition

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Trait for named capability objects that can be attached to an owner
///
/// A registry holds at most one component per name. The name is read when
/// the component is added, so it should not change afterwards.
///
/// # Example
///
/// ```
/// use cim_compose::Component;
/// use std::any::Any;
///
/// #[derive(Debug, Clone)]
/// struct Health(u32);
///
/// impl Component for Health {
///     fn name(&self) -> &str {
///         "Health"
///     }
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
///     fn as_any_mut(&mut self) -> &mut dyn Any {
///         self
///     }
///     fn clone_box(&self) -> Box<dyn Component> {
///         Box::new(self.clone())
///     }
/// }
/// ```
pub trait Component: Any + Send + Sync {
    /// Name the component is registered under
    fn name(&self) -> &str;

    /// Get the component as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get the component as mutable Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Clone the component into a box
    fn clone_box(&self) -> Box<dyn Component>;
}

/// Identity of the object a registry belongs to
///
/// Registries keep this id rather than a reference, so they never own or
/// borrow their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Generate a fresh owner id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named components attached to a single owner
///
/// Adding a component under a name that is already taken replaces the old
/// component (last write wins). Looking up a missing name is not an error;
/// it yields `None`.
pub struct ComponentRegistry {
    owner: OwnerId,
    components: IndexMap<String, Box<dyn Component>>,
}

impl ComponentRegistry {
    /// Create an empty registry for `owner`
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            components: IndexMap::new(),
        }
    }

    /// The owner this registry is attached to
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Add a component, returning the one it replaced if the name was taken
    pub fn add_component<C: Component>(&mut self, component: C) -> Option<Box<dyn Component>> {
        self.add_boxed(Box::new(component))
    }

    /// Add an already boxed component
    pub fn add_boxed(&mut self, component: Box<dyn Component>) -> Option<Box<dyn Component>> {
        let name = component.name().to_string();
        let replaced = self.components.insert(name.clone(), component);
        debug!(
            owner = %self.owner,
            component = %name,
            replaced = replaced.is_some(),
            "Added component"
        );
        replaced
    }

    /// Get a component by name as the concrete type the caller expects
    ///
    /// Returns `None` when nothing is registered under `name`, or when the
    /// registered component is of a different type.
    pub fn get_component<T: Component>(&self, name: &str) -> Option<&T> {
        self.components
            .get(name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    /// Mutable variant of [`get_component`](Self::get_component)
    pub fn get_component_mut<T: Component>(&mut self, name: &str) -> Option<&mut T> {
        self.components
            .get_mut(name)
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    /// Get a component by name without committing to a concrete type
    pub fn get_dyn(&self, name: &str) -> Option<&dyn Component> {
        self.components.get(name).map(|c| &**c)
    }

    /// Check if a component is registered under `name`
    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Remove a component by name (returns the component)
    pub fn remove_component(&mut self, name: &str) -> Option<Box<dyn Component>> {
        let removed = self.components.shift_remove(name);
        if removed.is_some() {
            debug!(owner = %self.owner, component = %name, "Removed component");
        }
        removed
    }

    /// Component names in the order they were first added
    pub fn names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    /// Iterate over all components
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Component)> {
        self.components
            .iter()
            .map(|(name, component)| (name.as_str(), &**component))
    }

    /// Get the number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Clone for ComponentRegistry {
    fn clone(&self) -> Self {
        let components = self
            .components
            .iter()
            .map(|(name, component)| (name.clone(), component.clone_box()))
            .collect();
        Self {
            owner: self.owner,
            components,
        }
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("owner", &self.owner)
            .field("components", &self.names())
            .finish()
    }
}
