// Copyright 2025 Cowboy AI, LLC.

//! Objects assembled from components instead of inheritance

use crate::component::{Component, ComponentRegistry, OwnerId};

/// An owner built out of independently testable components
///
/// The object owns its [`ComponentRegistry`]; the registry only knows the
/// object's id.
///
/// ```
/// use cim_compose::{Component, ComposedObject};
/// use std::any::Any;
///
/// #[derive(Debug, Clone)]
/// struct PhysicsComponent { mass: f32 }
///
/// impl Component for PhysicsComponent {
///     fn name(&self) -> &str {
///         "PhysicsComponent"
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
///
/// let mut player = ComposedObject::new("player");
/// player.add_component(PhysicsComponent { mass: 70.0 });
///
/// let physics = player.get_component::<PhysicsComponent>("PhysicsComponent");
/// assert_eq!(physics.map(|p| p.mass), Some(70.0));
/// assert!(player.get_component::<PhysicsComponent>("RenderComponent").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ComposedObject {
    id: OwnerId,
    label: String,
    components: ComponentRegistry,
}

impl ComposedObject {
    /// Create an object with a fresh id and no components
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_id(OwnerId::new(), label)
    }

    /// Create an object with a known id
    pub fn with_id(id: OwnerId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            components: ComponentRegistry::new(id),
        }
    }

    /// The object's identity
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Human readable label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Attach a component, replacing any component with the same name
    pub fn add_component<C: Component>(&mut self, component: C) -> Option<Box<dyn Component>> {
        self.components.add_component(component)
    }

    /// Look up a component by name as the type the caller expects
    pub fn get_component<T: Component>(&self, name: &str) -> Option<&T> {
        self.components.get_component(name)
    }

    /// Mutable component lookup
    pub fn get_component_mut<T: Component>(&mut self, name: &str) -> Option<&mut T> {
        self.components.get_component_mut(name)
    }

    /// Check if a component is attached under `name`
    pub fn has_component(&self, name: &str) -> bool {
        self.components.has_component(name)
    }

    /// Detach a component
    pub fn remove_component(&mut self, name: &str) -> Option<Box<dyn Component>> {
        self.components.remove_component(name)
    }

    /// The underlying registry
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }
}
