// Copyright 2025 Cowboy AI, LLC.

//! # CIM Compose
//!
//! Composition over inheritance for the Composable Information Machine.
//!
//! This crate provides the building blocks for assembling programs out of
//! small, independently testable parts:
//! - **ServiceContainer**: Keyed service registry with lazy construction and scopes
//! - **Component**: Named, type-erased parts attached to an owner
//! - **ComposedObject**: An owner built from components instead of a class hierarchy
//! - **EventBus**: Named-event publish/subscribe with failure isolation
//! - **Mediator**: Colleagues coordinated through a central hub
//! - **CompositionRoot**: Explicit owner of all of the above, with shutdown
//!
//! ## Design Principles
//!
//! 1. **Explicit Wiring**: No global singletons; every dependency is handed out by a root
//! 2. **Last Write Wins**: Registering under an existing name replaces the old binding
//! 3. **Isolation**: One failing handler never stops delivery to the others
//! 4. **Type Safety**: Typed lookups return errors or `None`, never a wrong type

#![warn(missing_docs)]

mod component;
mod composed_object;
mod composition_root;
mod config;
mod errors;
mod event_bus;
mod mediator;
mod service_container;

#[cfg(test)]
mod test_logs;

pub use component::{Component, ComponentRegistry, OwnerId};
pub use composed_object::ComposedObject;
pub use composition_root::{CompositionRoot, CompositionRootBuilder, ShutdownSummary};
pub use config::{CompositionConfig, ContainerConfig, EventBusConfig, MediatorConfig};
pub use errors::{CompositionError, CompositionResult};
pub use event_bus::{EmitReport, EventBus, HandlerFailure, Subscription, SubscriptionId};
pub use mediator::{Colleague, ColleagueFailure, Mediator, NotifyReport, WeakMediator};
pub use service_container::{AnyService, ServiceContainer, ServiceKey};
