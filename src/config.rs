// Copyright 2025 Cowboy AI, LLC.

//! Configuration for the composition root and its parts
//!
//! Every section has sensible defaults, so an empty JSON object is a valid
//! configuration. Unknown fields are rejected to catch typos early.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{CompositionError, CompositionResult};

/// Top-level configuration for a [`CompositionRoot`](crate::CompositionRoot)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct CompositionConfig {
    /// Service container settings
    pub container: ContainerConfig,

    /// Event bus settings
    pub event_bus: EventBusConfig,

    /// Mediator settings
    pub mediator: MediatorConfig,
}

/// Configuration for a [`ServiceContainer`](crate::ServiceContainer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    /// Name used in log output
    pub name: String,

    /// Emit a warning when a key is registered a second time
    pub log_overwrites: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "root".to_string(),
            log_overwrites: true,
        }
    }
}

/// Configuration for an [`EventBus`](crate::EventBus)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct EventBusConfig {
    /// Name used in log output
    pub name: String,

    /// Trace emissions that reach no subscriber
    pub trace_unhandled: bool,

    /// Convert handler panics into collected failures.
    ///
    /// When disabled, a panicking handler unwinds through `emit`. Handlers
    /// returning `Err` are isolated either way.
    pub catch_panics: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            name: "events".to_string(),
            trace_unhandled: false,
            catch_panics: true,
        }
    }
}

/// Configuration for a [`Mediator`](crate::Mediator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct MediatorConfig {
    /// Emit a warning when a colleague name is registered a second time
    pub log_overwrites: bool,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            log_overwrites: true,
        }
    }
}

impl CompositionConfig {
    /// Parse configuration from a JSON document
    pub fn from_json_str(input: &str) -> CompositionResult<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an already parsed JSON value
    pub fn from_json_value(value: serde_json::Value) -> CompositionResult<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> CompositionResult<()> {
        if self.container.name.trim().is_empty() {
            return Err(CompositionError::InvalidConfiguration(
                "container.name must not be empty".to_string(),
            ));
        }
        if self.event_bus.name.trim().is_empty() {
            return Err(CompositionError::InvalidConfiguration(
                "event_bus.name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// JSON Schema describing this configuration
    pub fn schema_document() -> CompositionResult<serde_json::Value> {
        let schema = schemars::schema_for!(CompositionConfig);
        Ok(serde_json::to_value(schema)?)
    }
}
