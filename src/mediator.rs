// Copyright 2025 Cowboy AI, LLC.

//! Mediator routing notifications between named colleagues
//!
//! A colleague never talks to another colleague directly. It notifies the
//! mediator, which forwards the event to every other registered colleague.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::MediatorConfig;
use crate::event_bus::panic_message;

/// Participant in mediated communication
pub trait Colleague: Send + Sync {
    /// Handle an event forwarded by the mediator
    fn receive(&self, sender: &str, event: &str, data: &Value) -> anyhow::Result<()>;
}

impl<F> Colleague for F
where
    F: Fn(&str, &str, &Value) -> anyhow::Result<()> + Send + Sync,
{
    fn receive(&self, sender: &str, event: &str, data: &Value) -> anyhow::Result<()> {
        self(sender, event, data)
    }
}

/// A colleague that failed to handle a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColleagueFailure {
    /// Name the colleague is registered under
    pub colleague: String,
    /// Error or panic message
    pub message: String,
    /// Whether the colleague panicked
    pub panicked: bool,
}

/// Outcome of a single [`Mediator::notify`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReport {
    /// Colleague that sent the notification
    pub sender: String,
    /// Event name
    pub event: String,
    /// Colleagues that handled the event, in delivery order
    pub delivered: Vec<String>,
    /// Colleagues that failed
    pub failures: Vec<ColleagueFailure>,
}

impl NotifyReport {
    /// No colleague failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct MediatorInner {
    config: MediatorConfig,
    colleagues: RwLock<IndexMap<String, Arc<dyn Colleague>>>,
}

/// Routes notifications from one colleague to all others
///
/// `Mediator` is a cheap handle; clones share the same colleagues. Colleagues
/// that need to send should keep a [`WeakMediator`] so the mediator and its
/// colleagues do not keep each other alive.
#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

/// Non-owning handle to a [`Mediator`]
#[derive(Clone)]
pub struct WeakMediator {
    inner: Weak<MediatorInner>,
}

impl WeakMediator {
    /// Get the mediator back, if it still exists
    pub fn upgrade(&self) -> Option<Mediator> {
        self.inner.upgrade().map(|inner| Mediator { inner })
    }
}

impl fmt::Debug for WeakMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMediator")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Mediator {
    /// Create a mediator with default settings
    pub fn new() -> Self {
        Self::with_config(MediatorConfig::default())
    }

    /// Create a mediator
    pub fn with_config(config: MediatorConfig) -> Self {
        Self {
            inner: Arc::new(MediatorInner {
                config,
                colleagues: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Non-owning handle for colleagues to notify through
    pub fn downgrade(&self) -> WeakMediator {
        WeakMediator {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Register a colleague under `name`, replacing any previous one
    pub fn register(
        &self,
        name: impl Into<String>,
        colleague: Arc<dyn Colleague>,
    ) -> Option<Arc<dyn Colleague>> {
        let name = name.into();
        let replaced = self.write().insert(name.clone(), colleague);
        if replaced.is_some() && self.inner.config.log_overwrites {
            warn!(colleague = %name, "Colleague re-registered, previous one replaced");
        }
        debug!(colleague = %name, "Registered colleague");
        replaced
    }

    /// Remove a colleague
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Colleague>> {
        self.write().shift_remove(name)
    }

    /// Check if a colleague is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Colleague names in registration order
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered colleagues
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if no colleague is registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Forward `event` to every colleague except `sender`
    ///
    /// Delivery follows registration order over a snapshot taken up front.
    /// A failing colleague is recorded and skipped; the rest still receive.
    pub fn notify(&self, sender: &str, event: &str, data: &Value) -> NotifyReport {
        let recipients: Vec<(String, Arc<dyn Colleague>)> = self
            .read()
            .iter()
            .filter(|(name, _)| name.as_str() != sender)
            .map(|(name, colleague)| (name.clone(), Arc::clone(colleague)))
            .collect();

        let mut report = NotifyReport {
            sender: sender.to_string(),
            event: event.to_string(),
            delivered: Vec::with_capacity(recipients.len()),
            failures: Vec::new(),
        };

        for (name, colleague) in recipients {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| colleague.receive(sender, event, data)));
            match outcome {
                Ok(Ok(())) => report.delivered.push(name),
                Ok(Err(err)) => {
                    let message = format!("{err:#}");
                    warn!(colleague = %name, sender = %sender, event = %event, error = %message, "Colleague failed");
                    report.failures.push(ColleagueFailure {
                        colleague: name,
                        message,
                        panicked: false,
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(colleague = %name, sender = %sender, event = %event, error = %message, "Colleague panicked");
                    report.failures.push(ColleagueFailure {
                        colleague: name,
                        message,
                        panicked: true,
                    });
                }
            }
        }

        debug!(
            sender = %sender,
            event = %event,
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            "Mediated notification"
        );
        report
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<dyn Colleague>>> {
        self.inner.colleagues.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<dyn Colleague>>> {
        self.inner.colleagues.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("colleagues", &self.names())
            .finish()
    }
}
