// Copyright 2025 Cowboy AI, LLC.

//! Publish/subscribe event bus
//!
//! Handlers are grouped by event name and invoked synchronously, in the
//! order they subscribed. Each emission works on a snapshot of the
//! subscriber list taken when it starts: handlers added or removed while it
//! runs only affect later emissions.
//!
//! A failing handler never stops delivery to the handlers after it. Errors
//! and panics are caught per handler and returned in an [`EmitReport`].
//!
//! ```
//! use cim_compose::EventBus;
//! use serde_json::json;
//!
//! let bus: EventBus = EventBus::new();
//! bus.on("user.created", |user| {
//!     assert_eq!(user["email"], "a@b.com");
//!     Ok(())
//! });
//!
//! let report = bus.emit("user.created", json!({ "email": "a@b.com" }));
//! assert_eq!(report.delivered, 1);
//! assert!(report.is_clean());
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::config::EventBusConfig;
use crate::errors::{CompositionError, CompositionResult};

/// Identifier of a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Handler<P> = Arc<dyn Fn(&P) -> anyhow::Result<()> + Send + Sync>;

struct Registration<P> {
    id: SubscriptionId,
    handler: Handler<P>,
    /// Set for `once` handlers; flipped by the first emission that claims it
    fired: Option<Arc<AtomicBool>>,
}

impl<P> Clone for Registration<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
            fired: self.fired.clone(),
        }
    }
}

struct BusInner<P> {
    config: EventBusConfig,
    subscribers: RwLock<HashMap<String, Vec<Registration<P>>>>,
}

impl<P> BusInner<P> {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Registration<P>>>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Registration<P>>>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Type-erased view of a bus, so subscription handles need no payload type
trait SubscriberTable: Send + Sync {
    fn remove(&self, event: &str, id: SubscriptionId) -> bool;
    fn contains(&self, event: &str, id: SubscriptionId) -> bool;
}

impl<P: 'static> SubscriberTable for BusInner<P> {
    fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.write();
        let Some(handlers) = subscribers.get_mut(event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|registration| registration.id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            subscribers.remove(event);
        }
        drop(subscribers);

        if removed {
            debug!(bus = %self.config.name, event = %event, subscription = %id, "Unsubscribed handler");
        }
        removed
    }

    fn contains(&self, event: &str, id: SubscriptionId) -> bool {
        self.read()
            .get(event)
            .is_some_and(|handlers| handlers.iter().any(|r| r.id == id))
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe later
///
/// Dropping the handle leaves the handler subscribed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    event: String,
    bus: Weak<dyn SubscriberTable>,
}

impl Subscription {
    /// Identifier of this subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event name the handler is subscribed to
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Check if the handler is still subscribed
    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.contains(&self.event, self.id))
    }

    /// Remove the handler from its bus
    ///
    /// Returns `false` if it was already removed or the bus is gone.
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove(&self.event, self.id))
    }
}

/// A handler failure isolated during emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// Subscription whose handler failed
    pub subscription: SubscriptionId,
    /// Event being emitted
    pub event: String,
    /// Error or panic message
    pub message: String,
    /// Whether the handler panicked rather than returning an error
    pub panicked: bool,
    /// When the failure was observed
    pub occurred_at: DateTime<Utc>,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(
            f,
            "handler {} {} on {}: {}",
            self.subscription, kind, self.event, self.message
        )
    }
}

/// Outcome of a single emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitReport {
    /// Event that was emitted
    pub event: String,
    /// Handlers that completed successfully
    pub delivered: usize,
    /// Handlers that failed, in invocation order
    pub failures: Vec<HandlerFailure>,
    /// When emission started
    pub emitted_at: DateTime<Utc>,
}

impl EmitReport {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            delivered: 0,
            failures: Vec::new(),
            emitted_at: Utc::now(),
        }
    }

    /// No handler failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Handlers invoked, whether they succeeded or not
    pub fn invoked(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// Turn collected failures into an error, or return the delivery count
    pub fn into_result(self) -> CompositionResult<usize> {
        let failures = self.failures.len();
        match self.failures.into_iter().next() {
            None => Ok(self.delivered),
            Some(first) => Err(CompositionError::HandlerFailures {
                event: self.event,
                failures,
                first: first.message,
            }),
        }
    }
}

/// Mapping from event names to ordered subscriber lists
///
/// `EventBus` is a cheap handle; clones share the same subscribers.
pub struct EventBus<P = serde_json::Value> {
    inner: Arc<BusInner<P>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: 'static> EventBus<P> {
    /// Create an empty bus with default settings
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create an empty bus
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                subscribers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Name used in log output
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Bus settings
    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// Subscribe `handler` to `event`, after any existing handlers
    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(event.into(), Arc::new(handler), false)
    }

    /// Subscribe a handler that is removed the first time it is invoked
    pub fn once<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(event.into(), Arc::new(handler), true)
    }

    /// Remove the handler behind `subscription`
    ///
    /// Returns `false` if it is not subscribed to this bus.
    pub fn off(&self, subscription: &Subscription) -> bool {
        self.inner.remove(&subscription.event, subscription.id)
    }

    /// Invoke every handler subscribed to `event` when emission starts
    ///
    /// Emitting an event nobody listens to is a no-op. Handler failures are
    /// isolated and collected; this never returns early.
    pub fn emit(&self, event: &str, payload: P) -> EmitReport {
        let snapshot: Vec<Registration<P>> =
            self.inner.read().get(event).cloned().unwrap_or_default();

        let mut report = EmitReport::new(event);
        if snapshot.is_empty() {
            if self.inner.config.trace_unhandled {
                trace!(bus = %self.inner.config.name, event = %event, "No subscribers for event");
            }
            return report;
        }

        for registration in &snapshot {
            if let Some(fired) = &registration.fired {
                if fired.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.inner.remove(event, registration.id);
            }

            match self.invoke(event, registration, &payload) {
                Ok(()) => report.delivered += 1,
                Err(failure) => report.failures.push(failure),
            }
        }

        debug!(
            bus = %self.inner.config.name,
            event = %event,
            delivered = report.delivered,
            failed = report.failures.len(),
            "Emitted event"
        );
        report
    }

    /// Number of handlers currently subscribed to `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.read().get(event).map_or(0, Vec::len)
    }

    /// Check if anything is subscribed to `event`
    pub fn has_subscribers(&self, event: &str) -> bool {
        self.handler_count(event) > 0
    }

    /// Event names with at least one subscriber, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every handler for `event`, returning how many were removed
    pub fn clear(&self, event: &str) -> usize {
        let removed = self.inner.write().remove(event).map_or(0, |h| h.len());
        debug!(bus = %self.inner.config.name, event = %event, removed, "Cleared event subscribers");
        removed
    }

    /// Remove every handler for every event
    pub fn clear_all(&self) -> usize {
        let drained: Vec<Vec<Registration<P>>> =
            self.inner.write().drain().map(|(_, handlers)| handlers).collect();
        let removed = drained.iter().map(Vec::len).sum();
        debug!(bus = %self.inner.config.name, removed, "Cleared all subscribers");
        removed
    }

    fn subscribe(&self, event: String, handler: Handler<P>, once: bool) -> Subscription {
        let id = SubscriptionId::new();
        let registration = Registration {
            id,
            handler,
            fired: once.then(|| Arc::new(AtomicBool::new(false))),
        };

        let position = {
            let mut subscribers = self.inner.write();
            let handlers = subscribers.entry(event.clone()).or_default();
            handlers.push(registration);
            handlers.len()
        };
        debug!(
            bus = %self.inner.config.name,
            event = %event,
            subscription = %id,
            position,
            once,
            "Subscribed handler"
        );

        let table: Arc<dyn SubscriberTable> = self.inner.clone();
        Subscription {
            id,
            event,
            bus: Arc::downgrade(&table),
        }
    }

    fn invoke(
        &self,
        event: &str,
        registration: &Registration<P>,
        payload: &P,
    ) -> Result<(), HandlerFailure> {
        let outcome = if self.inner.config.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(|| (registration.handler)(payload)))
        } else {
            Ok((registration.handler)(payload))
        };

        let (message, panicked) = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                warn!(
                    bus = %self.inner.config.name,
                    event = %event,
                    subscription = %registration.id,
                    error = %message,
                    "Event handler failed"
                );
                (message, false)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    bus = %self.inner.config.name,
                    event = %event,
                    subscription = %registration.id,
                    error = %message,
                    "Event handler panicked"
                );
                (message, true)
            }
        };

        Err(HandlerFailure {
            subscription: registration.id,
            event: event.to_string(),
            message,
            panicked,
            occurred_at: Utc::now(),
        })
    }
}

impl<P: Default + 'static> EventBus<P> {
    /// Emit `event` without a payload
    pub fn signal(&self, event: &str) -> EmitReport {
        self.emit(event, P::default())
    }
}

impl<P: 'static> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(String, usize)> = {
            let subscribers = self.inner.read();
            let mut counts: Vec<(String, usize)> = subscribers
                .iter()
                .map(|(event, handlers)| (event.clone(), handlers.len()))
                .collect();
            counts.sort();
            counts
        };
        f.debug_struct("EventBus")
            .field("name", &self.inner.config.name)
            .field("subscribers", &counts)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_logs::capture_logs;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use test_case::test_case;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> impl Fn(&Value) -> anyhow::Result<()> {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Test subscriber ordering
    ///
    /// ```mermaid
    /// sequenceDiagram
    ///     participant Bus
    ///     participant H1
    ///     participant H2
    ///     participant H3
    ///     Bus->>H1: emit e
    ///     Bus->>H2: emit e
    ///     Bus->>H3: emit e
    /// ```
    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();
        bus.on("e", recorder(&log, "h1"));
        bus.on("e", recorder(&log, "h2"));
        bus.on("e", recorder(&log, "h3"));

        let report = bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["h1", "h2", "h3"]);
        assert_eq!(report.delivered, 3);
        assert!(report.is_clean());
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus: EventBus = EventBus::new();
        let report = bus.emit("nope", json!({ "ignored": true }));
        assert_eq!(report.event, "nope");
        assert_eq!(report.invoked(), 0);
        assert!(report.is_clean());
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_payload_is_delivered() {
        let bus: EventBus = EventBus::new();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let sink = Arc::clone(&seen);
        bus.on("user.created", move |user| {
            sink.lock().unwrap().push(user.clone());
            Ok(())
        });

        bus.emit("user.created", json!({ "email": "a@b.com" }));
        assert_eq!(*seen.lock().unwrap(), vec![json!({ "email": "a@b.com" })]);
    }

    #[test]
    fn test_events_are_independent() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();
        bus.on("a", recorder(&log, "a"));
        bus.on("b", recorder(&log, "b"));

        bus.emit("b", Value::Null);
        assert_eq!(entries(&log), vec!["b"]);
        assert_eq!(bus.event_names(), vec!["a", "b"]);
    }

    /// Test failure isolation
    ///
    /// ```mermaid
    /// graph LR
    ///     E[emit e] --> H1[h1 fails]
    ///     H1 -->|isolated| H2[h2 runs]
    ///     H2 --> H3[h3 panics]
    ///     H3 -->|isolated| R[report: 1 delivered, 2 failures]
    /// ```
    #[test]
    fn test_failures_are_isolated_and_reported() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();

        let failing = bus.on("e", |_| anyhow::bail!("smtp unavailable"));
        bus.on("e", recorder(&log, "h2"));
        let panicking = bus.on("e", |_| panic!("boom"));

        let report = bus.emit("e", Value::Null);

        assert_eq!(entries(&log), vec!["h2"]);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);

        assert_eq!(report.failures[0].subscription, failing.id());
        assert_eq!(report.failures[0].message, "smtp unavailable");
        assert!(!report.failures[0].panicked);

        assert_eq!(report.failures[1].subscription, panicking.id());
        assert_eq!(report.failures[1].message, "boom");
        assert!(report.failures[1].panicked);

        // The bus is still usable and the handlers stay subscribed
        assert_eq!(bus.handler_count("e"), 3);
        let err = report.into_result().unwrap_err();
        assert_eq!(
            err,
            CompositionError::HandlerFailures {
                event: "e".to_string(),
                failures: 2,
                first: "smtp unavailable".to_string(),
            }
        );
    }

    #[test]
    fn test_into_result_counts_deliveries() {
        let bus: EventBus = EventBus::new();
        bus.on("e", |_| Ok(()));
        bus.on("e", |_| Ok(()));
        assert_eq!(bus.emit("e", Value::Null).into_result().unwrap(), 2);
    }

    /// Test snapshot-at-emit semantics for additions
    ///
    /// ```mermaid
    /// sequenceDiagram
    ///     participant Bus
    ///     participant H1
    ///     Bus->>H1: emit e (snapshot = [h1])
    ///     H1->>Bus: on(e, h4)
    ///     Note over Bus: h4 not invoked in this emission
    ///     Bus->>H1: emit e (snapshot = [h1, h4])
    /// ```
    #[test]
    fn test_handler_added_during_emit_waits_for_next_emit() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();

        let inner_bus = bus.clone();
        let inner_log = Arc::clone(&log);
        let added = Arc::new(AtomicBool::new(false));
        bus.on("e", move |_| {
            inner_log.lock().unwrap().push("h1".to_string());
            if !added.swap(true, Ordering::SeqCst) {
                inner_bus.on("e", recorder(&inner_log, "h4"));
            }
            Ok(())
        });

        bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["h1"]);
        assert_eq!(bus.handler_count("e"), 2);

        bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["h1", "h1", "h4"]);
    }

    #[test]
    fn test_handler_removed_during_emit_still_runs_once() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::default();

        let slot = Arc::clone(&victim);
        bus.on("e", move |_| {
            if let Some(subscription) = slot.lock().unwrap().take() {
                subscription.unsubscribe();
            }
            Ok(())
        });
        *victim.lock().unwrap() = Some(bus.on("e", recorder(&log, "h2")));

        bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["h2"]);

        bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["h2"]);
        assert_eq!(bus.handler_count("e"), 1);
    }

    #[test]
    fn test_reentrant_emit() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();

        let inner_bus = bus.clone();
        bus.on("outer", move |_| {
            inner_bus.emit("inner", Value::Null);
            Ok(())
        });
        bus.on("inner", recorder(&log, "inner"));

        assert!(bus.emit("outer", Value::Null).is_clean());
        assert_eq!(entries(&log), vec!["inner"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();
        let first = bus.on("e", recorder(&log, "first"));
        let second = bus.on("e", recorder(&log, "second"));

        assert!(first.is_active());
        assert!(bus.off(&first));
        assert!(!first.is_active());
        assert!(!bus.off(&first));

        bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["second"]);

        assert!(second.unsubscribe());
        assert!(!bus.has_subscribers("e"));
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let subscription = {
            let bus: EventBus = EventBus::new();
            bus.on("e", |_| Ok(()))
        };
        assert!(!subscription.is_active());
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn test_off_ignores_foreign_subscription() {
        let bus_a: EventBus = EventBus::new();
        let bus_b: EventBus = EventBus::new();
        let foreign = bus_b.on("e", |_| Ok(()));
        bus_a.on("e", |_| Ok(()));

        assert!(!bus_a.off(&foreign));
        assert_eq!(bus_a.handler_count("e"), 1);
        assert_eq!(bus_b.handler_count("e"), 1);
    }

    #[test]
    fn test_once_handler() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();
        let subscription = bus.once("ready", recorder(&log, "once"));
        bus.on("ready", recorder(&log, "always"));

        bus.signal("ready");
        bus.signal("ready");

        assert_eq!(entries(&log), vec!["once", "always", "always"]);
        assert!(!subscription.is_active());
        assert_eq!(bus.handler_count("ready"), 1);
    }

    #[test]
    fn test_once_handler_survives_reentrant_emit() {
        let bus: EventBus = EventBus::new();
        let log: Log = Arc::default();

        let inner_bus = bus.clone();
        let inner_log = Arc::clone(&log);
        bus.once("e", move |_| {
            inner_log.lock().unwrap().push("once".to_string());
            inner_bus.emit("e", Value::Null);
            Ok(())
        });

        bus.emit("e", Value::Null);
        assert_eq!(entries(&log), vec!["once"]);
    }

    #[test]
    fn test_signal_uses_default_payload() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        bus.on("tick", move |value| {
            *sink.lock().unwrap() = Some(*value);
            Ok(())
        });

        bus.signal("tick");
        assert_eq!(*seen.lock().unwrap(), Some(0));
    }

    #[test]
    fn test_clear() {
        let bus: EventBus = EventBus::new();
        bus.on("a", |_| Ok(()));
        bus.on("a", |_| Ok(()));
        bus.on("b", |_| Ok(()));

        assert_eq!(bus.clear("a"), 2);
        assert_eq!(bus.clear("a"), 0);
        assert_eq!(bus.clear_all(), 1);
        assert!(bus.event_names().is_empty());
    }

    #[test]
    #[should_panic(expected = "unguarded")]
    fn test_panics_propagate_when_not_caught() {
        let bus: EventBus = EventBus::with_config(EventBusConfig {
            catch_panics: false,
            ..EventBusConfig::default()
        });
        bus.on("e", |_| panic!("unguarded"));
        bus.emit("e", Value::Null);
    }

    #[test]
    fn test_handler_failure_display() {
        let bus: EventBus = EventBus::new();
        bus.on("e", |_| anyhow::bail!("nope"));
        let report = bus.emit("e", Value::Null);
        let text = report.failures[0].to_string();
        assert!(text.contains("failed on e: nope"));
    }

    #[test]
    fn test_report_serializes() {
        let bus: EventBus = EventBus::new();
        bus.on("e", |_| anyhow::bail!("nope"));
        let report = bus.emit("e", Value::Null);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["event"], "e");
        assert_eq!(json["failures"][0]["message"], "nope");
        let back: EmitReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_debug_lists_subscriber_counts() {
        let bus: EventBus = EventBus::new();
        bus.on("user.created", |_| Ok(()));
        let debug = format!("{bus:?}");
        assert!(debug.contains("EventBus"));
        assert!(debug.contains("user.created"));
    }

    #[test]
    fn test_emit_from_many_threads() {
        let bus: EventBus<usize> = EventBus::new();
        let total = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&total);
        bus.on("add", move |n| {
            *sink.lock().unwrap() += *n;
            Ok(())
        });

        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let bus = bus.clone();
                std::thread::spawn(move || bus.emit("add", n))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_clean());
        }
        assert_eq!(*total.lock().unwrap(), 10);
    }

    #[test_case(true, true ; "traced when enabled")]
    #[test_case(false, false ; "quiet by default")]
    fn test_unhandled_trace_follows_config(trace_unhandled: bool, expect_trace: bool) {
        let bus: EventBus = EventBus::with_config(EventBusConfig {
            trace_unhandled,
            ..EventBusConfig::default()
        });

        let logs = capture_logs(|| {
            assert!(bus.emit("nobody.listens", Value::Null).is_clean());
        });

        assert_eq!(logs.contains("No subscribers for event"), expect_trace);
    }
}
