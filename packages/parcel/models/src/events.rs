//! Observability events for degraded or notable outcomes.
//!
//! Resolvers never print. They hand an [`ObservabilityEvent`] to an
//! injected [`EventReporter`], which keeps "no parcel here" and "upstream
//! unreachable, served synthetic data" distinguishable downstream.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use strum_macros::{AsRefStr, Display};

/// Log target used by [`LogReporter`].
pub const EVENT_LOG_TARGET: &str = "parcel_map::events";

/// Kind of an observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    /// The cadastral service answered with no feature at the coordinate.
    ParcelNotFound,
    /// The first feature had geometry that could not be normalized.
    UngeometrizableParcel,
    /// The cadastral service failed and a synthetic parcel was served.
    UpstreamFallback,
    /// The cadastral service failed and no fallback was allowed.
    UpstreamFailure,
    /// A bounds request hit the feature cap.
    BoundsTruncated,
    /// The contact service failed and the placeholder contact was served.
    ContactFallback,
    /// A query log append failed and was dropped.
    QueryLogFailed,
}

impl EventKind {
    /// Whether this kind means the user saw degraded or missing data
    /// because something failed.
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        !matches!(self, Self::ParcelNotFound)
    }
}

/// A structured event: kind, message, and string context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityEvent {
    /// What happened.
    pub kind: EventKind,
    /// Human-readable detail.
    pub message: String,
    /// Key/value context (coordinates, upstream URL, error text).
    pub context: BTreeMap<String, String>,
}

impl ObservabilityEvent {
    /// Creates an event with empty context.
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

/// Sink for [`ObservabilityEvent`]s.
pub trait EventReporter: Send + Sync {
    /// Records an event. Must not panic or block for long.
    fn report(&self, event: &ObservabilityEvent);
}

/// Reports events as `log` records under [`EVENT_LOG_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl EventReporter for LogReporter {
    fn report(&self, event: &ObservabilityEvent) {
        let level = if event.kind.is_degraded() {
            log::Level::Warn
        } else {
            log::Level::Info
        };
        let context = event
            .context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        log::log!(
            target: EVENT_LOG_TARGET,
            level,
            "kind={} message={:?} {context}",
            event.kind,
            event.message,
        );
    }
}

/// Keeps reported events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ObservabilityEvent>>,
}

impl MemoryReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event reported so far.
    #[must_use]
    pub fn events(&self) -> Vec<ObservabilityEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the kinds of every event reported so far, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

impl EventReporter for MemoryReporter {
    fn report(&self, event: &ObservabilityEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_degraded() {
        assert!(!EventKind::ParcelNotFound.is_degraded());
        assert!(EventKind::UpstreamFallback.is_degraded());
        assert_eq!(EventKind::UpstreamFallback.to_string(), "upstream_fallback");
    }

    #[test]
    fn memory_reporter_keeps_order_and_context() {
        let reporter = MemoryReporter::new();
        reporter.report(&ObservabilityEvent::new(EventKind::ParcelNotFound, "none"));
        reporter.report(
            &ObservabilityEvent::new(EventKind::QueryLogFailed, "disk full").with("id", 7),
        );

        assert_eq!(
            reporter.kinds(),
            vec![EventKind::ParcelNotFound, EventKind::QueryLogFailed]
        );
        assert_eq!(reporter.events()[1].context["id"], "7");
    }
}
