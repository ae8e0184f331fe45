use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::{field::Field, span, Level, Metadata};

/// Models the data reported in a tracing event.
#[derive(Debug, Clone)]
pub(crate) struct TracingEvent {
    /// The verbosity level.
    pub(crate) level: Level,
    /// The target, i.e. component the event corresponds to.
    pub(crate) target: String,
    /// Map of key/value pairs attached to the event.
    pub(crate) fields: HashMap<String, TracingEventValue>,
}

impl TracingEvent {
    fn new(level: Level, target: String) -> TracingEvent {
        TracingEvent {
            level,
            target,
            fields: Default::default(),
        }
    }

    /// The formatted message of the event, if it has one.
    pub(crate) fn message(&self) -> Option<&str> {
        match self.fields.get("message") {
            Some(TracingEventValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Models the value of a field in a tracing event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TracingEventValue {
    I64(i64),
    U64(u64),
    Bool(bool),
    String(String),
}

/// A type for use in tests that need to consume tracing events. Register it with
/// `set_as_default` and every event emitted on the current thread at or above the given level is
/// recorded until the returned guard is dropped.
#[derive(Clone)]
pub(crate) struct TracingHandler {
    max_verbosity_level: Level,
    events: Arc<Mutex<Vec<TracingEvent>>>,
}

impl TracingHandler {
    pub(crate) fn new(max_verbosity_level: Level) -> TracingHandler {
        Self {
            max_verbosity_level,
            events: Default::default(),
        }
    }

    pub(crate) fn set_as_default(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(self.clone())
    }

    /// Returns the recorded events with the given target.
    pub(crate) fn events_for_target(&self, target: &str) -> Vec<TracingEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.target == target)
            .cloned()
            .collect()
    }
}

impl tracing::Subscriber for TracingHandler {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= &self.max_verbosity_level
    }

    fn event(&self, event: &tracing::Event<'_>) {
        let mut test_event = TracingEvent::new(
            *event.metadata().level(),
            event.metadata().target().to_string(),
        );
        event.record(&mut TracingEventVisitor {
            event: &mut test_event,
        });
        self.events.lock().unwrap().push(test_event);
    }

    // No spans are created by this crate.
    fn new_span(&self, _span: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }
    fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}
    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}
    fn enter(&self, _span: &span::Id) {}
    fn exit(&self, _span: &span::Id) {}
}

struct TracingEventVisitor<'a> {
    event: &'a mut TracingEvent,
}

impl TracingEventVisitor<'_> {
    fn insert(&mut self, field: &Field, value: TracingEventValue) {
        self.event.fields.insert(field.name().to_string(), value);
    }
}

impl tracing::field::Visit for TracingEventVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, TracingEventValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, TracingEventValue::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, TracingEventValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, TracingEventValue::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, TracingEventValue::String(format!("{:?}", value)));
    }
}
