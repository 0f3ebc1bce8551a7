//! Span model: identity, attributes, events, status and a write-once end time.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use {
    serde_json::{Map, Value},
    time::{Duration, OffsetDateTime},
};

/// Attribute mapping attached to spans and span events.
pub type Attributes = Map<String, Value>;

/// Build an attribute map from key/value pairs.
pub fn attributes<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Attributes {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

// ── Identity ────────────────────────────────────────────────────────────────

/// Identity of a span within a trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanIds {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
}

// ── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanStatus {
    pub code: StatusCode,
    pub message: Option<String>,
}

/// A timestamped point-in-time annotation on a span.
#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: OffsetDateTime,
    pub attributes: Option<Attributes>,
}

// ── Span trait ──────────────────────────────────────────────────────────────

/// A traced operation.
///
/// Implemented by the built-in [`RecordedSpan`] and by exporter adapters that
/// forward to an external tracing backend. All methods take `&self`; spans are
/// shared as `Arc<dyn Span>` between the span stack and the code annotating
/// them.
pub trait Span: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn ids(&self) -> &SpanIds;

    fn set_attribute(&self, key: &str, value: Value);

    fn set_attributes(&self, attributes: Attributes) {
        for (key, value) in attributes {
            self.set_attribute(&key, value);
        }
    }

    fn add_event(&self, name: &str, attributes: Option<Attributes>);

    fn set_status(&self, code: StatusCode, message: Option<String>);

    /// Mark the span finished. Only the first call has an effect.
    fn end(&self);

    fn is_ended(&self) -> bool;

    /// Attach an `exception` event and flip the status to error.
    fn record_error(&self, error: &dyn fmt::Display) {
        let message = error.to_string();
        let mut attributes = Attributes::new();
        attributes.insert("exception.message".into(), Value::String(message.clone()));
        self.add_event("exception", Some(attributes));
        self.set_status(StatusCode::Error, Some(message));
    }
}

// ── RecordedSpan ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SpanState {
    attributes: Attributes,
    events: Vec<SpanEvent>,
    status: SpanStatus,
}

/// In-memory span produced by [`crate::RecordingTracer`].
#[derive(Debug)]
pub struct RecordedSpan {
    name: String,
    ids: SpanIds,
    start: OffsetDateTime,
    end: OnceLock<OffsetDateTime>,
    state: Mutex<SpanState>,
}

impl RecordedSpan {
    pub fn new(name: impl Into<String>, ids: SpanIds, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            ids,
            start: OffsetDateTime::now_utc(),
            end: OnceLock::new(),
            state: Mutex::new(SpanState {
                attributes,
                ..SpanState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SpanState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attributes(&self) -> Attributes {
        self.state().attributes.clone()
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.state().attributes.get(key).cloned()
    }

    pub fn events(&self) -> Vec<SpanEvent> {
        self.state().events.clone()
    }

    pub fn status(&self) -> SpanStatus {
        self.state().status.clone()
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end_time(&self) -> Option<OffsetDateTime> {
        self.end.get().copied()
    }

    /// Elapsed time between start and end, `None` while the span is open.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time().map(|end| end - self.start)
    }
}

impl Span for RecordedSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn ids(&self) -> &SpanIds {
        &self.ids
    }

    fn set_attribute(&self, key: &str, value: Value) {
        self.state().attributes.insert(key.to_string(), value);
    }

    fn add_event(&self, name: &str, attributes: Option<Attributes>) {
        self.state().events.push(SpanEvent {
            name: name.to_string(),
            timestamp: OffsetDateTime::now_utc(),
            attributes,
        });
    }

    fn set_status(&self, code: StatusCode, message: Option<String>) {
        self.state().status = SpanStatus { code, message };
    }

    fn end(&self) {
        if self.end.set(OffsetDateTime::now_utc()).is_err() {
            return;
        }
        let status = self.status();
        tracing::debug!(
            span = %self.name,
            span_id = %self.ids.span_id,
            trace_id = %self.ids.trace_id,
            parent = self.ids.parent_span_id.as_deref().unwrap_or("-"),
            status = %status.code,
            duration_ms = self
                .duration()
                .map(|d| d.whole_milliseconds() as i64)
                .unwrap_or_default(),
            "span ended"
        );
    }

    fn is_ended(&self) -> bool {
        self.end.get().is_some()
    }
}
