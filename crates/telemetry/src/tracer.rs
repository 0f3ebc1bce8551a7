//! Tracer trait and the built-in record-only tracer.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::span::{Attributes, RecordedSpan, Span, SpanIds};

/// Default number of spans a [`RecordingTracer`] retains.
const DEFAULT_RETAINED_SPANS: usize = 1024;

/// Creates spans.
///
/// The built-in implementation is [`RecordingTracer`]. An exporter for an
/// external backend implements this trait and returns its own [`Span`] type.
pub trait Tracer: Send + Sync {
    /// Start a span. A `None` parent starts a new trace.
    fn start_span(
        &self,
        name: &str,
        parent: Option<&SpanIds>,
        attributes: Attributes,
    ) -> Arc<dyn Span>;
}

fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Local tracer that keeps the most recent spans in memory.
///
/// Ended spans are also logged at `debug` level through `tracing`.
pub struct RecordingTracer {
    capacity: usize,
    spans: Mutex<VecDeque<Arc<RecordedSpan>>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_SPANS)
    }

    /// Retain at most `capacity` spans; the oldest are dropped first.
    /// A capacity of zero retains nothing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            spans: Mutex::new(VecDeque::new()),
        }
    }

    /// All retained spans in start order.
    pub fn spans(&self) -> Vec<Arc<RecordedSpan>> {
        self.spans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Retained spans that have ended.
    pub fn finished_spans(&self) -> Vec<Arc<RecordedSpan>> {
        self.spans()
            .into_iter()
            .filter(|span| span.is_ended())
            .collect()
    }

    /// Retained spans with the given name.
    pub fn spans_named(&self, name: &str) -> Vec<Arc<RecordedSpan>> {
        self.spans()
            .into_iter()
            .filter(|span| span.name() == name)
            .collect()
    }

    pub fn clear(&self) {
        self.spans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for RecordingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for RecordingTracer {
    fn start_span(
        &self,
        name: &str,
        parent: Option<&SpanIds>,
        attributes: Attributes,
    ) -> Arc<dyn Span> {
        let ids = SpanIds {
            span_id: new_span_id(),
            trace_id: parent.map_or_else(new_trace_id, |p| p.trace_id.clone()),
            parent_span_id: parent.map(|p| p.span_id.clone()),
        };
        let span = Arc::new(RecordedSpan::new(name, ids, attributes));

        if self.capacity > 0 {
            let mut spans = self.spans.lock().unwrap_or_else(|e| e.into_inner());
            if spans.len() >= self.capacity {
                spans.pop_front();
            }
            spans.push_back(Arc::clone(&span));
        }

        span
    }
}
