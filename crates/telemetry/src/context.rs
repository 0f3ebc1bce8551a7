//! Per-request active-span stack.
//!
//! Every request owns one [`SpanContext`]. Spans started through [`in_span`]
//! become children of whatever span is on top of that request's stack, so
//! nesting (tool call inside model call inside handler call inside handoff)
//! is tracked without any process-wide state. Concurrent requests each hold
//! their own stack and can never observe each other's spans.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex},
};

use crate::{
    span::{Attributes, Span, StatusCode},
    tracer::Tracer,
};

/// LIFO stack of the spans active within one request.
#[derive(Default)]
pub struct SpanContext {
    stack: Mutex<Vec<Arc<dyn Span>>>,
}

impl SpanContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The innermost active span, if any.
    pub fn active(&self) -> Option<Arc<dyn Span>> {
        self.stack
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Push `span` as the active span until the returned guard drops.
    ///
    /// Dropping the guard restores the previous active span and ends `span`,
    /// whether the scope finished normally, returned an error, or the
    /// enclosing future was dropped mid-flight.
    pub fn enter(&self, span: Arc<dyn Span>) -> SpanGuard<'_> {
        let mut stack = self.stack.lock().unwrap_or_else(|e| e.into_inner());
        let depth = stack.len();
        stack.push(Arc::clone(&span));
        SpanGuard {
            context: self,
            depth,
            span,
        }
    }
}

impl fmt::Debug for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanContext")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Restores the previous active span on drop.
#[must_use = "the span is popped as soon as the guard is dropped"]
pub struct SpanGuard<'a> {
    context: &'a SpanContext,
    depth: usize,
    span: Arc<dyn Span>,
}

impl SpanGuard<'_> {
    pub fn span(&self) -> &Arc<dyn Span> {
        &self.span
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.context
            .stack
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .truncate(self.depth);
        self.span.end();
    }
}

/// Run `operation` inside a new child span of the context's active span.
///
/// On success the span status is set to ok; on failure the error is recorded
/// on the span (exception event + error status) and returned unchanged.
pub async fn in_span<T, E, F, Fut>(
    tracer: &dyn Tracer,
    context: &SpanContext,
    name: &str,
    attributes: Attributes,
    operation: F,
) -> Result<T, E>
where
    E: fmt::Display,
    F: FnOnce(Arc<dyn Span>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let parent = context.active();
    let span = tracer.start_span(name, parent.as_ref().map(|p| p.ids()), attributes);
    let guard = context.enter(Arc::clone(&span));

    let result = operation(Arc::clone(&span)).await;
    match &result {
        Ok(_) => span.set_status(StatusCode::Ok, None),
        Err(e) => span.record_error(e),
    }

    drop(guard);
    result
}
