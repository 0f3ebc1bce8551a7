//! Tracing primitives for the message pipeline.
//!
//! Spans are recorded locally by [`RecordingTracer`] unless an exporter
//! implementing [`Tracer`] is supplied. Active-span tracking is scoped to a
//! [`SpanContext`] owned by each request.

pub mod context;
pub mod span;
pub mod tracer;

pub use {
    context::{SpanContext, SpanGuard, in_span},
    span::{
        Attributes, RecordedSpan, Span, SpanEvent, SpanIds, SpanStatus, StatusCode,
        attributes,
    },
    tracer::{RecordingTracer, Tracer},
};
