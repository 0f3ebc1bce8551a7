//! Per-request execution context.
//!
//! A [`RequestContext`] is created for every inbound message and threaded
//! explicitly through every stage. It carries the request's own span stack,
//! its cancellation token, and an optional deadline.

use std::{future::Future, sync::Arc, time::Duration};

use {
    switchyard_telemetry::{Attributes, RecordingTracer, Span, SpanContext, Tracer, in_span},
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
};

use crate::{Error, Result};

pub struct RequestContext {
    conversation_id: Option<String>,
    tracer: Arc<dyn Tracer>,
    spans: SpanContext,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            conversation_id: None,
            tracer,
            spans: SpanContext::new(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    pub fn spans(&self) -> &SpanContext {
        &self.spans
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the request has already been cancelled or timed out.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Await `fut` unless the request is cancelled or its deadline passes first.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            result = fut => result,
        }
    }

    /// Run `operation` in a child span of the active span, bounded by
    /// [`guard`](Self::guard). Failures (including cancellation) are recorded
    /// on the span before being returned.
    pub async fn traced<T, F, Fut>(&self, name: &str, attributes: Attributes, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Span>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        in_span(self.tracer.as_ref(), &self.spans, name, attributes, |span| {
            self.guard(operation(span))
        })
        .await
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Arc::new(RecordingTracer::with_capacity(0)))
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("conversation_id", &self.conversation_id)
            .field("spans", &self.spans)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, switchyard_telemetry::StatusCode};

    #[tokio::test]
    async fn guard_passes_through_result() {
        let ctx = RequestContext::default();
        let value = ctx.guard(async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn cancelled_request_short_circuits() {
        let cancel = CancellationToken::new();
        let ctx = RequestContext::default().with_cancellation(cancel.clone());
        cancel.cancel();
        let err = ctx
            .guard(async { Ok::<_, Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_work() {
        let cancel = CancellationToken::new();
        let ctx = RequestContext::default().with_cancellation(cancel.clone());
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            ctx.guard(std::future::pending::<Result<()>>()),
            trigger
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn deadline_interrupts_pending_work() {
        let ctx = RequestContext::default().with_timeout(Duration::from_millis(5));
        let result = ctx.guard(std::future::pending::<Result<()>>()).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn traced_records_cancellation_on_span() {
        let tracer = Arc::new(RecordingTracer::new());
        let cancel = CancellationToken::new();
        let ctx = RequestContext::new(tracer.clone()).with_cancellation(cancel.clone());
        cancel.cancel();

        let result: Result<()> = ctx.traced("stage", Attributes::new(), |_| async { Ok(()) }).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        let spans = tracer.spans_named("stage");
        assert_eq!(spans[0].status().code, StatusCode::Error);
        assert_eq!(ctx.spans().depth(), 0);
    }
}
