//! Hook pipeline: ordered handlers per pipeline stage, executed sequentially
//! and merged deterministically.
//!
//! Handlers run strictly in registration order and never concurrently, so the
//! "later wins" and "any skip" merge rules are reproducible. A failing handler
//! is logged and skipped; it can never abort its stage.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::{debug, info, warn},
};

// ── HookStage ───────────────────────────────────────────────────────────────

/// Pipeline checkpoints where hooks may intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookStage {
    BeforeMessageReceived,
    AfterMessageReceived,
    BeforeIntentDetermined,
    AfterIntentDetermined,
    BeforeAgentSelected,
    AfterAgentSelected,
    BeforeToolCalled,
    AfterToolCalled,
    BeforeResponseGenerated,
    AfterResponseGenerated,
    BeforeContextInserted,
    AfterContextInserted,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl HookStage {
    /// All variants, for iteration.
    pub const ALL: &'static [HookStage] = &[
        Self::BeforeMessageReceived,
        Self::AfterMessageReceived,
        Self::BeforeIntentDetermined,
        Self::AfterIntentDetermined,
        Self::BeforeAgentSelected,
        Self::AfterAgentSelected,
        Self::BeforeToolCalled,
        Self::AfterToolCalled,
        Self::BeforeResponseGenerated,
        Self::AfterResponseGenerated,
        Self::BeforeContextInserted,
        Self::AfterContextInserted,
    ];

    pub fn is_before(&self) -> bool {
        matches!(
            self,
            Self::BeforeMessageReceived
                | Self::BeforeIntentDetermined
                | Self::BeforeAgentSelected
                | Self::BeforeToolCalled
                | Self::BeforeResponseGenerated
                | Self::BeforeContextInserted
        )
    }
}

// ── HookEvent ───────────────────────────────────────────────────────────────

/// What a hook handler sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEvent {
    pub stage: HookStage,
    /// Stage-specific payload (message, intent match, tool call, response...).
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl HookEvent {
    pub fn new(stage: HookStage, data: Value) -> Self {
        Self {
            stage,
            data,
            conversation_id: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: Option<&str>) -> Self {
        self.conversation_id = conversation_id.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ── HookResult ──────────────────────────────────────────────────────────────

/// The outcome a hook handler returns. Every field is optional; the default
/// value is "no opinion" and is not collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResult {
    /// Context to inject into the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    /// Replacement for the event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Skip the step this stage guards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl HookResult {
    #[must_use]
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_none()
            && self.data.is_none()
            && self.skip.is_none()
            && self.metadata.is_none()
    }
}

/// Results of one stage folded into a single value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedHookResult {
    pub context: Map<String, Value>,
    pub data: Option<Value>,
    pub skip: bool,
    pub metadata: Map<String, Value>,
}

impl MergedHookResult {
    /// Fold results left to right: context and metadata shallow-merge with
    /// later keys overwriting earlier ones, the last defined data wins, and
    /// skip is the OR of every handler's flag.
    pub fn merge<I>(results: I) -> Self
    where
        I: IntoIterator<Item = HookResult>,
    {
        let mut merged = Self::default();
        for result in results {
            if let Some(context) = result.context {
                merged.context.extend(context);
            }
            if let Some(data) = result.data {
                merged.data = Some(data);
            }
            if result.skip == Some(true) {
                merged.skip = true;
            }
            if let Some(metadata) = result.metadata {
                merged.metadata.extend(metadata);
            }
        }
        merged
    }

    /// Replacement data as a string, if the hooks supplied one.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }
}

// ── HookHandler trait ───────────────────────────────────────────────────────

/// Trait implemented by hook handlers.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// A human-readable name for this handler.
    fn name(&self) -> &str;

    /// Stages this handler subscribes to when registered with
    /// [`HookRegistry::register_all`].
    fn stages(&self) -> &[HookStage] {
        &[]
    }

    /// Handle the event. Errors are logged by the registry and never
    /// propagate past [`HookRegistry::execute`].
    async fn handle(&self, event: &HookEvent) -> Result<HookResult>;
}

/// Adapter that turns a closure into a [`HookHandler`].
pub struct FnHook<F> {
    name: String,
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(&HookEvent) -> Result<HookResult> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> HookHandler for FnHook<F>
where
    F: Fn(&HookEvent) -> Result<HookResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &HookEvent) -> Result<HookResult> {
        (self.func)(event)
    }
}

// ── HookStats ───────────────────────────────────────────────────────────────

/// Per-handler health statistics.
#[derive(Debug, Default)]
pub struct HookStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HookStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> Duration {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            return Duration::ZERO;
        }
        let total = self.total_latency_us.load(Ordering::Relaxed);
        Duration::from_micros(total / calls)
    }
}

// ── Handler entry (with stats) ──────────────────────────────────────────────

struct HandlerEntry {
    handler: Arc<dyn HookHandler>,
    stats: Arc<HookStats>,
}

// ── HookRegistry ────────────────────────────────────────────────────────────

/// Manages registered hook handlers and executes them per stage.
///
/// Registration takes `&mut self` and is meant to happen before traffic
/// starts; the message pipeline holds the finished registry behind an `Arc`
/// and only reads it while requests are in flight.
pub struct HookRegistry {
    handlers: HashMap<HookStage, Vec<HandlerEntry>>,
    /// When true, handlers run and are logged but their results are discarded.
    pub dry_run: bool,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            dry_run: false,
        }
    }

    /// Enable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Append a handler to a stage. Insertion order is execution order and
    /// the same handler may be registered more than once.
    pub fn register(&mut self, stage: HookStage, handler: Arc<dyn HookHandler>) {
        info!(handler = handler.name(), stage = %stage, "hook handler registered");
        self.handlers.entry(stage).or_default().push(HandlerEntry {
            handler,
            stats: Arc::new(HookStats::new()),
        });
    }

    /// Register a handler for every stage listed by [`HookHandler::stages`].
    pub fn register_all(&mut self, handler: Arc<dyn HookHandler>) {
        for &stage in handler.stages() {
            self.register(stage, Arc::clone(&handler));
        }
    }

    /// Remove the first registration of this exact handler instance.
    pub fn unregister(&mut self, stage: HookStage, handler: &Arc<dyn HookHandler>) -> bool {
        let Some(entries) = self.handlers.get_mut(&stage) else {
            return false;
        };
        let Some(index) = entries
            .iter()
            .position(|e| Arc::ptr_eq(&e.handler, handler))
        else {
            return false;
        };
        entries.remove(index);
        if entries.is_empty() {
            self.handlers.remove(&stage);
        }
        true
    }

    pub fn clear(&mut self, stage: HookStage) {
        self.handlers.remove(&stage);
    }

    pub fn clear_all(&mut self) {
        self.handlers.clear();
    }

    /// Returns true if any handlers are registered for the given stage.
    pub fn has_handlers(&self, stage: HookStage) -> bool {
        self.handlers.get(&stage).is_some_and(|v| !v.is_empty())
    }

    pub fn handler_count(&self, stage: HookStage) -> usize {
        self.handlers.get(&stage).map_or(0, Vec::len)
    }

    /// Stages with at least one handler, in pipeline order.
    pub fn stages(&self) -> Vec<HookStage> {
        HookStage::ALL
            .iter()
            .copied()
            .filter(|s| self.has_handlers(*s))
            .collect()
    }

    /// Get stats for a named handler on a stage. Returns None if not found.
    pub fn handler_stats(&self, stage: HookStage, name: &str) -> Option<Arc<HookStats>> {
        self.handlers
            .get(&stage)?
            .iter()
            .find(|e| e.handler.name() == name)
            .map(|e| Arc::clone(&e.stats))
    }

    /// List all registered handler names (deduplicated).
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .values()
            .flatten()
            .map(|e| e.handler.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Run every handler for `stage` in order and collect non-empty results.
    ///
    /// Each handler is awaited before the next one starts. A handler that
    /// returns an error is logged and skipped.
    pub async fn execute(&self, stage: HookStage, event: &HookEvent) -> Vec<HookResult> {
        let handlers = match self.handlers.get(&stage) {
            Some(h) if !h.is_empty() => h,
            _ => return Vec::new(),
        };

        debug!(stage = %stage, count = handlers.len(), "executing hook stage");

        let mut results = Vec::with_capacity(handlers.len());
        for entry in handlers {
            let start = Instant::now();
            let result = entry.handler.handle(event).await;
            let latency = start.elapsed();

            match result {
                Ok(result) if result.is_empty() => {
                    entry.stats.record_success(latency);
                },
                Ok(result) => {
                    entry.stats.record_success(latency);
                    if self.dry_run {
                        info!(handler = entry.handler.name(), stage = %stage, "hook result (dry-run, not applied)");
                    } else {
                        debug!(handler = entry.handler.name(), stage = %stage, "hook returned result");
                        results.push(result);
                    }
                },
                Err(e) => {
                    entry.stats.record_failure(latency);
                    warn!(handler = entry.handler.name(), stage = %stage, error = %e, "hook handler failed");
                },
            }
        }

        results
    }

    /// Execute a stage and fold its results with [`MergedHookResult::merge`].
    pub async fn execute_and_merge(&self, stage: HookStage, event: &HookEvent) -> MergedHookResult {
        MergedHookResult::merge(self.execute(stage, event).await)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
