//! The message pipeline.
//!
//! One inbound message runs through a fixed sequence of stages inside a root
//! `pipeline.process` span:
//!
//! 1. receive (`BeforeMessageReceived` / `AfterMessageReceived`)
//! 2. intent matching (`BeforeIntentDetermined` / `AfterIntentDetermined`)
//! 3. handler selection (`BeforeAgentSelected` / `AfterAgentSelected`)
//! 4. context insertion (`BeforeContextInserted` / `AfterContextInserted`)
//! 5. response generation (`BeforeResponseGenerated`)
//! 6. the handoff loop
//! 7. `AfterResponseGenerated`
//!
//! Every stage runs in its own child span and observes the request's
//! cancellation token and deadline.

use std::{sync::Arc, time::Duration};

use {
    serde_json::{Map, Value, json},
    switchyard_common::{
        ChatMessage, Error, HandlerResponse, HandoffDirective, RequestContext, Result,
        ToolInvocation,
        hooks::{HookEvent, HookRegistry, HookStage, MergedHookResult},
    },
    switchyard_config::DEFAULT_MAX_HANDOFFS,
    switchyard_routing::{ActionRouter, IntentMatch, IntentMatcher, SemanticMatcher},
    switchyard_telemetry::{RecordingTracer, Tracer, attributes},
    tracing::{debug, info, warn},
};

// ── Request / response ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub history: Vec<ChatMessage>,
}

impl PipelineRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineResponse {
    pub content: String,
    /// Tool calls from every handler that took part, in execution order.
    pub tool_calls: Vec<ToolInvocation>,
    /// The handler that produced the final content.
    pub handled_by: Option<String>,
    pub intent: Option<IntentMatch>,
    /// Handler ids visited through handoffs, starting with the first handler.
    pub handoff_chain: Vec<String>,
    /// Context inserted into the final handler's history.
    pub context: Map<String, Value>,
    /// A hook skipped the request before any handler produced content.
    pub skipped: bool,
}

/// Where a stage left the request.
enum Flow<T> {
    Continue(T),
    /// Stop with this content.
    Skip(String),
}

/// Per-request state shared by the stages.
struct Turn<'a> {
    ctx: &'a RequestContext,
    conversation_id: Option<&'a str>,
}

/// Outcome of handler selection.
struct Selection {
    /// Set when a hook replaced the handler.
    forced: Option<String>,
    handler_id: Option<String>,
}

// ── Pipeline ────────────────────────────────────────────────────────────────

pub struct MessagePipeline {
    matcher: Arc<IntentMatcher>,
    router: Arc<ActionRouter>,
    hooks: Arc<HookRegistry>,
    semantic: Option<Arc<dyn SemanticMatcher>>,
    tracer: Arc<dyn Tracer>,
    max_handoffs: usize,
    request_timeout: Option<Duration>,
}

impl MessagePipeline {
    pub fn builder(router: ActionRouter) -> MessagePipelineBuilder {
        MessagePipelineBuilder::new(router)
    }

    pub fn matcher(&self) -> &Arc<IntentMatcher> {
        &self.matcher
    }

    pub fn router(&self) -> &Arc<ActionRouter> {
        &self.router
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    pub fn max_handoffs(&self) -> usize {
        self.max_handoffs
    }

    /// Process one message with a fresh [`RequestContext`].
    pub async fn process(&self, request: PipelineRequest) -> Result<PipelineResponse> {
        let mut ctx = RequestContext::new(Arc::clone(&self.tracer));
        if let Some(id) = &request.conversation_id {
            ctx = ctx.with_conversation_id(id.clone());
        }
        if let Some(timeout) = self.request_timeout {
            ctx = ctx.with_timeout(timeout);
        }
        self.process_with_context(&ctx, request).await
    }

    /// Process one message under a caller-built context (for external
    /// cancellation or a custom deadline). The context's conversation id
    /// takes precedence over the request's.
    pub async fn process_with_context(
        &self,
        ctx: &RequestContext,
        request: PipelineRequest,
    ) -> Result<PipelineResponse> {
        let attrs = attributes([
            (
                "conversation.id",
                json!(ctx.conversation_id().or(request.conversation_id.as_deref())),
            ),
            ("message.length", json!(request.message.chars().count())),
            ("history.length", json!(request.history.len())),
        ]);
        ctx.traced("pipeline.process", attrs, |span| async move {
            let response = self.run(ctx, request).await?;
            span.set_attributes(attributes([
                ("handled_by", json!(response.handled_by)),
                ("handoffs", json!(response.handoff_chain.len().saturating_sub(1))),
                ("skipped", json!(response.skipped)),
            ]));
            Ok(response)
        })
        .await
    }

    async fn run(&self, ctx: &RequestContext, request: PipelineRequest) -> Result<PipelineResponse> {
        let PipelineRequest {
            message,
            conversation_id,
            history,
        } = request;
        let turn = Turn {
            ctx,
            conversation_id: ctx.conversation_id().or(conversation_id.as_deref()),
        };
        let mut context = Map::new();

        let message = match self.receive(&turn, message, &mut context).await? {
            Flow::Continue(message) => message,
            Flow::Skip(content) => {
                return Ok(PipelineResponse {
                    content,
                    skipped: true,
                    ..PipelineResponse::default()
                });
            },
        };

        let intent = self.determine_intent(&turn, &message, &mut context).await?;
        let selection = self.select_handler(&turn, intent.as_ref(), &mut context).await?;
        let (mut inserted, turn_history) =
            self.insert_context(&turn, context.clone(), &history).await?;

        let mut response = match self
            .generate(&turn, &selection, intent.as_ref(), &message, &turn_history)
            .await?
        {
            Flow::Continue(response) => response,
            Flow::Skip(content) => {
                return Ok(PipelineResponse {
                    content,
                    handled_by: selection.handler_id,
                    intent,
                    context: inserted,
                    skipped: true,
                    ..PipelineResponse::default()
                });
            },
        };

        let mut handled_by = selection.handler_id;
        let mut chain: Vec<String> = handled_by.iter().cloned().collect();
        let mut tool_calls = std::mem::take(&mut response.tool_calls);
        let mut hops = 0;

        while let Some(directive) = response.handoff.take() {
            hops += 1;
            chain.push(directive.agent_id.clone());
            if hops > self.max_handoffs {
                warn!(limit = self.max_handoffs, chain = %chain.join(" -> "), "handoff limit exceeded");
                return Err(Error::HandoffLimitExceeded {
                    limit: self.max_handoffs,
                    chain,
                });
            }
            if let Some(extra) = &directive.context {
                context.extend(extra.clone());
            }

            let from = handled_by.as_deref().unwrap_or("<none>");
            let (next_context, next_history) =
                self.insert_context(&turn, context.clone(), &history).await?;
            response = self
                .hand_off(&turn, from, &directive, hops, &message, &next_history)
                .await?;
            tool_calls.append(&mut response.tool_calls);
            inserted = next_context;
            handled_by = Some(directive.agent_id);
        }

        let content = self.respond(&turn, response.content).await?;
        Ok(PipelineResponse {
            content,
            tool_calls,
            handled_by,
            intent,
            handoff_chain: chain,
            context: inserted,
            skipped: false,
        })
    }

    // ── Stages ──────────────────────────────────────────────────────────────

    async fn receive(
        &self,
        turn: &Turn<'_>,
        message: String,
        context: &mut Map<String, Value>,
    ) -> Result<Flow<String>> {
        turn.ctx
            .traced("pipeline.receive", Map::new(), |span| async move {
                let before = self
                    .fire(turn, HookStage::BeforeMessageReceived, json!(message))
                    .await?;
                context.extend(before.context.clone());
                if before.skip {
                    info!("message skipped by hook");
                    span.set_attribute("skipped", Value::Bool(true));
                    return Ok(Flow::Skip(before.data_str().unwrap_or_default().to_string()));
                }
                let message = match before.data_str() {
                    Some(replacement) => {
                        debug!("message replaced by hook");
                        replacement.to_string()
                    },
                    None => message,
                };

                let after = self
                    .fire(turn, HookStage::AfterMessageReceived, json!(message))
                    .await?;
                context.extend(after.context);
                Ok(Flow::Continue(message))
            })
            .await
    }

    async fn determine_intent(
        &self,
        turn: &Turn<'_>,
        message: &str,
        context: &mut Map<String, Value>,
    ) -> Result<Option<IntentMatch>> {
        turn.ctx
            .traced("pipeline.match_intent", Map::new(), |span| async move {
                let before = self
                    .fire(turn, HookStage::BeforeIntentDetermined, json!({"message": message}))
                    .await?;
                context.extend(before.context);

                let found = if before.skip {
                    debug!("intent matching skipped by hook");
                    None
                } else {
                    self.matcher
                        .match_intent(message, self.semantic.as_deref())
                        .await?
                };
                match &found {
                    Some(found) => {
                        info!(intent = %found.intent.id, match_type = %found.match_type, "intent determined");
                        span.set_attributes(attributes([
                            ("intent.id", json!(found.intent.id)),
                            ("intent.match_type", json!(found.match_type)),
                            ("intent.confidence", json!(found.confidence)),
                        ]));
                    },
                    None => debug!("no intent matched"),
                }

                let summary = found.as_ref().map_or(Value::Null, IntentMatch::summary);
                let after = self
                    .fire(turn, HookStage::AfterIntentDetermined, summary)
                    .await?;
                context.extend(after.context);
                Ok(found)
            })
            .await
    }

    async fn select_handler(
        &self,
        turn: &Turn<'_>,
        intent: Option<&IntentMatch>,
        context: &mut Map<String, Value>,
    ) -> Result<Selection> {
        turn.ctx
            .traced("pipeline.select_handler", Map::new(), |span| async move {
                let candidate = match intent {
                    Some(found) => self.router.resolve_target(found),
                    None => self.router.default_agent(),
                }
                .map(str::to_string);

                let before = self
                    .fire(turn, HookStage::BeforeAgentSelected, json!(candidate))
                    .await?;
                context.extend(before.context.clone());
                let forced = before
                    .data_str()
                    .filter(|id| !id.is_empty())
                    .map(str::to_string);
                if let Some(id) = &forced {
                    info!(handler = %id, "handler overridden by hook");
                }
                let handler_id = forced.clone().or(candidate);
                span.set_attribute("handler.id", json!(handler_id));

                let after = self
                    .fire(turn, HookStage::AfterAgentSelected, json!(handler_id))
                    .await?;
                context.extend(after.context);
                Ok(Selection { forced, handler_id })
            })
            .await
    }

    /// Prepend `context` to a copy of `history` as a system message. Returns
    /// the context actually inserted (empty when nothing was).
    async fn insert_context(
        &self,
        turn: &Turn<'_>,
        context: Map<String, Value>,
        history: &[ChatMessage],
    ) -> Result<(Map<String, Value>, Vec<ChatMessage>)> {
        if context.is_empty() {
            return Ok((context, history.to_vec()));
        }
        turn.ctx
            .traced("pipeline.insert_context", Map::new(), |span| async move {
                let before = self
                    .fire(turn, HookStage::BeforeContextInserted, Value::Object(context.clone()))
                    .await?;
                if before.skip {
                    debug!("context insertion skipped by hook");
                    span.set_attribute("skipped", Value::Bool(true));
                    return Ok((Map::new(), history.to_vec()));
                }
                let context = match before.data {
                    Some(Value::Object(replacement)) => replacement,
                    _ => context,
                };

                let mut with_context = Vec::with_capacity(history.len() + 1);
                with_context.push(ChatMessage::system(render_context(&context)));
                with_context.extend_from_slice(history);
                span.set_attribute("context.keys", json!(context.len()));

                self.fire(turn, HookStage::AfterContextInserted, Value::Object(context.clone()))
                    .await?;
                Ok((context, with_context))
            })
            .await
    }

    async fn generate(
        &self,
        turn: &Turn<'_>,
        selection: &Selection,
        intent: Option<&IntentMatch>,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<Flow<HandlerResponse>> {
        let attrs = attributes([("handler.id", json!(selection.handler_id))]);
        turn.ctx
            .traced("pipeline.generate_response", attrs, |span| async move {
                let before = self
                    .fire(
                        turn,
                        HookStage::BeforeResponseGenerated,
                        json!({"message": message, "handlerId": selection.handler_id}),
                    )
                    .await?;
                if before.skip {
                    info!("response generation skipped by hook");
                    span.set_attribute("skipped", Value::Bool(true));
                    return Ok(Flow::Skip(before.data_str().unwrap_or_default().to_string()));
                }

                let ctx = turn.ctx;
                let response = match (&selection.forced, intent) {
                    (Some(id), _) => self.router.route_to_handler(ctx, id, message, history).await?,
                    (None, Some(found)) => {
                        self.router.route_intent(ctx, found, message, history).await?
                    },
                    (None, None) => self.router.route_to_default(ctx, message, history).await?,
                };
                span.set_attribute("tool_calls", json!(response.tool_calls.len()));
                Ok(Flow::Continue(response))
            })
            .await
    }

    async fn hand_off(
        &self,
        turn: &Turn<'_>,
        from: &str,
        directive: &HandoffDirective,
        hop: usize,
        original: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse> {
        let attrs = attributes([
            ("handoff.from", json!(from)),
            ("handoff.to", json!(directive.agent_id)),
            ("handoff.hop", json!(hop)),
        ]);
        turn.ctx
            .traced("pipeline.handoff", attrs, |_span| async move {
                info!(from = %from, to = %directive.agent_id, hop, "handing off");
                let message = directive.forwarded_message(original);
                self.router
                    .route_to_handler(turn.ctx, &directive.agent_id, message, history)
                    .await
            })
            .await
    }

    async fn respond(&self, turn: &Turn<'_>, content: String) -> Result<String> {
        turn.ctx
            .traced("pipeline.respond", Map::new(), |_span| async move {
                let after = self
                    .fire(turn, HookStage::AfterResponseGenerated, json!(content))
                    .await?;
                Ok(match after.data_str() {
                    Some(replacement) => replacement.to_string(),
                    None => content,
                })
            })
            .await
    }

    async fn fire(&self, turn: &Turn<'_>, stage: HookStage, data: Value) -> Result<MergedHookResult> {
        if !self.hooks.has_handlers(stage) {
            return Ok(MergedHookResult::default());
        }
        debug!(stage = %stage, "running hooks");
        let event = HookEvent::new(stage, data).with_conversation_id(turn.conversation_id);
        turn.ctx
            .guard(async { Ok(self.hooks.execute_and_merge(stage, &event).await) })
            .await
    }
}

fn render_context(context: &Map<String, Value>) -> String {
    let rendered = serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
    format!("Context:\n{rendered}")
}

// ── Builder ─────────────────────────────────────────────────────────────────

pub struct MessagePipelineBuilder {
    router: ActionRouter,
    matcher: Option<Arc<IntentMatcher>>,
    hooks: Option<Arc<HookRegistry>>,
    semantic: Option<Arc<dyn SemanticMatcher>>,
    tracer: Option<Arc<dyn Tracer>>,
    max_handoffs: usize,
    request_timeout: Option<Duration>,
}

impl MessagePipelineBuilder {
    pub fn new(router: ActionRouter) -> Self {
        Self {
            router,
            matcher: None,
            hooks: None,
            semantic: None,
            tracer: None,
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            request_timeout: None,
        }
    }

    #[must_use]
    pub fn matcher(mut self, matcher: Arc<IntentMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    #[must_use]
    pub fn semantic_matcher(mut self, semantic: Arc<dyn SemanticMatcher>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Defaults to an in-memory [`RecordingTracer`].
    #[must_use]
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    #[must_use]
    pub fn max_handoffs(mut self, max_handoffs: usize) -> Self {
        self.max_handoffs = max_handoffs;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> MessagePipeline {
        MessagePipeline {
            matcher: self.matcher.unwrap_or_default(),
            router: Arc::new(self.router),
            hooks: self.hooks.unwrap_or_default(),
            semantic: self.semantic,
            tracer: self
                .tracer
                .unwrap_or_else(|| Arc::new(RecordingTracer::new())),
            max_handoffs: self.max_handoffs,
            request_timeout: self.request_timeout,
        }
    }
}
