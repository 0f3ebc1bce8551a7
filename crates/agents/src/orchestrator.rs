//! Agent turn execution.
//!
//! One call to [`Agent::process`] runs up to `max_steps` model invocations.
//! Tool calls the model asks for run in order, each wrapped in tool hooks and
//! its own span; a `handoff_to_agent` result ends the turn with a directive
//! instead of a final answer.

use std::sync::Arc;

use {
    anyhow::anyhow,
    async_trait::async_trait,
    serde_json::{Value, json},
    switchyard_common::{
        ChatMessage, Error, HandlerResponse, MessageHandler, RequestContext, Result,
        ToolInvocation,
        hooks::{HookEvent, HookRegistry, HookStage, MergedHookResult},
    },
    switchyard_config::AgentConfig,
    switchyard_telemetry::attributes,
    tracing::{debug, info},
};

use crate::{
    model::{ModelParams, ModelProvider, ModelRequest, ModelResponse, ToolCall},
    tool_registry::ToolRegistry,
};

/// Longest argument rendering attached to tool spans.
const ARGUMENT_SUMMARY_CHARS: usize = 256;

pub struct Agent {
    config: AgentConfig,
    provider: Arc<dyn ModelProvider>,
    tools: ToolRegistry,
    hooks: Option<Arc<HookRegistry>>,
}

impl Agent {
    pub fn new(config: AgentConfig, provider: Arc<dyn ModelProvider>, tools: ToolRegistry) -> Self {
        Self {
            config,
            provider,
            tools,
            hooks: None,
        }
    }

    /// Fire `BeforeToolCalled`/`AfterToolCalled` on this registry.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn params(&self) -> ModelParams {
        ModelParams {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse> {
        let schemas = self.tools.list_schemas();
        let max_steps = self.config.max_steps.max(1);
        let mut working = history.to_vec();
        let mut pending = Some(message.to_string());
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut handoff = None;

        for step in 1..=max_steps {
            let request = ModelRequest {
                system_prompt: self.config.system_message.clone(),
                history: working.clone(),
                message: pending.clone(),
                tools: schemas.clone(),
                params: self.params(),
            };
            let response = self.invoke_model(ctx, &request, step).await?;

            let step_text = response.text.filter(|t| !t.is_empty());
            if let Some(text) = &step_text {
                content.clone_from(text);
            }
            if response.tool_calls.is_empty() {
                break;
            }

            if let Some(message) = pending.take() {
                working.push(ChatMessage::user(message));
            }
            if let Some(text) = step_text {
                working.push(ChatMessage::assistant(text));
            }
            for call in response.tool_calls {
                let invocation = self.invoke_tool(ctx, call).await?;
                working.push(ChatMessage::tool(
                    invocation.tool_id.clone(),
                    invocation.result.to_string(),
                ));
                tool_calls.push(invocation);
            }

            handoff = HandlerResponse::detect_handoff(&tool_calls);
            if let Some(directive) = &handoff {
                info!(handler = %self.config.id, target = %directive.agent_id, "handoff directive returned");
                break;
            }
        }

        Ok(HandlerResponse {
            content,
            tool_calls,
            handoff,
        })
    }

    async fn invoke_model(
        &self,
        ctx: &RequestContext,
        request: &ModelRequest,
        step: usize,
    ) -> Result<ModelResponse> {
        let attrs = attributes([
            ("handler.id", json!(self.config.id)),
            ("model", json!(self.config.model)),
            ("platform", json!(self.provider.name())),
            ("step", json!(step)),
            ("history.length", json!(request.history.len())),
        ]);
        ctx.traced("agent.invoke_model", attrs, |span| async move {
            let response = self.provider.invoke(request).await.map_err(|e| {
                Error::execution(
                    format!("model invocation failed for agent {}", self.config.id),
                    e,
                )
            })?;
            span.set_attributes(attributes([
                ("usage.input_tokens", json!(response.usage.input_tokens)),
                ("usage.output_tokens", json!(response.usage.output_tokens)),
                ("finish_reason", json!(response.finish_reason)),
                ("tool_calls", json!(response.tool_calls.len())),
            ]));
            debug!(
                handler = %self.config.id,
                step,
                tool_calls = response.tool_calls.len(),
                tokens = response.usage.total(),
                "model responded"
            );
            Ok(response)
        })
        .await
    }

    async fn invoke_tool(&self, ctx: &RequestContext, call: ToolCall) -> Result<ToolInvocation> {
        let attrs = attributes([
            ("handler.id", json!(self.config.id)),
            ("tool.id", json!(call.name)),
            ("tool.call_id", json!(call.id)),
            ("tool.arguments", json!(summarize(&call.arguments))),
        ]);
        ctx.traced("agent.tool", attrs, |span| async move {
            let ToolCall {
                name, arguments, ..
            } = call;
            let failed = |source| Error::execution(format!("tool {name} failed"), source);

            let before = self
                .run_hooks(
                    ctx,
                    HookStage::BeforeToolCalled,
                    json!({"handlerId": self.config.id, "toolId": name, "arguments": arguments}),
                )
                .await;
            if before.skip {
                info!(handler = %self.config.id, tool = %name, "tool call skipped by hook");
                span.set_attribute("tool.skipped", Value::Bool(true));
                return Ok(ToolInvocation {
                    result: before.data.unwrap_or_else(|| json!({"skipped": true})),
                    tool_id: name,
                    arguments,
                });
            }
            let arguments = before.data.unwrap_or(arguments);

            let tool = self.tools.get(&name).ok_or_else(|| {
                failed(anyhow!("agent {} has no tool named {name}", self.config.id))
            })?;
            debug!(handler = %self.config.id, tool = %name, "executing tool");
            let result = tool.execute(arguments.clone()).await.map_err(failed)?;

            let after = self
                .run_hooks(
                    ctx,
                    HookStage::AfterToolCalled,
                    json!({
                        "handlerId": self.config.id,
                        "toolId": name,
                        "arguments": arguments,
                        "result": result,
                    }),
                )
                .await;
            let result = after.data.unwrap_or(result);
            span.set_attribute("tool.result_type", json!(value_kind(&result)));

            Ok(ToolInvocation {
                tool_id: name,
                arguments,
                result,
            })
        })
        .await
    }

    async fn run_hooks(&self, ctx: &RequestContext, stage: HookStage, data: Value) -> MergedHookResult {
        match &self.hooks {
            Some(hooks) if hooks.has_handlers(stage) => {
                let event = HookEvent::new(stage, data).with_conversation_id(ctx.conversation_id());
                hooks.execute_and_merge(stage, &event).await
            },
            _ => MergedHookResult::default(),
        }
    }
}

#[async_trait]
impl MessageHandler for Agent {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn process(
        &self,
        ctx: &RequestContext,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse> {
        let attrs = attributes([
            ("handler.id", json!(self.config.id)),
            ("model", json!(self.config.model)),
            ("history.length", json!(history.len())),
        ]);
        ctx.traced("agent.process", attrs, |span| async move {
            let response = self.run(ctx, message, history).await?;
            span.set_attributes(attributes([
                ("tool_calls", json!(response.tool_calls.len())),
                (
                    "handoff.target",
                    json!(response.handoff.as_ref().map(|h| h.agent_id.as_str())),
                ),
            ]));
            Ok(response)
        })
        .await
    }
}

fn summarize(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= ARGUMENT_SUMMARY_CHARS {
        return rendered;
    }
    let mut truncated: String = rendered.chars().take(ARGUMENT_SUMMARY_CHARS).collect();
    truncated.push('…');
    truncated
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
