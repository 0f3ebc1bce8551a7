//! The reserved `handoff_to_agent` tool.
//!
//! Calling it never transfers anything by itself: it validates the target and
//! returns a [`HandoffDirective`] value, which the orchestrator surfaces on
//! the response and the message pipeline's handoff loop acts on.

use std::sync::{Arc, Weak};

use {
    anyhow::{Result, anyhow, bail},
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::{Map, Value, json},
    switchyard_common::{HANDOFF_TOOL_ID, HandlerRegistry, HandoffDirective},
    tracing::info,
};

use crate::tool_registry::AgentTool;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandoffArgs {
    agent_id: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    context: Option<Map<String, Value>>,
}

pub struct HandoffTool {
    /// Weak so agents holding this tool do not keep their own registry alive.
    handlers: Weak<dyn HandlerRegistry>,
}

impl HandoffTool {
    pub fn new(handlers: &Arc<dyn HandlerRegistry>) -> Self {
        Self {
            handlers: Arc::downgrade(handlers),
        }
    }
}

#[async_trait]
impl AgentTool for HandoffTool {
    fn name(&self) -> &str {
        HANDOFF_TOOL_ID
    }

    fn description(&self) -> &str {
        "Transfer the conversation to another agent. Use this when the current agent cannot handle the request and another agent would be better suited."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agentId": {
                    "type": "string",
                    "description": "The ID of the agent to transfer the conversation to",
                },
                "message": {
                    "type": "string",
                    "description": "The message to send to the target agent. If not provided, the original user message will be used.",
                },
                "context": {
                    "type": "object",
                    "description": "Optional context to pass to the target agent",
                },
            },
            "required": ["agentId"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let args: HandoffArgs = serde_json::from_value(params)
            .map_err(|e| anyhow!("invalid handoff arguments: {e}"))?;
        if args.agent_id.trim().is_empty() {
            bail!("agentId must not be empty");
        }

        let handlers = self
            .handlers
            .upgrade()
            .ok_or_else(|| anyhow!("handler registry is no longer available"))?;
        if handlers.get_handler(&args.agent_id).is_none() {
            let mut available = handlers.handler_ids();
            available.sort();
            let available = if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            };
            bail!(
                "Agent \"{}\" not found. Available agents: {available}",
                args.agent_id
            );
        }

        info!(target_agent = %args.agent_id, "handoff requested");
        let mut directive =
            HandoffDirective::new(args.agent_id).with_message(args.message.unwrap_or_default());
        directive.context = args.context;
        Ok(directive.to_value())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::collections::HashMap,
        switchyard_common::{
            ChatMessage, HandlerResponse, MessageHandler, RequestContext,
        },
    };

    struct Idle(&'static str);

    #[async_trait]
    impl MessageHandler for Idle {
        fn id(&self) -> &str {
            self.0
        }

        async fn process(
            &self,
            _ctx: &RequestContext,
            _message: &str,
            _history: &[ChatMessage],
        ) -> switchyard_common::Result<HandlerResponse> {
            Ok(HandlerResponse::default())
        }
    }

    struct Fixed(HashMap<&'static str, Arc<dyn MessageHandler>>);

    impl HandlerRegistry for Fixed {
        fn get_handler(&self, id: &str) -> Option<Arc<dyn MessageHandler>> {
            self.0.get(id).cloned()
        }

        fn handler_ids(&self) -> Vec<String> {
            self.0.keys().map(|k| (*k).to_string()).collect()
        }
    }

    fn registry(ids: &[&'static str]) -> Arc<dyn HandlerRegistry> {
        Arc::new(Fixed(
            ids.iter()
                .map(|&id| (id, Arc::new(Idle(id)) as Arc<dyn MessageHandler>))
                .collect(),
        ))
    }

    #[tokio::test]
    async fn returns_directive_with_empty_message_by_default() {
        let handlers = registry(&["billing"]);
        let tool = HandoffTool::new(&handlers);

        let value = tool.execute(json!({"agentId": "billing"})).await.unwrap();

        let directive = HandoffDirective::from_tool_result(&value).unwrap();
        assert_eq!(directive.agent_id, "billing");
        assert!(directive.message.is_empty());
        assert_eq!(value["type"], "handoff");
    }

    #[tokio::test]
    async fn carries_message_and_context() {
        let handlers = registry(&["billing"]);
        let tool = HandoffTool::new(&handlers);
        let value = tool
            .execute(json!({
                "agentId": "billing",
                "message": "customer wants a refund",
                "context": {"orderId": 42},
            }))
            .await
            .unwrap();
        let directive = HandoffDirective::from_tool_result(&value).unwrap();
        assert_eq!(directive.message, "customer wants a refund");
        assert_eq!(directive.context.unwrap()["orderId"], 42);
    }

    #[tokio::test]
    async fn unknown_target_lists_available_agents() {
        let handlers = registry(&["support", "billing"]);
        let tool = HandoffTool::new(&handlers);
        let err = tool.execute(json!({"agentId": "sales"})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Agent \"sales\" not found. Available agents: billing, support"
        );
    }

    #[tokio::test]
    async fn missing_agent_id_is_rejected() {
        let handlers = registry(&[]);
        let tool = HandoffTool::new(&handlers);
        assert!(tool.execute(json!({})).await.is_err());
        assert!(tool.execute(json!({"agentId": " "})).await.is_err());
    }

    #[tokio::test]
    async fn dropped_registry_is_an_error() {
        let handlers = registry(&["billing"]);
        let tool = HandoffTool::new(&handlers);
        drop(handlers);
        let err = tool.execute(json!({"agentId": "billing"})).await.unwrap_err();
        assert!(err.to_string().contains("no longer available"));
    }

    #[test]
    fn schema_requires_agent_id() {
        let handlers = registry(&[]);
        let tool = HandoffTool::new(&handlers);
        assert_eq!(tool.name(), HANDOFF_TOOL_ID);
        assert_eq!(tool.parameters_schema()["required"], json!(["agentId"]));
    }
}
