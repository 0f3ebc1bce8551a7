//! Handler-facing types: history messages, responses, handoff directives, and
//! the traits through which the pipeline reaches live handlers.

use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

use crate::{Result, context::RequestContext};

/// Id of the reserved tool whose result signals a handoff.
pub const HANDOFF_TOOL_ID: &str = "handoff_to_agent";

/// Value of the `type` field in a handoff tool result.
const HANDOFF_RESULT_TYPE: &str = "handoff";

// ── History ─────────────────────────────────────────────────────────────────

/// One entry of conversation history, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    Tool { tool_id: String, content: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    pub fn tool(tool_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_id: tool_id.into(),
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content }
            | Self::Tool { content, .. } => content,
        }
    }
}

// ── Responses ───────────────────────────────────────────────────────────────

/// A tool call made while producing a response, with its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_id: String,
    pub arguments: Value,
    pub result: Value,
}

/// Request to transfer the current turn to another handler.
///
/// Produced only from the result of the [`HANDOFF_TOOL_ID`] tool and consumed
/// by the message pipeline's handoff loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffDirective {
    pub agent_id: String,
    /// Empty means "forward the original user message".
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl HandoffDirective {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            message: String::new(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Parse a tool result that has the directive shape
    /// (`{"type": "handoff", "agentId": .., "message": .., "context": ..}`).
    pub fn from_tool_result(value: &Value) -> Option<Self> {
        if value.get("type").and_then(Value::as_str) != Some(HANDOFF_RESULT_TYPE) {
            return None;
        }
        serde_json::from_value(value.clone())
            .ok()
            .filter(|d: &Self| !d.agent_id.is_empty())
    }

    /// Tool-result form of this directive, including the `type` tag.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            object.insert("type".into(), Value::String(HANDOFF_RESULT_TYPE.into()));
        }
        value
    }

    /// The message to forward, falling back to `original` when empty.
    pub fn forwarded_message<'a>(&'a self, original: &'a str) -> &'a str {
        if self.message.trim().is_empty() {
            original
        } else {
            &self.message
        }
    }
}

/// What a handler returns for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffDirective>,
}

impl HandlerResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Scan tool calls for a [`HANDOFF_TOOL_ID`] result with the directive shape.
    pub fn detect_handoff(tool_calls: &[ToolInvocation]) -> Option<HandoffDirective> {
        tool_calls
            .iter()
            .filter(|tc| tc.tool_id == HANDOFF_TOOL_ID)
            .find_map(|tc| HandoffDirective::from_tool_result(&tc.result))
    }

    pub fn is_handoff(&self) -> bool {
        self.handoff.is_some()
    }
}

// ── Handler traits ──────────────────────────────────────────────────────────

/// Turns a message plus history into a response. Agents implement this.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn id(&self) -> &str;

    async fn process(
        &self,
        ctx: &RequestContext,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<HandlerResponse>;
}

/// Lookup of live handlers by id, supplied by whatever owns their lifecycle.
pub trait HandlerRegistry: Send + Sync {
    fn get_handler(&self, id: &str) -> Option<Arc<dyn MessageHandler>>;

    fn handler_ids(&self) -> Vec<String>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn directive_parses_tool_result_shape() {
        let value = json!({
            "type": "handoff",
            "agentId": "billing",
            "message": "",
            "context": { "plan": "pro" },
        });
        let directive = HandoffDirective::from_tool_result(&value).unwrap();
        assert_eq!(directive.agent_id, "billing");
        assert_eq!(directive.forwarded_message("hello"), "hello");
        assert_eq!(directive.context.unwrap()["plan"], "pro");
    }

    #[test]
    fn directive_rejects_other_shapes() {
        assert!(HandoffDirective::from_tool_result(&json!({"agentId": "b"})).is_none());
        assert!(
            HandoffDirective::from_tool_result(&json!({"type": "other", "agentId": "b"})).is_none()
        );
        assert!(HandoffDirective::from_tool_result(&json!("handoff")).is_none());
        assert!(
            HandoffDirective::from_tool_result(&json!({"type": "handoff", "agentId": ""}))
                .is_none()
        );
    }

    #[test]
    fn directive_serializes_with_type_tag() {
        let value = HandoffDirective::new("b").with_message("hi").to_value();
        assert_eq!(value, json!({"type": "handoff", "agentId": "b", "message": "hi"}));
    }

    #[test]
    fn detect_handoff_ignores_non_reserved_tools() {
        let calls = vec![
            ToolInvocation {
                tool_id: "lookup".into(),
                arguments: json!({}),
                result: json!({"type": "handoff", "agentId": "x"}),
            },
            ToolInvocation {
                tool_id: HANDOFF_TOOL_ID.into(),
                arguments: json!({"agentId": "b"}),
                result: HandoffDirective::new("b").to_value(),
            },
        ];
        let directive = HandlerResponse::detect_handoff(&calls).unwrap();
        assert_eq!(directive.agent_id, "b");
    }

    #[test]
    fn non_empty_message_is_forwarded() {
        let directive = HandoffDirective::new("b").with_message("please refund");
        assert_eq!(directive.forwarded_message("hello"), "please refund");
    }
}
