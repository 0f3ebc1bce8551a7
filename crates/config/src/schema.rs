//! Config schema types (intents, agents, tools, pipeline knobs).

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Hop limit applied to the handoff loop when none is configured.
pub const DEFAULT_MAX_HANDOFFS: usize = 5;

/// Model invocations per agent turn when none is configured.
pub const DEFAULT_MAX_STEPS: usize = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub pipeline: PipelineConfig,
    pub hooks: HooksConfig,
    pub intents: Vec<IntentConfig>,
    pub agents: Vec<AgentConfig>,
    pub tools: Vec<ToolConfig>,
}

impl SwitchyardConfig {
    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn tool(&self, id: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.id == id)
    }

    pub fn intent(&self, id: &str) -> Option<&IntentConfig> {
        self.intents.iter().find(|i| i.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Agent that handles messages no intent matched.
    pub default_agent: Option<String>,
    /// Maximum number of handoff hops per request.
    pub max_handoffs: usize,
    /// Per-request deadline. `None` means no deadline.
    pub request_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_agent: None,
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Run hooks but discard their results.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    pub id: String,
    /// Literal phrases for the exact stage; also tried as regular expressions.
    pub utterances: Vec<String>,
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// `agent`, `function`, or the name of a registered extension.
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub id: String,
    pub system_message: String,
    /// Model provider name, e.g. `openai`.
    pub platform: String,
    pub model: String,
    /// Ids of declared tools this agent may call.
    pub tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            system_message: String::new(),
            platform: String::new(),
            model: String::new(),
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Declaration of a tool; its implementation is supplied at bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: Value,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: SwitchyardConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.max_handoffs, DEFAULT_MAX_HANDOFFS);
        assert!(config.pipeline.default_agent.is_none());
        assert!(!config.hooks.dry_run);
        assert!(config.intents.is_empty());
    }

    #[test]
    fn parses_full_toml() {
        let config: SwitchyardConfig = toml::from_str(
            r#"
[pipeline]
default_agent = "support"
max_handoffs = 3

[[intents]]
id = "greet"
utterances = ["hello", "hi there"]
action = { type = "agent", target = "support" }

[[agents]]
id = "support"
system_message = "You help customers."
platform = "openai"
model = "gpt-4o-mini"
tools = ["lookup_order"]
temperature = 0.2

[[tools]]
id = "lookup_order"
name = "lookup_order"
description = "Find an order"
parameters = { type = "object" }
"#,
        )
        .unwrap();

        assert_eq!(config.pipeline.default_agent.as_deref(), Some("support"));
        assert_eq!(config.pipeline.max_handoffs, 3);
        let intent = config.intent("greet").unwrap();
        assert_eq!(intent.action.kind, "agent");
        assert_eq!(intent.utterances.len(), 2);
        let agent = config.agent("support").unwrap();
        assert_eq!(agent.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(agent.temperature, Some(0.2));
        assert_eq!(config.tool("lookup_order").unwrap().parameters["type"], "object");
    }

    #[test]
    fn action_payload_round_trips_through_json() {
        let action: ActionConfig = serde_json::from_value(serde_json::json!({
            "type": "function",
            "target": "refund",
            "payload": { "currency": "EUR" },
        }))
        .unwrap();
        assert_eq!(action.payload.unwrap()["currency"], "EUR");
    }
}
