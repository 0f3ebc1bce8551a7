//! Model provider interface.
//!
//! Concrete providers (OpenAI, Groq, local models...) live outside this crate
//! and are handed to agents at bootstrap.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    switchyard_common::ChatMessage,
};

/// Sampling parameters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    /// The new user turn. `None` on follow-up steps, where the turn is
    /// already part of `history`.
    pub message: Option<String>,
    /// Tool schemas (`name`, `description`, `parameters`).
    pub tools: Vec<Value>,
    pub params: ModelParams,
}

impl ModelRequest {
    /// Flatten into one message list: system prompt, history, user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        if let Some(message) = &self.message {
            messages.push(ChatMessage::user(message.clone()));
        }
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            finish_reason: Some("stop".into()),
            ..Self::default()
        }
    }
}

/// Language model capability used by agents.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name, matched against an agent's `platform`.
    fn name(&self) -> &str;

    async fn invoke(&self, request: &ModelRequest) -> anyhow::Result<ModelResponse>;
}
