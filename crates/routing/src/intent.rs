use std::{fmt, sync::Arc};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value, json},
    switchyard_common::{Error, Result},
    switchyard_config::IntentConfig,
};

/// How an intent's action is dispatched.
///
/// `agent` and `function` are built in; anything else names an extension
/// registered on the router at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Agent,
    Function,
    Extension(String),
}

impl ActionKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "agent" => Self::Agent,
            "function" => Self::Function,
            other => Self::Extension(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Agent => "agent",
            Self::Function => "function",
            Self::Extension(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub target: String,
    pub payload: Map<String, Value>,
}

impl Action {
    /// Build an action, rejecting an empty kind or target.
    pub fn new(kind: &str, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        if kind.trim().is_empty() || target.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "action must have type and target".into(),
            ));
        }
        Ok(Self {
            kind: ActionKind::parse(kind.trim()),
            target,
            payload: Map::new(),
        })
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub id: String,
    /// Literal phrases for the exact stage, patterns for the regex stage.
    pub utterances: Vec<String>,
    pub action: Action,
}

impl Intent {
    pub fn new(id: impl Into<String>, utterances: Vec<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            utterances,
            action,
        }
    }
}

impl TryFrom<&IntentConfig> for Intent {
    type Error = Error;

    fn try_from(config: &IntentConfig) -> Result<Self> {
        if config.id.trim().is_empty() {
            return Err(Error::InvalidConfig("intent must have an id".into()));
        }
        let action = Action::new(&config.action.kind, config.action.target.clone())
            .map_err(|_| {
                Error::InvalidConfig(format!(
                    "intent \"{}\" action must have type and target",
                    config.id
                ))
            })?
            .with_payload(config.action.payload.clone().unwrap_or_default());
        Ok(Self::new(config.id.clone(), config.utterances.clone(), action))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Regex,
    Semantic,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Regex => write!(f, "regex"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// Outcome of matching one message.
#[derive(Debug, Clone)]
pub struct IntentMatch {
    pub intent: Arc<Intent>,
    pub confidence: f32,
    pub utterance: Option<String>,
    pub match_type: MatchType,
}

impl IntentMatch {
    /// JSON summary handed to hooks and returned to callers.
    pub fn summary(&self) -> Value {
        json!({
            "intentId": self.intent.id,
            "confidence": self.confidence,
            "utterance": self.utterance,
            "matchType": self.match_type,
            "action": {
                "type": self.intent.action.kind.as_str(),
                "target": self.intent.action.target,
            },
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, switchyard_common::ErrorKind, switchyard_config::ActionConfig};

    #[test]
    fn kinds_parse_into_closed_set_plus_extensions() {
        assert_eq!(ActionKind::parse("agent"), ActionKind::Agent);
        assert_eq!(ActionKind::parse("function"), ActionKind::Function);
        assert_eq!(
            ActionKind::parse("webhook"),
            ActionKind::Extension("webhook".into())
        );
        assert_eq!(ActionKind::parse("webhook").to_string(), "webhook");
    }

    #[test]
    fn empty_kind_or_target_is_configuration_error() {
        let err = Action::new("", "support").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(Action::new("agent", " ").is_err());
    }

    #[test]
    fn converts_from_config() {
        let config = IntentConfig {
            id: "refund".into(),
            utterances: vec!["refund".into()],
            action: ActionConfig {
                kind: "agent".into(),
                target: "billing".into(),
                payload: serde_json::from_value(json!({"priority": "high"})).unwrap(),
            },
        };
        let intent = Intent::try_from(&config).unwrap();
        assert_eq!(intent.action.kind, ActionKind::Agent);
        assert_eq!(intent.action.payload["priority"], "high");

        let missing = IntentConfig {
            action: ActionConfig::default(),
            ..config
        };
        let err = Intent::try_from(&missing).unwrap_err();
        assert!(err.to_string().contains("refund"));
    }

    #[test]
    fn summary_names_intent_and_action() {
        let intent = Intent::new(
            "greet",
            vec!["hello".into()],
            Action::new("agent", "support").unwrap(),
        );
        let m = IntentMatch {
            intent: Arc::new(intent),
            confidence: 1.0,
            utterance: Some("hello".into()),
            match_type: MatchType::Exact,
        };
        let summary = m.summary();
        assert_eq!(summary["intentId"], "greet");
        assert_eq!(summary["matchType"], "exact");
        assert_eq!(summary["action"]["target"], "support");
    }
}
