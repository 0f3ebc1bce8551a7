//! Semantic validation of a parsed config.
//!
//! Collects every problem instead of stopping at the first, so `switchyard
//! validate` can report them all at once.

use std::{collections::HashSet, fmt};

use switchyard_common::HANDOFF_TOOL_ID;

use crate::schema::SwitchyardConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing-field", "duplicate-id", "unknown-reference",
    /// "regex", "limits"
    pub category: &'static str,
    /// Path into the config, e.g. "intents[2].action.target"
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{}: {}: {}", self.severity, self.path, self.message)
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn error(&mut self, category: &'static str, path: String, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category,
            path,
            message: message.into(),
        });
    }

    fn warning(&mut self, category: &'static str, path: String, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category,
            path,
            message: message.into(),
        });
    }
}

/// Validate a parsed config.
#[must_use]
pub fn validate(config: &SwitchyardConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_intents(config, &mut result);
    check_agents(config, &mut result);
    check_tools(config, &mut result);
    check_pipeline(config, &mut result);
    result
}

fn check_duplicate<'a>(
    seen: &mut HashSet<&'a str>,
    id: &'a str,
    path: String,
    kind: &str,
    result: &mut ValidationResult,
) {
    if !id.is_empty() && !seen.insert(id) {
        result.error("duplicate-id", path, format!("duplicate {kind} id \"{id}\""));
    }
}

fn check_intents(config: &SwitchyardConfig, result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for (i, intent) in config.intents.iter().enumerate() {
        let path = format!("intents[{i}]");
        if intent.id.is_empty() {
            result.error("missing-field", format!("{path}.id"), "intent must have an id");
        }
        check_duplicate(&mut seen, &intent.id, format!("{path}.id"), "intent", result);

        if intent.utterances.is_empty() {
            result.error(
                "missing-field",
                format!("{path}.utterances"),
                format!("intent \"{}\" must have at least one utterance", intent.id),
            );
        }
        for (j, utterance) in intent.utterances.iter().enumerate() {
            if let Err(e) = regex::RegexBuilder::new(utterance)
                .case_insensitive(true)
                .build()
            {
                result.warning(
                    "regex",
                    format!("{path}.utterances[{j}]"),
                    format!("utterance is not a valid regular expression and only matches exactly: {e}"),
                );
            }
        }

        if intent.action.kind.trim().is_empty() || intent.action.target.trim().is_empty() {
            result.error(
                "missing-field",
                format!("{path}.action"),
                format!("intent \"{}\" action must have type and target", intent.id),
            );
        } else if intent.action.kind == "agent" && config.agent(&intent.action.target).is_none() {
            result.warning(
                "unknown-reference",
                format!("{path}.action.target"),
                format!(
                    "agent \"{}\" is not declared; it must be registered at runtime",
                    intent.action.target
                ),
            );
        }
    }
}

fn check_agents(config: &SwitchyardConfig, result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for (i, agent) in config.agents.iter().enumerate() {
        let path = format!("agents[{i}]");
        if agent.id.is_empty() {
            result.error("missing-field", format!("{path}.id"), "agent must have an id");
        }
        check_duplicate(&mut seen, &agent.id, format!("{path}.id"), "agent", result);

        for (field, value) in [
            ("system_message", &agent.system_message),
            ("platform", &agent.platform),
            ("model", &agent.model),
        ] {
            if value.trim().is_empty() {
                result.error(
                    "missing-field",
                    format!("{path}.{field}"),
                    format!("agent \"{}\" must have a {field}", agent.id),
                );
            }
        }

        for (j, tool) in agent.tools.iter().enumerate() {
            if tool != HANDOFF_TOOL_ID && config.tool(tool).is_none() {
                result.error(
                    "unknown-reference",
                    format!("{path}.tools[{j}]"),
                    format!("agent \"{}\" references undeclared tool \"{tool}\"", agent.id),
                );
            }
        }

        if agent.max_steps == 0 {
            result.error(
                "limits",
                format!("{path}.max_steps"),
                "max_steps must be at least 1",
            );
        }
    }
}

fn check_tools(config: &SwitchyardConfig, result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for (i, tool) in config.tools.iter().enumerate() {
        let path = format!("tools[{i}]");
        if tool.id.is_empty() {
            result.error("missing-field", format!("{path}.id"), "tool must have an id");
        }
        check_duplicate(&mut seen, &tool.id, format!("{path}.id"), "tool", result);
        if tool.description.trim().is_empty() {
            result.error(
                "missing-field",
                format!("{path}.description"),
                format!("tool \"{}\" must have a description", tool.id),
            );
        }
        if tool.parameters.is_null() {
            result.error(
                "missing-field",
                format!("{path}.parameters"),
                format!("tool \"{}\" must have parameters", tool.id),
            );
        }
    }
}

fn check_pipeline(config: &SwitchyardConfig, result: &mut ValidationResult) {
    if let Some(default) = &config.pipeline.default_agent
        && config.agent(default).is_none()
    {
        result.error(
            "unknown-reference",
            "pipeline.default_agent".into(),
            format!("default agent \"{default}\" is not declared"),
        );
    }
    if config.pipeline.max_handoffs == 0 {
        result.warning(
            "limits",
            "pipeline.max_handoffs".into(),
            "max_handoffs = 0 disables handoffs; any handoff request fails",
        );
    }
}
