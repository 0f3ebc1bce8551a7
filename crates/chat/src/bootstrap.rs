//! Assemble a [`MessagePipeline`] from a [`SwitchyardConfig`].
//!
//! Config only declares things; the capabilities behind them (model
//! providers, tool implementations, hook handlers, action handlers) are
//! supplied here and matched up by name.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    switchyard_agents::{Agent, AgentRegistry, AgentTool, HandoffTool, ModelProvider, ToolRegistry},
    switchyard_common::{
        Error, HANDOFF_TOOL_ID, HandlerRegistry, Result,
        hooks::{HookHandler, HookRegistry, HookStage},
    },
    switchyard_config::{Severity, SwitchyardConfig, validate},
    switchyard_routing::{ActionHandler, ActionRouter, Intent, IntentMatcher, SemanticMatcher},
    switchyard_telemetry::Tracer,
    tracing::{info, warn},
};

use crate::pipeline::MessagePipeline;

#[derive(Default)]
pub struct Bootstrap {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    tools: Vec<(String, Arc<dyn AgentTool>)>,
    hooks: HookRegistry,
    semantic: Option<Arc<dyn SemanticMatcher>>,
    tracer: Option<Arc<dyn Tracer>>,
    function_handler: Option<Arc<dyn ActionHandler>>,
    extensions: Vec<(String, Arc<dyn ActionHandler>)>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a model provider, matched against each agent's `platform`.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Provide the implementation behind a declared tool id.
    #[must_use]
    pub fn tool(mut self, id: impl Into<String>, tool: Arc<dyn AgentTool>) -> Self {
        self.tools.push((id.into(), tool));
        self
    }

    #[must_use]
    pub fn hook(mut self, stage: HookStage, handler: Arc<dyn HookHandler>) -> Self {
        self.hooks.register(stage, handler);
        self
    }

    /// Register a hook for every stage it subscribes to.
    #[must_use]
    pub fn hook_all(mut self, handler: Arc<dyn HookHandler>) -> Self {
        self.hooks.register_all(handler);
        self
    }

    #[must_use]
    pub fn semantic_matcher(mut self, semantic: Arc<dyn SemanticMatcher>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    #[must_use]
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    #[must_use]
    pub fn function_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.function_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn extension(mut self, kind: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.extensions.push((kind.into(), handler));
        self
    }

    /// Validate `config` and wire everything into a pipeline.
    ///
    /// Fails on any validation error, on an agent whose platform has no
    /// provider, and on an agent tool with no implementation.
    pub fn build(self, config: &SwitchyardConfig) -> Result<MessagePipeline> {
        let report = validate(config);
        for diagnostic in &report.diagnostics {
            if diagnostic.severity == Severity::Warning {
                warn!(%diagnostic, "config warning");
            }
        }
        if report.has_errors() {
            let errors: Vec<String> = report
                .diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .map(ToString::to_string)
                .collect();
            return Err(Error::InvalidConfig(errors.join("; ")));
        }

        let registry = Arc::new(AgentRegistry::new());
        let handlers: Arc<dyn HandlerRegistry> = registry.clone();

        let mut tools = ToolRegistry::new();
        for (id, tool) in self.tools {
            tools.register_as(id, tool)?;
        }
        tools.register_as(HANDOFF_TOOL_ID, Arc::new(HandoffTool::new(&handlers)))?;
        for declared in &config.tools {
            if tools.get(&declared.id).is_none() {
                warn!(tool = %declared.id, "declared tool has no implementation");
            }
        }

        let dry_run = self.hooks.dry_run || config.hooks.dry_run;
        let hooks = Arc::new(self.hooks.with_dry_run(dry_run));

        for agent in &config.agents {
            let provider = self.providers.get(&agent.platform).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "agent {}: no model provider for platform {}",
                    agent.id, agent.platform
                ))
            })?;
            if let Some(missing) = agent.tools.iter().find(|id| tools.get(id).is_none()) {
                return Err(Error::InvalidConfig(format!(
                    "agent {}: tool {missing} has no implementation",
                    agent.id
                )));
            }
            let agent_tools = tools.subset(&agent.tools)?;
            let handler = Agent::new(agent.clone(), Arc::clone(provider), agent_tools)
                .with_hooks(Arc::clone(&hooks));
            registry.register(Arc::new(handler))?;
        }

        let intents = config
            .intents
            .iter()
            .map(Intent::try_from)
            .collect::<Result<Vec<_>>>()?;
        let matcher = Arc::new(IntentMatcher::new());
        matcher.register_intents(intents)?;

        let mut router = ActionRouter::new(handlers);
        if let Some(id) = &config.pipeline.default_agent {
            router.set_default_agent(id.clone());
        }
        if let Some(handler) = self.function_handler {
            router.set_function_handler(handler);
        }
        for (kind, handler) in self.extensions {
            router.register_extension(kind, handler)?;
        }

        let mut builder = MessagePipeline::builder(router)
            .matcher(matcher)
            .hooks(hooks)
            .max_handoffs(config.pipeline.max_handoffs);
        if let Some(secs) = config.pipeline.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(semantic) = self.semantic {
            builder = builder.semantic_matcher(semantic);
        }
        if let Some(tracer) = self.tracer {
            builder = builder.tracer(tracer);
        }

        info!(
            agents = config.agents.len(),
            intents = config.intents.len(),
            default_agent = ?config.pipeline.default_agent,
            "pipeline ready"
        );
        Ok(builder.build())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::PipelineRequest,
        async_trait::async_trait,
        std::path::Path,
        switchyard_agents::{ModelRequest, ModelResponse},
        switchyard_common::ErrorKind,
        switchyard_config::parse_config,
    };

    struct Canned;

    #[async_trait]
    impl ModelProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn invoke(&self, request: &ModelRequest) -> anyhow::Result<ModelResponse> {
            Ok(ModelResponse::text(format!(
                "[{}] {}",
                request.params.model,
                request.message.as_deref().unwrap_or_default()
            )))
        }
    }

    const CONFIG: &str = r#"
[pipeline]
default_agent = "support"

[[intents]]
id = "greeting"
utterances = ["hello"]
action = { type = "agent", target = "support" }

[[agents]]
id = "support"
system_message = "Be helpful."
platform = "canned"
model = "small"
tools = ["handoff_to_agent"]
"#;

    #[tokio::test]
    async fn builds_runnable_pipeline() {
        let config = parse_config(CONFIG, Path::new("switchyard.toml")).unwrap();
        let pipeline = Bootstrap::new()
            .provider(Arc::new(Canned))
            .build(&config)
            .unwrap();

        assert_eq!(pipeline.router().default_agent(), Some("support"));
        assert_eq!(pipeline.matcher().intents().len(), 1);

        let response = pipeline
            .process(PipelineRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(response.content, "[small] hello");
        assert_eq!(response.handled_by.as_deref(), Some("support"));
    }

    #[test]
    fn missing_provider_is_rejected() {
        let config = parse_config(CONFIG, Path::new("switchyard.toml")).unwrap();
        let err = Bootstrap::new().build(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("no model provider for platform canned"));
    }

    #[test]
    fn validation_errors_fail_the_build() {
        let config = parse_config(
            r#"
[[intents]]
id = "greeting"
utterances = []
action = { type = "agent", target = "support" }
"#,
            Path::new("switchyard.toml"),
        )
        .unwrap();
        let err = Bootstrap::new().build(&config).err().unwrap();
        assert!(err.to_string().contains("intents[0]"));
    }

    #[test]
    fn dry_run_comes_from_config() {
        let mut config = parse_config(CONFIG, Path::new("switchyard.toml")).unwrap();
        config.hooks.dry_run = true;
        let pipeline = Bootstrap::new()
            .provider(Arc::new(Canned))
            .build(&config)
            .unwrap();
        assert!(pipeline.hooks().dry_run);
    }
}
