use {
    anyhow::Result,
    async_trait::async_trait,
    serde_json::{Value, json},
    std::{collections::BTreeMap, sync::Arc},
    switchyard_common::Error,
};

/// Agent-callable tool.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> Result<Value>;
}

/// Registry of tools an agent may call, keyed by tool id.
///
/// Tools are stored as `Arc<dyn AgentTool>` so per-agent subsets can share
/// one instance. Iteration is in id order so schema lists are stable.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> switchyard_common::Result<()> {
        let id = tool.name().to_string();
        self.register_as(id, tool)
    }

    /// Register a tool under an explicit id (a config tool id may differ
    /// from the name the tool reports).
    pub fn register_as(
        &mut self,
        id: impl Into<String>,
        tool: Arc<dyn AgentTool>,
    ) -> switchyard_common::Result<()> {
        let id = id.into();
        if self.tools.contains_key(&id) {
            return Err(Error::duplicate("tool", id));
        }
        self.tools.insert(id, tool);
        Ok(())
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.tools.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|(id, t)| {
                json!({
                    "name": id,
                    "description": t.description(),
                    "parameters": t.parameters_schema(),
                })
            })
            .collect()
    }

    /// Registry holding only the listed tools. Every id must be registered.
    pub fn subset(&self, ids: &[String]) -> switchyard_common::Result<ToolRegistry> {
        let tools = ids
            .iter()
            .map(|id| {
                self.tools
                    .get(id)
                    .map(|tool| (id.clone(), Arc::clone(tool)))
                    .ok_or_else(|| Error::InvalidConfig(format!("unknown tool: {id}")))
            })
            .collect::<switchyard_common::Result<_>>()?;
        Ok(ToolRegistry { tools })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}
