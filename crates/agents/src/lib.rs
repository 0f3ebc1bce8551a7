//! Agent runtime: traced model and tool invocation, the reserved handoff
//! tool, and the live agent registry.

pub mod handoff;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod tool_registry;

pub use {
    handoff::HandoffTool,
    model::{ModelParams, ModelProvider, ModelRequest, ModelResponse, ToolCall, Usage},
    orchestrator::Agent,
    registry::AgentRegistry,
    tool_registry::{AgentTool, ToolRegistry},
};
