//! Message pipeline: hooks, intent matching, routing and the handoff loop,
//! plus assembly of a pipeline from config.

pub mod bootstrap;
pub mod pipeline;

pub use {
    bootstrap::Bootstrap,
    pipeline::{MessagePipeline, MessagePipelineBuilder, PipelineRequest, PipelineResponse},
};
