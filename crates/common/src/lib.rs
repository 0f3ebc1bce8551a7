//! Shared types, error definitions, and the hook pipeline used across all switchyard crates.

pub mod context;
pub mod error;
pub mod handler;
pub mod hooks;

pub use {
    context::RequestContext,
    error::{Error, ErrorKind, FromMessage, Result},
    handler::{
        ChatMessage, HANDOFF_TOOL_ID, HandlerRegistry, HandlerResponse, HandoffDirective,
        MessageHandler, ToolInvocation,
    },
};
