//! Configuration loading, validation, and env substitution.
//!
//! Config files: `switchyard.toml`, `switchyard.yaml`, or `switchyard.json`
//! Searched in `./` then `~/.config/switchyard/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, parse_config},
    schema::{
        ActionConfig, AgentConfig, DEFAULT_MAX_HANDOFFS, DEFAULT_MAX_STEPS, HooksConfig,
        IntentConfig, PipelineConfig, SwitchyardConfig, ToolConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
