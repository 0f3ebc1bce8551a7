use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    switchyard_config::{Severity, SwitchyardConfig, find_config_file, load_config, validate},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Load the explicit config file, or the first one discovered. Returns the
/// path it came from, or `None` when no file exists and defaults are used.
pub fn load(explicit: Option<&Path>) -> Result<(Option<PathBuf>, SwitchyardConfig)> {
    let Some(path) = explicit.map(Path::to_path_buf).or_else(find_config_file) else {
        return Ok((None, SwitchyardConfig::default()));
    };
    let config =
        load_config(&path).with_context(|| format!("failed to load {}", path.display()))?;
    Ok((Some(path), config))
}

pub fn handle_validate(explicit: Option<&Path>) -> Result<()> {
    let (path, config) = load(explicit)?;
    match &path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let result = validate(&config);
    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if !result.diagnostics.is_empty() {
        eprintln!();
    }
    if errors == 0 && warnings == 0 {
        eprintln!(
            "No issues found ({} intents, {} agents, {} tools).",
            config.intents.len(),
            config.agents.len(),
            config.tools.len()
        );
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.yaml");
        std::fs::write(&path, "pipeline:\n  default_agent: support\n").unwrap();

        let (found, config) = load(Some(&path)).unwrap();

        assert_eq!(found.as_deref(), Some(path.as_path()));
        assert_eq!(config.pipeline.default_agent.as_deref(), Some("support"));
    }

    #[test]
    fn unreadable_explicit_path_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
