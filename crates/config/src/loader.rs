use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::SwitchyardConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "switchyard.toml",
    "switchyard.yaml",
    "switchyard.yml",
    "switchyard.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SwitchyardConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Parse already-substituted config text, picking the format from the
/// extension of `path`.
pub fn parse_config(raw: &str, path: &Path) -> Result<SwitchyardConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("cannot infer config format of {}", path.display()))?;

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./switchyard.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/switchyard/switchyard.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SwitchyardConfig::default()` if no config file is found or the
/// one found fails to load.
pub fn discover_and_load() -> SwitchyardConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    SwitchyardConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/switchyard/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchyard").map(|d| d.config_dir().to_path_buf())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_each_supported_format() {
        let dir = tempfile::tempdir().unwrap();
        let toml = write(
            dir.path(),
            "switchyard.toml",
            "[pipeline]\ndefault_agent = \"support\"\n",
        );
        let yaml = write(
            dir.path(),
            "switchyard.yaml",
            "pipeline:\n  default_agent: support\n",
        );
        let json = write(
            dir.path(),
            "switchyard.json",
            r#"{"pipeline": {"default_agent": "support"}}"#,
        );

        for path in [toml, yaml, json] {
            let config = load_config(&path).unwrap();
            assert_eq!(config.pipeline.default_agent.as_deref(), Some("support"));
        }
    }

    #[test]
    fn finds_first_candidate_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_in(dir.path()).is_none());
        write(dir.path(), "switchyard.json", "{}");
        write(dir.path(), "switchyard.toml", "");
        assert_eq!(
            find_in(dir.path()).unwrap().file_name().unwrap(),
            "switchyard.toml"
        );
    }

    #[test]
    fn substitutes_env_fallbacks_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "switchyard.toml",
            "[pipeline]\ndefault_agent = \"${SWITCHYARD_TEST_UNSET_AGENT:-fallback}\"\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.pipeline.default_agent.as_deref(), Some("fallback"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = parse_config("", Path::new("switchyard.ini")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[test]
    fn missing_extension_is_rejected() {
        let err = parse_config("", Path::new("switchyard")).unwrap_err();
        assert!(err.to_string().contains("cannot infer config format"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/switchyard.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/switchyard.toml"));
    }

    #[test]
    fn syntax_errors_surface_as_parse_errors() {
        let err = parse_config("[[[", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
