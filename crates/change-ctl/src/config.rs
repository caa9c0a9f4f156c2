//! Effective configuration for CLI runs: file, then `CHANGE_*` overrides.

use anyhow::{Context, Result};
use change_control::ControlConfig;
use std::path::Path;

/// Load `path` (or built-in defaults), apply environment overrides, and
/// validate the result.
pub fn load(path: Option<&Path>) -> Result<ControlConfig> {
    let mut config = match path {
        Some(path) => ControlConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ControlConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("applying CHANGE_* environment overrides")?;
    config.validate().context("validating config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config.scale.default_step_divisor, 5);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scale]\ndefault_step_divisor = 0").unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("default_step_divisor"));
    }

    #[test]
    fn test_missing_file() {
        let err = load(Some(Path::new("/nonexistent/change.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/change.toml"));
    }
}
