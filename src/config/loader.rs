//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::env::{apply_env_overrides, ReadEnv};
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the process configuration: optional file, then environment, then validation.
pub fn load<E: ReadEnv>(path: Option<&Path>, env: &E) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, env);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::{MapEnv, ALLOWED_ORIGIN, BACKEND_URL, FORWARD_TIMEOUT_SECS};
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_env_overrides_file() {
        let path = write_temp(
            "proxy-config",
            r#"
            [backend]
            url = "https://file.example"
            "#,
        );
        let env = MapEnv::default().with(BACKEND_URL, "https://env.example");

        let config = load(Some(&path), &env).unwrap();
        assert_eq!(config.backend.url.as_deref(), Some("https://env.example"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_no_file_uses_defaults() {
        let config = load(None, &MapEnv::default()).unwrap();
        assert!(config.backend.url.is_none());
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_file_reports_validation() {
        let path = write_temp(
            "proxy-config-bad",
            r#"
            [timeouts]
            forward_secs = 0
            "#,
        );
        let err = load(Some(&path), &MapEnv::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("timeouts.forward_secs"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load(Some(Path::new("/nonexistent/proxy.toml")), &MapEnv::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_origin_with_trailing_slash_from_env() {
        let env = MapEnv::default().with(ALLOWED_ORIGIN, "https://app.example/");
        let config = load(None, &env).unwrap();
        assert_eq!(config.cors.allowed_origins, vec!["https://app.example".to_string()]);
    }

    #[test]
    fn test_forward_timeout_beyond_request_timeout_rejected() {
        let env = MapEnv::default().with(FORWARD_TIMEOUT_SECS, "85");
        let err = load(None, &env).unwrap_err();
        assert!(err.to_string().contains("timeouts.request_secs"));
    }
}
