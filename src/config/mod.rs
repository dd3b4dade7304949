//! Configuration loading
//!
//! Configuration comes from an optional JSON5 file followed by environment
//! overrides. The result is built once at startup and passed explicitly to the
//! components that need it; nothing reads configuration at request time.

pub mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use types::*;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "REELSIGHT_CONFIG_PATH";

/// Environment variable carrying the provider API key.
pub const API_KEY_ENV: &str = "REELSIGHT_API_KEY";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Resolve the config file path.
///
/// `$REELSIGHT_CONFIG_PATH` wins; otherwise `<config dir>/reelsight/config.json5`.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reelsight")
        .join("config.json5")
}

/// Load the file at the default path and apply environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let mut config = load_config_from(&get_config_path())?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    json5::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Apply `REELSIGHT_*` overrides using `lookup` to read variables.
///
/// Blank values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = get(API_KEY_ENV) {
        config.provider.api_key = Some(key.trim().to_string());
    }
    if let Some(model) = get("REELSIGHT_MODEL") {
        config.provider.model = model;
    }
    if let Some(base_url) = get("REELSIGHT_BASE_URL") {
        config.provider.base_url = base_url;
    }
    if let Some(host) = get("REELSIGHT_HOST") {
        config.server.host = host;
    }
    if let Some(port) = get("REELSIGHT_PORT") {
        config.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "REELSIGHT_PORT".to_string(),
            message: format!("\"{port}\" is not a valid port"),
        })?;
    }
    Ok(())
}

/// Reject values the rest of the crate cannot work with.
///
/// A missing API key is not an error here; requests report it instead.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.media.max_upload_bytes == 0 {
        return Err(ConfigError::InvalidValue {
            key: "media.maxUploadBytes".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.provider.model.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "provider.model".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if let Err(e) = url::Url::parse(&config.provider.base_url) {
        return Err(ConfigError::InvalidValue {
            key: "provider.baseUrl".to_string(),
            message: e.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        std::fs::write(
            &path,
            "{ provider: { baseUrl: 'http://localhost:4000/v1', apiKey: 'from-file' } }",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.provider.base_url, "http://localhost:4000/v1");
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        std::fs::write(&path, "{ server: ").unwrap();

        match load_config_from(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert!(p.ends_with("config.json5")),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("REELSIGHT_API_KEY", " sk-env "),
                ("REELSIGHT_MODEL", "env/model"),
                ("REELSIGHT_BASE_URL", "http://127.0.0.1:1234/v1"),
                ("REELSIGHT_HOST", "0.0.0.0"),
                ("REELSIGHT_PORT", "9100"),
            ]),
        )
        .unwrap();

        assert_eq!(config.provider.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.provider.model, "env/model");
        assert_eq!(config.provider.base_url, "http://127.0.0.1:1234/v1");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = Config::default();
        config.provider.api_key = Some("from-file".to_string());
        apply_env_overrides(&mut config, env(&[("REELSIGHT_API_KEY", "  ")])).unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, env(&[("REELSIGHT_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("REELSIGHT_PORT"));
    }

    #[test]
    fn test_validate() {
        assert!(validate(&Config::default()).is_ok());

        let mut config = Config::default();
        config.media.max_upload_bytes = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.provider.model = " ".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.provider.base_url = "not a url".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_api_key_is_valid() {
        let config = Config::default();
        assert!(!config.provider.has_api_key());
        assert!(validate(&config).is_ok());
    }
}
