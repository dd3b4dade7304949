//! Typed configuration structures
//!
//! Provides strongly-typed access to configuration values with default values.
//! Every section is optional in the file; missing keys take their defaults.

use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::media::{DEFAULT_BASE_URL, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MODEL, DEFAULT_VIDEO_MIME_TYPE};

/// Default port for the HTTP server.
pub const DEFAULT_PORT: u16 = 8787;

/// Default bind host for the HTTP server.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Inference provider configuration
    pub provider: ProviderConfig,

    /// Upload handling configuration
    pub media: MediaConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Inference provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API; requests go to `{baseUrl}/chat/completions`
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Bearer token for the provider. Usually supplied via `REELSIGHT_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Overall request deadline in seconds; unset means no deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            request_timeout_secs: None,
        }
    }
}

impl ProviderConfig {
    /// Whether a non-blank API key is present.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaConfig {
    /// Uploads at or above this many bytes are rejected
    pub max_upload_bytes: u64,

    /// MIME type assumed for uploads without a declared content type
    pub default_mime_type: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            default_mime_type: DEFAULT_VIDEO_MIME_TYPE.to_string(),
        }
    }
}
