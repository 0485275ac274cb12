//! Configuration Management Module
//!
//! File-based configuration with environment variable overrides. A missing
//! file yields the defaults; explicit settings are validated before the
//! service starts.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub advisor: AdvisorSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Counter-store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
    /// When false the service runs on the in-process counter store
    pub enabled: bool,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            enabled: true,
        }
    }
}

/// Reasoning-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorSettings {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// API key; usually injected via `CODEMEND_ADVISOR_API_KEY`
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 60,
        }
    }
}

/// Sandbox resource ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Path to the node binary
    pub node_path: String,
    /// Hard wall-clock limit per run, milliseconds
    pub timeout_ms: u64,
    /// Engine heap ceiling, megabytes
    pub memory_limit_mb: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            node_path: "node".to_string(),
            timeout_ms: 5_000,
            memory_limit_mb: 16,
        }
    }
}

/// Fixed-window rate-limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests permitted per window
    pub limit: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 3,
            window_seconds: 3_600,
        }
    }
}

impl AppConfig {
    /// Load configuration: TOML file (if present), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let parsed: AppConfig = toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?;
                info!("Loaded configuration from {}", path.display());
                parsed
            }
            Some(path) => {
                debug!("Config file {} not found, using defaults", path.display());
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over file settings.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CODEMEND_REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(key) = std::env::var("CODEMEND_ADVISOR_API_KEY") {
            self.advisor.api_key = Some(key);
        }
        if let Ok(base) = std::env::var("CODEMEND_ADVISOR_BASE_URL") {
            self.advisor.base_url = base;
        }
        if let Ok(model) = std::env::var("CODEMEND_ADVISOR_MODEL") {
            self.advisor.model = model;
        }
        if let Ok(node) = std::env::var("CODEMEND_NODE_PATH") {
            self.sandbox.node_path = node;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.rate_limit.limit == 0 {
            return Err(anyhow!("rate_limit.limit must be at least 1"));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(anyhow!("rate_limit.window_seconds must be at least 1"));
        }
        if self.sandbox.timeout_ms == 0 {
            return Err(anyhow!("sandbox.timeout_ms must be at least 1"));
        }
        if self.sandbox.memory_limit_mb == 0 {
            return Err(anyhow!("sandbox.memory_limit_mb must be at least 1"));
        }
        if self.advisor.base_url.is_empty() {
            return Err(anyhow!("advisor.base_url must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.limit, 3);
        assert_eq!(config.rate_limit.window_seconds, 3_600);
        assert_eq!(config.sandbox.timeout_ms, 5_000);
        assert_eq!(config.sandbox.memory_limit_mb, 16);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/codemend.toml"))).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"0.0.0.0\"\nport = 9000\n\n[rate_limit]\nlimit = 10\nwindow_seconds = 60"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limit.limit, 10);
        // Untouched sections keep their defaults
        assert_eq!(config.sandbox.timeout_ms, 5_000);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.limit = 0;
        assert!(config.validate().is_err());
    }
}
