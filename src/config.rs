//! Runtime configuration for ollama-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every field has a default, so a partial file only needs the knobs it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "ollama-relay", about = "HTTP relay for an Ollama generation server")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream (Ollama) configuration.
    pub upstream: UpstreamConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8000").
    pub listen: String,

    /// Attach a permissive CORS layer to the router.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
            cors_permissive: true,
        }
    }
}

/// Where the inference server lives and how hard to try reaching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Scheme and host, without port (e.g. "http://localhost").
    pub host: String,

    /// Upstream TCP port.
    pub port: u16,

    /// Model used when a request does not name one.
    pub default_model: String,

    /// Total connection attempts per request.
    pub max_retries: u32,

    /// Fixed pause between connection attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// TCP connect timeout per attempt, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".to_string(),
            port: 11434,
            default_model: "ajindal/llama3.1-storm:8b-Q8_0".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
            connect_timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    /// Full URL of the generation endpoint.
    pub fn generate_url(&self) -> String {
        format!(
            "{}:{}/api/generate",
            self.host.trim_end_matches('/'),
            self.port
        )
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "upstream.max_retries must be at least 1".to_string(),
            ));
        }
        if self.upstream.host.trim().is_empty() {
            return Err(ConfigError::Invalid("upstream.host is empty".to_string()));
        }
        if self.upstream.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "upstream.default_model is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.upstream.max_retries, 3);
        assert_eq!(cfg.upstream.retry_delay(), Duration::from_secs(1));
        assert_eq!(cfg.upstream.port, 11434);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_generate_url() {
        let mut cfg = UpstreamConfig::default();
        cfg.host = "http://192.168.68.76/".to_string();
        cfg.port = 11435;
        assert_eq!(cfg.generate_url(), "http://192.168.68.76:11435/api/generate");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"upstream": {{"port": 9999, "default_model": "phi3"}}}}"#).unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.upstream.port, 9999);
        assert_eq!(cfg.upstream.default_model, "phi3");
        assert_eq!(cfg.upstream.host, "http://localhost");
        assert_eq!(cfg.server.listen, "0.0.0.0:8000");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.upstream.max_retries, 3);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"upstream": {{"max_retries": 0}}}}"#).unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
