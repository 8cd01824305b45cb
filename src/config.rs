//! Runtime configuration for moss-llmd.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically; missing sections and fields fall back to defaults.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::model::catalog::default_models_dir;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "moss-llmd", about = "Local LLM host daemon for the Moss chat app")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Models directory (overrides the config file).
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Model lifecycle settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Chat generation settings.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8173").
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    // Loopback only: the daemon serves the local desktop UI.
    "127.0.0.1:8173".to_string()
}

/// Model lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory scanned for model files.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Context size in tokens for every loaded model.
    #[serde(default = "default_context_size")]
    pub context_size: u32,

    /// Number of GPU layers to offload (-1 = all).
    #[serde(default = "default_n_gpu_layers")]
    pub n_gpu_layers: i32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            context_size: default_context_size(),
            n_gpu_layers: default_n_gpu_layers(),
        }
    }
}

fn default_context_size() -> u32 {
    4096
}

fn default_n_gpu_layers() -> i32 {
    -1
}

/// Chat generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Sampling temperature for prompt calls.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum tokens generated per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields (or the whole file).
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.model.context_size, 4096);
        assert_eq!(cfg.chat.temperature, 0.7);
        assert_eq!(cfg.chat.max_tokens, 2048);
        assert!(cfg.server.listen.starts_with("127.0.0.1"));
    }

    #[test]
    fn test_partial_file_falls_back_per_field() {
        let cfg: Config = serde_json::from_str(r#"{"chat": {"temperature": 0.2}}"#).unwrap();
        assert_eq!(cfg.chat.temperature, 0.2);
        assert_eq!(cfg.chat.max_tokens, 2048);
        assert_eq!(cfg.model.context_size, 4096);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(cfg.model.context_size, 4096);
    }
}
