//! Server settings
//!
//! Layered configuration: built-in defaults, then `settings.json` in the data
//! directory, then environment variables. Validated once at start-up.

use crate::storage::huggingface::default_gguf_aliases;
use crate::storage::{get_data_dir, StorageError};
use crate::types::config::SamplingParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default root scanned for local model folders
pub const DEFAULT_MODEL_DIR: &str = "/mnt/sisplockers/models";

/// DuckDuckGo instant answer API
pub const DEFAULT_SEARCH_URL: &str = "https://api.duckduckgo.com/";

/// Identifiers always offered after the discovered local models, in order
pub const FALLBACK_MODELS: [&str; 4] = [
    "microsoft/DialoGPT-medium",
    "microsoft/DialoGPT-small",
    "gpt2",
    "distilgpt2",
];

const VALID_CONTEXT_SIZES: [u32; 7] = [2048, 4096, 8192, 16384, 32768, 65536, 131072];

/// Configuration values that cannot be repaired by validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid bind address '{0}': {1}")]
    InvalidBindAddr(String, std::net::AddrParseError),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory scanned for local model folders
    pub models_dir: PathBuf,
    /// Where hub downloads are cached
    pub data_dir: PathBuf,
    /// Socket address the HTTP server binds to
    pub bind_addr: String,
    /// Prefix for every route, e.g. "/" or "/user/alice"
    pub base_url: String,
    /// Shared request token; `None` leaves the API open
    pub token: Option<String>,
    /// Search API queried in deep research mode
    pub search_url: String,
    /// Disable to never issue outbound search calls
    pub deep_research_enabled: bool,
    /// Relative document paths are resolved against this directory
    pub documents_root: PathBuf,
    /// Identifiers appended to discovery results
    pub fallback_models: Vec<String>,
    /// Hub identifier -> repository holding its GGUF conversion
    pub hub_aliases: HashMap<String, String>,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Context window size
    pub context_size: u32,
    /// Sampling used when a request leaves a parameter out
    pub default_sampling: SamplingParams,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            data_dir: get_data_dir().unwrap_or_else(|_| PathBuf::from("./.aichat")),
            bind_addr: "127.0.0.1:8890".to_string(),
            base_url: "/".to_string(),
            token: None,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            deep_research_enabled: true,
            documents_root: PathBuf::from("."),
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            hub_aliases: default_gguf_aliases(),
            gpu_layers: 0,
            context_size: 4096,
            default_sampling: SamplingParams::default(),
        }
    }
}

impl ServerConfig {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges.
    pub fn validate(&mut self) {
        self.default_sampling.validate();

        if !VALID_CONTEXT_SIZES.contains(&self.context_size) {
            self.context_size = *VALID_CONTEXT_SIZES
                .iter()
                .min_by_key(|&&size| (size as i64 - self.context_size as i64).abs())
                .unwrap_or(&4096);
        }

        self.base_url = normalize_base_url(&self.base_url);

        if self.token.as_deref().map(str::trim).is_some_and(str::is_empty) {
            self.token = None;
        }

        if self.search_url.trim().is_empty() {
            self.search_url = DEFAULT_SEARCH_URL.to_string();
        }

        if self.fallback_models.is_empty() {
            tracing::warn!("Empty fallback model list, restoring defaults");
            self.fallback_models = FALLBACK_MODELS.iter().map(|m| m.to_string()).collect();
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("MODEL_DIR") {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("AICHAT_BIND") {
            self.bind_addr = addr;
        }
        if let Some(base) = lookup("AICHAT_BASE_URL") {
            self.base_url = base;
        }
        if let Some(token) = lookup("AICHAT_TOKEN") {
            self.token = Some(token);
        }
        if let Some(flag) = lookup("AICHAT_DEEP_RESEARCH") {
            self.deep_research_enabled = !matches!(flag.to_lowercase().as_str(), "0" | "false" | "off");
        }
        if let Some(dir) = lookup("AICHAT_DOCUMENTS_DIR") {
            self.documents_root = PathBuf::from(dir);
        }
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|e| ConfigError::InvalidBindAddr(self.bind_addr.clone(), e))
    }

    /// Join a route path onto the configured base URL.
    pub fn route(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

fn normalize_base_url(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Load configuration from the data directory and the process environment
///
/// Never fails: a missing or corrupted settings file falls back to defaults.
pub fn load_config() -> ServerConfig {
    let path = get_data_dir()
        .map(|dir| dir.join("settings.json"))
        .unwrap_or_else(|_| PathBuf::from("./.aichat/settings.json"));

    let mut config = match load_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            ServerConfig::default()
        }
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate();
    config
}

/// Internal settings loading with error propagation
pub fn load_config_file(path: &Path) -> Result<ServerConfig, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(ServerConfig::default());
    }

    let json = fs::read_to_string(path)?;
    let config: ServerConfig = serde_json::from_str(&json)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(config)
}
