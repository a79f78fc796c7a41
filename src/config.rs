//! Configuration management for gas-receipt
//!
//! Config file location:
//! - Linux: ~/.config/gas-receipt/config.toml
//! - macOS: ~/Library/Application Support/gas-receipt/config.toml
//! - Windows: %APPDATA%/gas-receipt/config.toml
//!
//! You can override the config location by setting `GAS_RECEIPT_CONFIG_PATH`.
//! Deployment secrets (LubeLogger URL, vision API key, Auth0 settings) are
//! usually injected through environment variables, which win over the file.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::theme::Theme;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Submission API listener
    #[serde(default)]
    pub server: ServerConfig,

    /// LubeLogger instance receiving the gas records
    #[serde(default)]
    pub lubelogger: LubeLoggerConfig,

    /// Vision model used to read receipts and odometers
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Bearer token verification
    #[serde(default)]
    pub auth: AuthConfig,

    /// Form client talking to a running submission API
    #[serde(default)]
    pub client: ClientConfig,

    /// Terminal presentation
    #[serde(default)]
    pub ui: UiConfig,
}

impl Config {
    /// Load configuration from file (or defaults) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from file only, without environment overrides.
    ///
    /// Used when the config is about to be written back, so that secrets from
    /// the environment never end up persisted.
    pub fn load_file() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, toml)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("GAS_RECEIPT_CONFIG_PATH") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs = ProjectDirs::from("com", "gas-receipt", "gas-receipt")
            .context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    fn apply_env(&mut self) {
        if let Some(url) = env_string("LUBELOGGER_URL") {
            self.lubelogger.base_url = Some(url);
        }
        if let Some(key) = env_string("GEMINI_API_KEY") {
            self.extraction.api_key = Some(key);
        }
        if let Some(url) = env_string("GEMINI_API_URL") {
            self.extraction.api_base_url = url;
        }
        if let Some(domain) = env_string("AUTH0_DOMAIN") {
            self.auth.domain = Some(domain);
        }
        if let Some(audience) = env_string("AUTH0_API_AUDIENCE") {
            self.auth.audience = Some(audience);
        }
        if let Some(issuer) = env_string("AUTH0_ISSUER") {
            self.auth.issuer = Some(issuer);
        }
        if let Some(algorithms) = env_string("AUTH0_ALGORITHMS") {
            self.auth.algorithms = algorithms
                .split(',')
                .map(str::trim)
                .filter(|alg| !alg.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = env_string("GAS_RECEIPT_API_URL") {
            self.client.backend_url = url;
        }
        if let Some(token) = env_string("GAS_RECEIPT_TOKEN") {
            self.client.access_token = Some(token);
        }
        if let Some(port) = env_string("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Submission API listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted multipart body, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// CORS origins; `*` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_mb() -> usize {
    25
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// LubeLogger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LubeLoggerConfig {
    /// LubeLogger base URL (no trailing `/api`)
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Timeout for the health probe in seconds
    #[serde(default = "default_health_timeout")]
    pub health_timeout_seconds: u64,

    /// Retry attempts for idempotent reads
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LubeLoggerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: default_timeout(),
            health_timeout_seconds: default_health_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    2
}

/// Vision model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Generative Language API base URL
    #[serde(default = "default_gemini_url")]
    pub api_base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (normally from `GEMINI_API_KEY`)
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_extraction_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_url(),
            model: default_model(),
            api_key: None,
            timeout_seconds: default_extraction_timeout(),
        }
    }
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

fn default_extraction_timeout() -> u64 {
    60
}

/// Auth0 bearer token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Tenant domain, e.g. `example.us.auth0.com`
    pub domain: Option<String>,

    /// API audience tokens must be issued for
    pub audience: Option<String>,

    /// Expected issuer; defaults to `https://{domain}/`
    pub issuer: Option<String>,

    /// JWKS location; defaults to `https://{domain}/.well-known/jwks.json`
    pub jwks_url: Option<String>,

    /// Accepted signing algorithms
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: None,
            audience: None,
            issuer: None,
            jwks_url: None,
            algorithms: default_algorithms(),
        }
    }
}

impl AuthConfig {
    /// Verification is only switched on when both domain and audience are known.
    pub fn is_enabled(&self) -> bool {
        self.domain.is_some() && self.audience.is_some()
    }

    pub fn effective_issuer(&self) -> Option<String> {
        self.issuer
            .clone()
            .or_else(|| self.domain.as_ref().map(|d| format!("https://{}/", d.trim_end_matches('/'))))
    }

    pub fn effective_jwks_url(&self) -> Option<String> {
        self.jwks_url.clone().or_else(|| {
            self.domain
                .as_ref()
                .map(|d| format!("https://{}/.well-known/jwks.json", d.trim_end_matches('/')))
        })
    }
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

/// Form client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Submission API base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Bearer token sent with every request
    pub access_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Name recorded in the gas record notes
    pub user_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            access_token: None,
            timeout_seconds: default_timeout(),
            user_name: None,
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

/// Terminal presentation preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub theme: Theme,
}

/// Get configuration file path for display purposes
pub fn get_config_path() -> Result<String> {
    let path = Config::config_path()?;
    Ok(path.display().to_string())
}
