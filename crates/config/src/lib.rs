//! Configuration loading, validation, and management for Turnstile.
//!
//! Loads configuration from `~/.turnstile/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use turnstile_core::Capabilities;

/// The root configuration structure.
///
/// Maps directly to `~/.turnstile/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature handed to every turn
    #[serde(default)]
    pub temperature: f32,

    /// Explicit max tokens per response. When unset, sonnet-class models
    /// get 64000 and everything else is left to the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Iteration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Admission gate / billing settings
    #[serde(default)]
    pub billing: BillingConfig,

    /// Session store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Credentials that switch optional tools on
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

fn default_model() -> String {
    "anthropic/claude-3-7-sonnet-latest".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard bound on turns per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Auto-continues the executor may perform inside one turn
    #[serde(default = "default_max_auto_continues")]
    pub native_max_auto_continues: u32,

    #[serde(default)]
    pub enable_thinking: bool,

    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,

    #[serde(default = "default_true")]
    pub enable_context_manager: bool,

    /// Forward the environment-observation context message to the executor
    #[serde(default)]
    pub inject_observation: bool,

    /// Ask the executor for streamed output
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_max_iterations() -> u32 {
    150
}
fn default_max_auto_continues() -> u32 {
    25
}
fn default_reasoning_effort() -> String {
    "low".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            native_max_auto_continues: default_max_auto_continues(),
            enable_thinking: false,
            reasoning_effort: default_reasoning_effort(),
            enable_context_manager: true,
            inject_observation: false,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// When false every turn is admitted (local development)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Monthly minutes for the free tier
    #[serde(default = "default_free_minutes")]
    pub free_minutes: f64,

    /// Monthly minutes for the pro tier
    #[serde(default = "default_pro_minutes")]
    pub pro_minutes: f64,

    /// Monthly minutes for the enterprise tier; unset means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_minutes: Option<f64>,
}

fn default_free_minutes() -> f64 {
    60.0
}
fn default_pro_minutes() -> f64 {
    3000.0
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            free_minutes: default_free_minutes(),
            pro_minutes: default_pro_minutes(),
            enterprise_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database path for the sqlite backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Web search provider key (`TAVILY_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,

    /// Data-provider gateway key (`RAPID_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rapid_api_key: Option<String>,

    /// CRM data-provider key (`CREATOR_IQ_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_iq_api_key: Option<String>,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("tavily_api_key", &redact(&self.tavily_api_key))
            .field("rapid_api_key", &redact(&self.rapid_api_key))
            .field("creator_iq_api_key", &redact(&self.creator_iq_api_key))
            .finish()
    }
}

impl CredentialsConfig {
    /// Copy with every key replaced by a placeholder, for display.
    pub fn redacted(&self) -> Self {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "[REDACTED]".to_string());
        Self {
            tavily_api_key: mask(&self.tavily_api_key),
            rapid_api_key: mask(&self.rapid_api_key),
            creator_iq_api_key: mask(&self.creator_iq_api_key),
        }
    }
}

fn present(key: &Option<String>) -> bool {
    key.as_deref().is_some_and(|k| !k.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from the default path (~/.turnstile/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Credentials only fill gaps left by the file; model and iteration
    /// bound always win.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("TURNSTILE_MODEL") {
            self.default_model = model;
        }

        if let Some(raw) = lookup("TURNSTILE_MAX_ITERATIONS") {
            match raw.parse::<u32>() {
                Ok(n) => self.agent.max_iterations = n,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid TURNSTILE_MAX_ITERATIONS"),
            }
        }

        let creds = &mut self.credentials;
        if creds.tavily_api_key.is_none() {
            creds.tavily_api_key = lookup("TAVILY_API_KEY");
        }
        if creds.rapid_api_key.is_none() {
            creds.rapid_api_key = lookup("RAPID_API_KEY");
        }
        if creds.creator_iq_api_key.is_none() {
            creds.creator_iq_api_key = lookup("CREATOR_IQ_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turnstile")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if !matches!(self.agent.reasoning_effort.as_str(), "low" | "medium" | "high") {
            return Err(ConfigError::ValidationError(format!(
                "agent.reasoning_effort must be low, medium or high (got '{}')",
                self.agent.reasoning_effort
            )));
        }

        let limits = [
            Some(self.billing.free_minutes),
            Some(self.billing.pro_minutes),
            self.billing.enterprise_minutes,
        ];
        if limits.into_iter().flatten().any(|m| m < 0.0) {
            return Err(ConfigError::ValidationError(
                "billing tier limits must not be negative".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be memory or sqlite (got '{}')",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Derive the session capabilities from configured credentials.
    ///
    /// Call once per session; the result is threaded through every turn.
    pub fn capabilities(&self) -> Capabilities {
        let creds = &self.credentials;
        let web_search = present(&creds.tavily_api_key);
        if !web_search {
            tracing::warn!("TAVILY_API_KEY not found, web search will not be available");
        }

        let rapid = present(&creds.rapid_api_key);
        let creator_iq = present(&creds.creator_iq_api_key);
        if !rapid {
            tracing::warn!("RAPID_API_KEY not found, data providers will not be available");
        }
        if !creator_iq {
            tracing::warn!("CREATOR_IQ_API_KEY not found, CRM data will not be available");
        }

        Capabilities {
            web_search,
            data_providers: rapid && creator_iq,
        }
    }

    /// Max tokens for `model`: the explicit setting, else 64000 for
    /// sonnet-class models.
    pub fn max_tokens_for(&self, model: &str) -> Option<u32> {
        self.max_tokens.or_else(|| model_max_tokens(model))
    }

    /// This configuration with credentials masked, for printing.
    pub fn redacted(&self) -> Self {
        Self {
            credentials: self.credentials.redacted(),
            ..self.clone()
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// The per-model default for max tokens: 64000 for sonnet-class models.
pub fn model_max_tokens(model: &str) -> Option<u32> {
    model
        .to_lowercase()
        .contains("sonnet")
        .then_some(64_000)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: 0.0,
            max_tokens: None,
            agent: AgentConfig::default(),
            billing: BillingConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
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
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 150);
        assert_eq!(config.agent.native_max_auto_continues, 25);
        assert_eq!(config.agent.reasoning_effort, "low");
        assert!(!config.agent.inject_observation);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_reasoning_effort_rejected() {
        let mut config = AppConfig::default();
        config.agent.reasoning_effort = "extreme".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.max_iterations, 150);
    }

    #[test]
    fn load_from_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "openai/gpt-4o"

[agent]
max_iterations = 12
inject_observation = true

[billing]
enabled = false
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "openai/gpt-4o");
        assert_eq!(config.agent.max_iterations, 12);
        assert!(config.agent.inject_observation);
        assert!(!config.billing.enabled);
        // Untouched sections keep their defaults
        assert_eq!(config.agent.native_max_auto_continues, 25);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_model_iterations_and_keys() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[
            ("TURNSTILE_MODEL", "openai/gpt-4o"),
            ("TURNSTILE_MAX_ITERATIONS", "7"),
            ("TAVILY_API_KEY", "tvly-123"),
        ]));
        assert_eq!(config.default_model, "openai/gpt-4o");
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.credentials.tavily_api_key.as_deref(), Some("tvly-123"));
    }

    #[test]
    fn env_does_not_replace_file_credentials() {
        let mut config = AppConfig::default();
        config.credentials.rapid_api_key = Some("from-file".into());
        config.apply_env_overrides(env(&[("RAPID_API_KEY", "from-env")]));
        assert_eq!(config.credentials.rapid_api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn invalid_iteration_override_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("TURNSTILE_MAX_ITERATIONS", "lots")]));
        assert_eq!(config.agent.max_iterations, 150);
    }

    #[test]
    fn capabilities_follow_credentials() {
        let mut config = AppConfig::default();
        assert_eq!(config.capabilities(), Capabilities::default());

        config.credentials.tavily_api_key = Some("tvly".into());
        config.credentials.rapid_api_key = Some("rapid".into());
        let caps = config.capabilities();
        assert!(caps.web_search);
        assert!(!caps.data_providers, "data providers need both keys");

        config.credentials.creator_iq_api_key = Some("ciq".into());
        assert!(config.capabilities().data_providers);
    }

    #[test]
    fn blank_credentials_do_not_count() {
        let mut config = AppConfig::default();
        config.credentials.tavily_api_key = Some("   ".into());
        assert!(!config.capabilities().web_search);
    }

    #[test]
    fn sonnet_models_get_large_token_budget() {
        let config = AppConfig::default();
        assert_eq!(
            config.max_tokens_for("anthropic/claude-3-7-SONNET-latest"),
            Some(64_000)
        );
        assert_eq!(config.max_tokens_for("openai/gpt-4o"), None);

        let explicit = AppConfig {
            max_tokens: Some(1024),
            ..AppConfig::default()
        };
        assert_eq!(explicit.max_tokens_for("claude-sonnet"), Some(1024));
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let mut config = AppConfig::default();
        config.credentials.tavily_api_key = Some("tvly-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("tvly-secret"));
        assert!(debug.contains("[REDACTED]"));

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("tvly-secret"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_iterations = 150"));
        assert!(toml_str.contains("42618"));
    }
}
