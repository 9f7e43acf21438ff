//! # Pipeline Configuration
//!
//! `PipelineConfig` is built once at startup (environment, then an optional
//! JSON overlay, then CLI overrides) and handed to the coordinator by
//! reference. Nothing in the core reads the environment after that.

use crate::models::{AgentRole, LlmProvider, ModelConfig, DEFAULT_PRICING_MODEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upper bound accepted for `retry_delay_secs` (one hour)
pub const MAX_RETRY_DELAY_SECS: u64 = 3_600;
/// Upper bound accepted for `cache_ttl_hours` (ten years)
pub const MAX_CACHE_TTL_HOURS: u64 = 87_600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY not found. Please set it in .env file or environment variables.")]
    MissingApiKey,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where cache entries are persisted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// One JSON document per fingerprint in `cache_dir`
    #[default]
    Fs,
    /// Single SQLite database at `cache_dir/cache.db`
    Sqlite,
}

impl CacheBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fs" | "file" | "files" => Some(CacheBackend::Fs),
            "sqlite" => Some(CacheBackend::Sqlite),
            _ => None,
        }
    }
}

/// Model and output budget for one pipeline role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleConfig {
    pub model: ModelConfig,
    pub max_tokens: u32,
}

impl RoleConfig {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: ModelConfig::new(model),
            max_tokens,
        }
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Document locator (phase 1)
    pub lead: RoleConfig,
    /// Per-company analysts (phase 2)
    pub analyst: RoleConfig,
    /// Report synthesizer (phase 3)
    pub synthesis: RoleConfig,
    /// Fallback model id
    pub default_model: String,
    pub enable_caching: bool,
    /// Fan out phase-2 analysts concurrently instead of one at a time
    pub parallel_execution: bool,
    /// Upper bound on in-flight analysts when `parallel_execution` is set
    pub max_concurrent_analyses: usize,
    pub verbose: bool,
    /// Total attempts per service call, including the first
    pub max_retries: u32,
    /// Linear backoff base, in seconds
    pub retry_delay_secs: u64,
    pub cache_ttl_hours: u64,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub cache_backend: CacheBackend,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lead: RoleConfig::new("claude-haiku-4-5-20250929", 2000),
            analyst: RoleConfig::new(DEFAULT_PRICING_MODEL, 3000),
            synthesis: RoleConfig::new(DEFAULT_PRICING_MODEL, 6000),
            default_model: DEFAULT_PRICING_MODEL.to_string(),
            enable_caching: true,
            parallel_execution: false,
            max_concurrent_analyses: 4,
            verbose: true,
            max_retries: 3,
            retry_delay_secs: 2,
            cache_ttl_hours: 24,
            cache_dir: PathBuf::from(".cache"),
            output_dir: PathBuf::from("reports"),
            cache_backend: CacheBackend::Fs,
            api_key: None,
        }
    }
}

impl PipelineConfig {
    /// Load `.env` (if present) and build the config from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()) {
            config.api_key = Some(key);
        }
        if let Some(model) = lookup("DEFAULT_MODEL") {
            config.default_model = model;
        }

        let provider = match lookup("LLM_PROVIDER") {
            Some(raw) => LlmProvider::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: raw.clone(),
            })?,
            None => LlmProvider::default(),
        };
        let base_url = lookup("LLM_BASE_URL");

        let roles = [
            (&mut config.lead, "LEAD_AGENT_MODEL", "MAX_TOKENS_LEAD_AGENT"),
            (&mut config.analyst, "SUB_AGENT_MODEL", "MAX_TOKENS_SUB_AGENT"),
            (&mut config.synthesis, "SYNTHESIS_AGENT_MODEL", "MAX_TOKENS_SYNTHESIS"),
        ];
        for (role, model_key, tokens_key) in roles {
            if let Some(model) = lookup(model_key) {
                role.model.model = model;
            }
            role.model.provider = provider.clone();
            role.model.base_url = base_url.clone();
            if let Some(raw) = lookup(tokens_key) {
                role.max_tokens = parse_number(tokens_key, &raw)?;
            }
        }

        if let Some(raw) = lookup("ENABLE_CACHING") {
            config.enable_caching = parse_flag(&raw);
        }
        if let Some(raw) = lookup("PARALLEL_EXECUTION") {
            config.parallel_execution = parse_flag(&raw);
        }
        if let Some(raw) = lookup("VERBOSE") {
            config.verbose = parse_flag(&raw);
        }
        if let Some(raw) = lookup("MAX_CONCURRENT_ANALYSES") {
            config.max_concurrent_analyses = parse_number("MAX_CONCURRENT_ANALYSES", &raw)?;
        }
        if let Some(raw) = lookup("MAX_RETRIES") {
            config.max_retries = parse_number("MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("RETRY_DELAY") {
            config.retry_delay_secs = parse_number("RETRY_DELAY", &raw)?;
        }
        if let Some(raw) = lookup("CACHE_TTL_HOURS") {
            config.cache_ttl_hours = parse_number("CACHE_TTL_HOURS", &raw)?;
        }
        if let Some(dir) = lookup("CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CACHE_BACKEND") {
            config.cache_backend =
                CacheBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "CACHE_BACKEND".to_string(),
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }

    /// Apply a JSON overlay file on top of this config
    pub fn with_overlay_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: PersistedConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        overlay.apply(&mut self);
        Ok(self)
    }

    /// Fail early when the run cannot possibly reach the service
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingApiKey);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_RETRIES".to_string(),
                value: "0".to_string(),
            });
        }
        if self.retry_delay_secs > MAX_RETRY_DELAY_SECS {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_DELAY".to_string(),
                value: self.retry_delay_secs.to_string(),
            });
        }
        if self.cache_ttl_hours > MAX_CACHE_TTL_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "CACHE_TTL_HOURS".to_string(),
                value: self.cache_ttl_hours.to_string(),
            });
        }
        Ok(())
    }

    /// Ensure cache and output directories exist
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.cache_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Model and token budget for a role
    pub fn role(&self, role: AgentRole) -> &RoleConfig {
        match role {
            AgentRole::Lead => &self.lead,
            AgentRole::Analyst => &self.analyst,
            AgentRole::Synthesis => &self.synthesis,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }
}

fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Persisted overlay; every field is optional and `Some` wins on merge
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyst_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<LlmProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_caching: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_execution: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_analyses: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_backend: Option<CacheBackend>,
}

impl PersistedConfig {
    pub fn merge(&mut self, other: PersistedConfig) {
        if other.lead_model.is_some() {
            self.lead_model = other.lead_model;
        }
        if other.analyst_model.is_some() {
            self.analyst_model = other.analyst_model;
        }
        if other.synthesis_model.is_some() {
            self.synthesis_model = other.synthesis_model;
        }
        if other.provider.is_some() {
            self.provider = other.provider;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.enable_caching.is_some() {
            self.enable_caching = other.enable_caching;
        }
        if other.parallel_execution.is_some() {
            self.parallel_execution = other.parallel_execution;
        }
        if other.max_concurrent_analyses.is_some() {
            self.max_concurrent_analyses = other.max_concurrent_analyses;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.retry_delay_secs.is_some() {
            self.retry_delay_secs = other.retry_delay_secs;
        }
        if other.cache_ttl_hours.is_some() {
            self.cache_ttl_hours = other.cache_ttl_hours;
        }
        if other.cache_backend.is_some() {
            self.cache_backend = other.cache_backend;
        }
    }

    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(model) = &self.lead_model {
            config.lead.model.model = model.clone();
        }
        if let Some(model) = &self.analyst_model {
            config.analyst.model.model = model.clone();
        }
        if let Some(model) = &self.synthesis_model {
            config.synthesis.model.model = model.clone();
        }
        for role in [&mut config.lead, &mut config.analyst, &mut config.synthesis] {
            if let Some(provider) = &self.provider {
                role.model.provider = provider.clone();
            }
            if let Some(url) = &self.base_url {
                role.model.base_url = Some(url.clone());
            }
        }
        if let Some(v) = self.enable_caching {
            config.enable_caching = v;
        }
        if let Some(v) = self.parallel_execution {
            config.parallel_execution = v;
        }
        if let Some(v) = self.max_concurrent_analyses {
            config.max_concurrent_analyses = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.retry_delay_secs {
            config.retry_delay_secs = v;
        }
        if let Some(v) = self.cache_ttl_hours {
            config.cache_ttl_hours = v;
        }
        if let Some(v) = self.cache_backend {
            config.cache_backend = v;
        }
    }
}
