//! # Scrivener Models
//!
//! Centralized LLM configuration types for the Scrivener pipeline:
//! provider selection, per-role model configuration and the static
//! price table used by the usage ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model used when a role has no explicit model and as the pricing fallback.
pub const DEFAULT_PRICING_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Supported LLM providers
///
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI-compatible chat completions - same key, optional base URL
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
}

impl LlmProvider {
    /// Display name for console output
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
        }
    }

    /// Parse the value of `LLM_PROVIDER`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAI),
            _ => None,
        }
    }

    /// Default API root for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Configuration for LLM model selection
///
/// ## Example
/// ```rust,ignore
/// use scrivener_core::models::{ModelConfig, LlmProvider};
///
/// let config = ModelConfig::new("claude-haiku-4-5-20250929");
/// let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o")
///     .with_base_url("http://localhost:8000");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "claude-sonnet-4-5-20250929")
    pub model: String,
    /// Optional base URL override
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PRICING_MODEL)
    }
}

impl ModelConfig {
    /// Create a new model config with default provider (Anthropic)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: model.into(),
            base_url: None,
        }
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL to call, falling back to the provider default
    pub fn endpoint_root(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }
}

/// Pipeline role a stage worker plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Document locator (phase 1)
    Lead,
    /// Per-company analyst (phase 2)
    Analyst,
    /// Report synthesizer (phase 3)
    Synthesis,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Lead => "lead",
            AgentRole::Analyst => "sub",
            AgentRole::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price per million tokens, in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

const PRICE_TABLE: &[(&str, Pricing)] = &[
    (
        "claude-opus-4-5-20251101",
        Pricing {
            input_per_million: 15.00,
            output_per_million: 75.00,
        },
    ),
    (
        "claude-sonnet-4-5-20250929",
        Pricing {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
    ),
    (
        "claude-haiku-4-5-20250929",
        Pricing {
            input_per_million: 0.80,
            output_per_million: 4.00,
        },
    ),
];

/// Look up the published price for a model id
pub fn price_for(model: &str) -> Option<Pricing> {
    PRICE_TABLE
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, pricing)| *pricing)
}
