//! # Text-Generation Service
//!
//! The opaque boundary to the remote model: a request goes in, generated
//! text plus token counts come out, or the call fails either transiently
//! (rate limited) or terminally.

pub mod anthropic;
pub mod openai;

use crate::models::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request sent to the service
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

/// Token counts reported by the service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Failure classes of a service call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Rate limited; retried with backoff
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Anything else; never retried
    #[error("service call failed{}: {message}", status_suffix(.status))]
    Terminal { message: String, status: Option<u16> },
}

impl ServiceError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        ServiceError::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        ServiceError::Terminal {
            message: message.into(),
            status: None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }

    /// Classify a non-success HTTP status
    pub(crate) fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            // 529 is Anthropic's "overloaded"; treated like a rate limit
            429 | 529 => ServiceError::RateLimited {
                message: body,
                retry_after,
            },
            _ => ServiceError::Terminal {
                message: body,
                status: Some(status),
            },
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Terminal {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Anything that can turn a request into generated text
#[async_trait]
pub trait TextService: Send + Sync {
    async fn complete(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError>;
}

/// Create a service client for the configured provider
pub fn create_service(config: &ModelConfig, api_key: &str) -> Arc<dyn TextService> {
    match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicClient::new(config.endpoint_root(), api_key)),
        LlmProvider::OpenAI => Arc::new(OpenAiClient::new(config.endpoint_root(), api_key)),
    }
}

/// Read a `retry-after` header given in whole seconds
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
