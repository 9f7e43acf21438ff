//! # Invoker
//!
//! The unit every stage calls through: one service call wrapped with the
//! response cache and the retry state machine.
//!
//! A cache hit is free from the caller's point of view (`0/0` tokens, no
//! service call). A miss attributes its full token cost to the caller.

pub mod retry;

use crate::cache::{KeyParts, ResponseCache};
use crate::config::PipelineConfig;
use crate::llm::{Message, ServiceError, ServiceRequest, TextService};
use crate::models::AgentRole;
use retry::{AttemptOutcome, RetryPolicy, Sleeper, TokioSleeper};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a single invocation produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl InvocationResult {
    pub fn is_free(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// Identity and request settings of the agent making a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    /// Caller identity; part of every cache key and the ledger key
    pub name: String,
    pub role: AgentRole,
    /// Role description placed at the top of every request
    pub role_prompt: String,
    pub model: String,
    pub max_tokens: u32,
}

impl AgentHandle {
    /// Build a handle with the model and budget configured for `role`
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        role_prompt: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        let role_config = config.role(role);
        Self {
            name: name.into(),
            role,
            role_prompt: role_prompt.into(),
            model: role_config.model.model.clone(),
            max_tokens: role_config.max_tokens,
        }
    }

    /// Role, then optional context, then the task, separated by blank lines
    pub fn build_prompt(&self, prompt: &str, context: &str) -> String {
        let mut parts = vec![self.role_prompt.clone()];
        if !context.is_empty() {
            parts.push(format!("\nContext:\n{}", context));
        }
        parts.push(format!("\nTask:\n{}", prompt));
        parts.join("\n\n")
    }
}

#[derive(Clone)]
pub struct Invoker {
    service: Arc<dyn TextService>,
    cache: Option<Arc<ResponseCache>>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Invoker {
    pub fn new(service: Arc<dyn TextService>, retry: RetryPolicy) -> Self {
        Self {
            service,
            cache: None,
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Invoker configured from the pipeline settings
    pub fn from_config(
        service: Arc<dyn TextService>,
        cache: Option<Arc<ResponseCache>>,
        config: &PipelineConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.max_retries, config.retry_delay());
        let invoker = Self::new(service, retry);
        if config.enable_caching {
            if let Some(cache) = cache {
                return invoker.with_cache(cache);
            }
        }
        invoker
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// Invoke `agent` with `prompt` and optional `context`.
    ///
    /// With `use_cache` set (and a cache attached) the response is looked
    /// up first and written back after a successful call.
    pub async fn invoke(
        &self,
        agent: &AgentHandle,
        prompt: &str,
        context: &str,
        use_cache: bool,
    ) -> Result<InvocationResult, ServiceError> {
        let cache = self.cache.as_ref().filter(|_| use_cache);
        let key = KeyParts::for_call(&agent.name, prompt, context);

        if let Some(cache) = cache {
            if let Some(hit) = cache
                .get(&key)
                .and_then(|v| serde_json::from_value::<InvocationResult>(v).ok())
            {
                tracing::info!("{}: Using cached response", agent.name);
                return Ok(InvocationResult {
                    text: hit.text,
                    input_tokens: 0,
                    output_tokens: 0,
                });
            }
        }

        let request = ServiceRequest {
            model: agent.model.clone(),
            max_tokens: agent.max_tokens,
            messages: vec![Message::user(agent.build_prompt(prompt, context))],
        };

        let response = self
            .retry
            .run(&agent.name, self.sleeper.as_ref(), |_| async {
                AttemptOutcome::from(self.service.complete(&request).await)
            })
            .await?;

        tracing::debug!(
            "{}: Tokens - Input: {}, Output: {}",
            agent.name,
            response.usage.input_tokens,
            response.usage.output_tokens
        );

        let result = InvocationResult {
            text: response.content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };

        if let Some(cache) = cache {
            match serde_json::to_value(&result) {
                Ok(payload) => cache.set(payload, &key),
                Err(e) => tracing::warn!("{}: Failed to encode cache payload: {}", agent.name, e),
            }
        }

        Ok(result)
    }
}
