use super::{retry_after, ServiceError, ServiceRequest, ServiceResponse, TextService, TokenUsage};
use async_trait::async_trait;
use serde_json::json;

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<ServiceResponse, ServiceError> {
    // Parse choices[0].message.content
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ServiceError::terminal("chat completion response missing content"))?
        .to_string();

    let tokens = |pointer: &str| json.pointer(pointer).and_then(|v| v.as_u64()).unwrap_or(0);

    Ok(ServiceResponse {
        content: text,
        usage: TokenUsage {
            input_tokens: tokens("/usage/prompt_tokens"),
            output_tokens: tokens("/usage/completion_tokens"),
        },
    })
}

#[async_trait]
impl TextService for OpenAiClient {
    async fn complete(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
        });

        let resp = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let wait = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), body, wait));
        }

        let json: serde_json::Value = resp.json().await?;
        parse_completion(&json)
    }
}
