use super::{retry_after, ServiceError, ServiceRequest, ServiceResponse, TextService, TokenUsage};
use async_trait::async_trait;
use serde::Deserialize;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: MessagesUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl MessagesResponse {
    fn into_response(self) -> Result<ServiceResponse, ServiceError> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(ServiceError::terminal("response contained no text content"));
        }
        Ok(ServiceResponse {
            content: text,
            usage: TokenUsage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
        })
    }
}

#[async_trait]
impl TextService for AnthropicClient {
    async fn complete(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let resp = self
            .client
            .post(self.url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let wait = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), body, wait));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::terminal(format!("malformed messages response: {e}")))?;
        parsed.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_messages_response() {
        let raw = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "t"},
                {"type": "text", "text": " world"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let response = parsed.into_response().unwrap();
        assert_eq!(response.content, "Hello world");
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 3);
    }

    #[test]
    fn test_empty_content_is_terminal() {
        let raw = r#"{"content": [], "usage": {"input_tokens": 1, "output_tokens": 0}}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert!(!parsed.into_response().unwrap_err().is_transient());
    }

    #[test]
    fn test_url() {
        let client = AnthropicClient::new("https://api.anthropic.com", "k");
        assert_eq!(client.url(), "https://api.anthropic.com/v1/messages");
    }
}
