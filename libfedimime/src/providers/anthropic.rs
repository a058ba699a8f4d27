//! Anthropic Messages backend
//!
//! `x-api-key` auth plus a pinned `anthropic-version`. The Messages API
//! requires `max_tokens` and has no schema-constrained output mode, so
//! this is the one backend the pipeline downgrades to plain invocation
//! when structured generation is configured.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatRequest, StructuredPost, REQUEST_TIMEOUT};
use crate::error::{ProviderError, Result};

const PROVIDER: &str = "anthropic";
const API_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug)]
pub struct AnthropicChat {
    client: reqwest::Client,
    model: String,
    temperature: f64,
    base_url: String,
}

impl AnthropicChat {
    pub fn new(api_key: String, model: String, temperature: f64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&api_key).map_err(|e| {
            ProviderError::Credentials(format!("anthropic api key is not a valid header: {}", e))
        })?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network {
                provider: PROVIDER.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            model,
            temperature,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub async fn invoke(&self, request: &ChatRequest) -> Result<String> {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": request.user}],
        });
        if let Some(system) = &request.system {
            payload["system"] = json!(system);
        }

        let body = self.post(&payload).await?;
        match body["content"][0]["text"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => Err(ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                message: "completion has no text content".to_string(),
            }
            .into()),
        }
    }

    /// The Messages API cannot constrain output to a schema; callers are
    /// expected to have checked `supports_structured` first.
    pub async fn invoke_structured(&self, _request: &ChatRequest) -> Result<StructuredPost> {
        Err(ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            message: "structured output is not supported".to_string(),
        }
        .into())
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!("Requesting anthropic completion with model {}", self.model);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: PROVIDER.to_string(),
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Network {
            provider: PROVIDER.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;
        debug!("anthropic responded with HTTP {}", status);

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(body);
            return Err(ProviderError::Api {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), message),
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                message: format!("response is not valid JSON: {}", e),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FedimimeError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> AnthropicChat {
        AnthropicChat::new(
            "test-key".to_string(),
            "claude-sonnet-4-20250514".to_string(),
            0.7,
        )
        .unwrap()
        .with_base_url(base_url.to_string())
    }

    fn completion_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
        })
    }

    #[tokio::test]
    async fn test_invoke_sends_required_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("a post")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = client
            .invoke(&ChatRequest::new(None, "corpus"))
            .await
            .unwrap();

        assert_eq!(text, "a post");
    }

    #[tokio::test]
    async fn test_invoke_includes_system_and_max_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "system": "mimic",
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": "corpus"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client
            .invoke(&ChatRequest::new(Some("mimic".to_string()), "corpus"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_carries_message() {
        let server = MockServer::start().await;
        let body = json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"},
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .invoke(&ChatRequest::new(None, "corpus"))
            .await
            .unwrap_err();

        assert!(format!("{}", err).contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_invoke_structured_is_unsupported() {
        let server = MockServer::start().await;
        let client = test_client(&server.uri());

        let err = client
            .invoke_structured(&ChatRequest::new(None, "corpus"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FedimimeError::Provider(ProviderError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .invoke(&ChatRequest::new(None, "corpus"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FedimimeError::Provider(ProviderError::Malformed { .. })
        ));
    }
}
