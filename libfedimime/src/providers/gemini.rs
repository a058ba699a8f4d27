//! Google Gemini backend
//!
//! REST calls against `generativelanguage.googleapis.com` with the API
//! key in the query string. Gemini is the one backend that can refuse a
//! completion as recitation (`finishReason: "RECITATION"`); that refusal
//! is surfaced as its own error so the pipeline can log it apart from
//! ordinary API failures.

use serde_json::{json, Value};
use tracing::debug;

use super::{parse_structured, ChatRequest, StructuredPost, REQUEST_TIMEOUT};
use crate::error::{ProviderError, Result};

const PROVIDER: &str = "gemini";
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug)]
pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f64,
    base_url: String,
}

impl GeminiChat {
    pub fn new(api_key: String, model: String, temperature: f64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network {
                provider: PROVIDER.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
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
        let payload = self.payload(request, false);
        let body = self.post(&payload).await?;
        extract_text(&body)
    }

    pub async fn invoke_structured(&self, request: &ChatRequest) -> Result<StructuredPost> {
        let payload = self.payload(request, true);
        let body = self.post(&payload).await?;
        let text = extract_text(&body)?;
        parse_structured(PROVIDER, &text)
    }

    fn payload(&self, request: &ChatRequest, structured: bool) -> Value {
        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": request.user}],
            }],
            "generationConfig": {
                "temperature": self.temperature,
            },
        });

        if let Some(system) = &request.system {
            payload["systemInstruction"] = json!({
                "parts": [{"text": system}],
            });
        }

        if structured {
            payload["generationConfig"]["responseMimeType"] = json!("application/json");
            payload["generationConfig"]["responseSchema"] = json!({
                "type": "OBJECT",
                "properties": {
                    "generated_text": {"type": "STRING"},
                    "source_words": {"type": "STRING"},
                },
                "required": ["generated_text"],
            });
        }

        payload
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        debug!("Requesting gemini completion with model {}", self.model);

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
        debug!("gemini responded with HTTP {}", status);

        if !status.is_success() {
            return Err(api_error(status, &body));
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

fn api_error(status: reqwest::StatusCode, body: &str) -> crate::error::FedimimeError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());

    ProviderError::Api {
        provider: PROVIDER.to_string(),
        message: format!("HTTP {}: {}", status.as_u16(), message),
    }
    .into()
}

fn extract_text(body: &Value) -> Result<String> {
    let candidate = &body["candidates"][0];

    if candidate["finishReason"].as_str() == Some("RECITATION") {
        return Err(ProviderError::Recitation {
            provider: PROVIDER.to_string(),
        }
        .into());
    }

    match candidate["content"]["parts"].as_array() {
        Some(parts) => Ok(parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<Vec<_>>()
            .join("")),
        None => Err(ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            message: "completion has no content parts".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FedimimeError;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> GeminiChat {
        GeminiChat::new("test-key".to_string(), "gemini-2.0-flash".to_string(), 0.7)
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn test_request() -> ChatRequest {
        ChatRequest::new(Some("mimic the voice".to_string()), "corpus goes here")
    }

    fn completion_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP",
            }],
        })
    }

    #[tokio::test]
    async fn test_invoke_returns_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("a post")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = client.invoke(&test_request()).await.unwrap();

        assert_eq!(text, "a post");
    }

    #[tokio::test]
    async fn test_invoke_sends_system_instruction_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "mimic the voice"}]},
                "generationConfig": {"temperature": 0.7},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.invoke(&test_request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_recitation_finish_reason_is_distinct_error() {
        let server = MockServer::start().await;
        let body = json!({
            "candidates": [{"finishReason": "RECITATION"}],
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.invoke(&test_request()).await.unwrap_err();

        assert!(matches!(
            err,
            FedimimeError::Provider(ProviderError::Recitation { .. })
        ));
    }

    #[tokio::test]
    async fn test_api_error_carries_message() {
        let server = MockServer::start().await;
        let body = json!({
            "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"},
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.invoke(&test_request()).await.unwrap_err();

        let rendered = format!("{}", err);
        assert!(rendered.contains("HTTP 400"), "got: {}", rendered);
        assert!(rendered.contains("API key not valid"), "got: {}", rendered);
    }

    #[tokio::test]
    async fn test_missing_parts_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.invoke(&test_request()).await.unwrap_err();

        assert!(matches!(
            err,
            FedimimeError::Provider(ProviderError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_structured_requests_json_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseMimeType": "application/json"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
                r#"{"generated_text": "a post", "source_words": "a"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let post = client.invoke_structured(&test_request()).await.unwrap();

        assert_eq!(post.generated_text, "a post");
        assert_eq!(post.source_words, "a");
    }

    #[tokio::test]
    async fn test_structured_rejects_prose_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("not json at all")),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.invoke_structured(&test_request()).await.unwrap_err();

        assert!(matches!(
            err,
            FedimimeError::Provider(ProviderError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_multi_part_completion_is_joined() {
        let server = MockServer::start().await;
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "first "}, {"text": "second"}]},
                "finishReason": "STOP",
            }],
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = client.invoke(&test_request()).await.unwrap();

        assert_eq!(text, "first second");
    }
}
