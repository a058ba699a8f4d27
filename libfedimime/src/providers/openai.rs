//! OpenAI-compatible backend
//!
//! Chat-completions wire format with Bearer auth. OpenRouter speaks the
//! same protocol, so both registry names share this client; the stored
//! provider label keeps logs and errors attributed to the right one.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_structured, ChatRequest, StructuredPost, REQUEST_TIMEOUT};
use crate::error::{ProviderError, Result};

#[derive(Debug)]
pub struct OpenAiChat {
    provider: String,
    client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: f64,
}

impl OpenAiChat {
    pub fn new(
        provider: &str,
        api_key: String,
        model: String,
        base_url: String,
        temperature: f64,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
            ProviderError::Credentials(format!("{} api key is not a valid header: {}", provider, e))
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network {
                provider: provider.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            provider: provider.to_string(),
            client,
            model,
            base_url,
            temperature,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Registry label of this client, `openai` or `openrouter`.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub async fn invoke(&self, request: &ChatRequest) -> Result<String> {
        let payload = self.payload(request, false);
        let body = self.post(&payload).await?;
        self.extract_text(&body)
    }

    pub async fn invoke_structured(&self, request: &ChatRequest) -> Result<StructuredPost> {
        let payload = self.payload(request, true);
        let body = self.post(&payload).await?;
        let text = self.extract_text(&body)?;
        parse_structured(&self.provider, &text)
    }

    fn payload(&self, request: &ChatRequest, structured: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        if structured {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "generated_post",
                    "schema": {
                        "type": "object",
                        "properties": {
                            "generated_text": {"type": "string"},
                            "source_words": {"type": "string"},
                        },
                        "required": ["generated_text", "source_words"],
                        "additionalProperties": false,
                    },
                },
            });
        }

        payload
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "Requesting {} completion with model {}",
            self.provider, self.model
        );

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: self.provider.clone(),
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Network {
            provider: self.provider.clone(),
            message: format!("failed to read response body: {}", e),
        })?;
        debug!("{} responded with HTTP {}", self.provider, status);

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(body);
            return Err(ProviderError::Api {
                provider: self.provider.clone(),
                message: format!("HTTP {}: {}", status.as_u16(), message),
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::Malformed {
                provider: self.provider.clone(),
                message: format!("response is not valid JSON: {}", e),
            }
            .into()
        })
    }

    fn extract_text(&self, body: &Value) -> Result<String> {
        match body["choices"][0]["message"]["content"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => Err(ProviderError::Malformed {
                provider: self.provider.clone(),
                message: "completion has no message content".to_string(),
            }
            .into()),
        }
    }
}
