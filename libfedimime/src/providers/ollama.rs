//! Ollama backend
//!
//! Local, unauthenticated chat endpoint. Streaming is turned off so one
//! request yields one complete message; structured output rides on the
//! `format` field, which accepts a JSON schema directly.

use serde_json::{json, Value};
use tracing::debug;

use super::{parse_structured, ChatRequest, StructuredPost, REQUEST_TIMEOUT};
use crate::error::{ProviderError, Result};

const PROVIDER: &str = "ollama";

#[derive(Debug)]
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
}

impl OllamaChat {
    pub fn new(base_url: String, model: String, temperature: f64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network {
                provider: PROVIDER.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            model,
            temperature,
        })
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
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {"temperature": self.temperature},
        });

        if structured {
            payload["format"] = json!({
                "type": "object",
                "properties": {
                    "generated_text": {"type": "string"},
                    "source_words": {"type": "string"},
                },
                "required": ["generated_text"],
            });
        }

        payload
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("Requesting ollama completion with model {}", self.model);

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
        debug!("ollama responded with HTTP {}", status);

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(String::from))
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

fn extract_text(body: &Value) -> Result<String> {
    match body["message"]["content"].as_str() {
        Some(text) => Ok(text.to_string()),
        None => Err(ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            message: "completion has no message content".to_string(),
        }
        .into()),
    }
}
