//! Chat-completion backends
//!
//! One closed enum over every supported provider. The pipeline talks to
//! [`ChatBackend`] and never sees a wire format; each backend module owns
//! its own request and response mapping. Backends are built by registry
//! name from the `[providers.*]` config sections, resolving credentials
//! and applying model defaults up front so a misconfigured provider fails
//! before any generation attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{GenerationConfig, ProviderConfig, ProvidersConfig};
use crate::error::{ProviderError, Result};

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

// Mock backend is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use anthropic::AnthropicChat;
pub use gemini::GeminiChat;
pub use mock::MockChat;
pub use ollama::OllamaChat;
pub use openai::OpenAiChat;

/// Deadline for any single provider HTTP call. Generation against large
/// prompts is slow; a hung provider still cannot stall the run forever.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// One generation request: an optional system instruction and one user
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
}

impl ChatRequest {
    pub fn new(system: Option<String>, user: impl Into<String>) -> Self {
        Self {
            system,
            user: user.into(),
        }
    }
}

/// Payload of a schema-constrained completion.
///
/// Deserializing the completion is the validation: missing
/// `generated_text` or non-JSON output is a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredPost {
    /// The post text itself, with no surrounding commentary.
    pub generated_text: String,
    /// Comma-separated words or phrases the model drew on.
    #[serde(default)]
    pub source_words: String,
}

/// A configured chat-completion backend.
///
/// The set of providers is closed; adding one means adding a variant
/// here and a `[providers.*]` config section, and every match below
/// stops compiling until the new backend is wired through.
#[derive(Debug)]
pub enum ChatBackend {
    Gemini(GeminiChat),
    OpenAi(OpenAiChat),
    Anthropic(AnthropicChat),
    Ollama(OllamaChat),
    Mock(MockChat),
}

impl ChatBackend {
    /// Build the backend registered under `name`.
    ///
    /// `openrouter` shares the OpenAI wire format and differs only in
    /// base URL and credentials. Unknown names and missing sections are
    /// configuration errors, never retried.
    pub fn from_config(
        name: &str,
        providers: &ProvidersConfig,
        generation: &GenerationConfig,
    ) -> Result<Self> {
        let temperature = generation.temperature;

        match name {
            "gemini" => {
                let section = require_section(name, providers.gemini.as_ref())?;
                let client = GeminiChat::new(
                    resolve_api_key(name, section)?,
                    model_or(section, "gemini-2.0-flash"),
                    temperature,
                )?;
                Ok(ChatBackend::Gemini(client))
            }
            "openai" => {
                let section = require_section(name, providers.openai.as_ref())?;
                let client = OpenAiChat::new(
                    name,
                    resolve_api_key(name, section)?,
                    model_or(section, "gpt-4o-mini"),
                    base_url_or(section, "https://api.openai.com/v1"),
                    temperature,
                )?;
                Ok(ChatBackend::OpenAi(client))
            }
            "openrouter" => {
                let section = require_section(name, providers.openrouter.as_ref())?;
                let client = OpenAiChat::new(
                    name,
                    resolve_api_key(name, section)?,
                    model_or(section, "openai/gpt-4o-mini"),
                    base_url_or(section, "https://openrouter.ai/api/v1"),
                    temperature,
                )?;
                Ok(ChatBackend::OpenAi(client))
            }
            "anthropic" => {
                let section = require_section(name, providers.anthropic.as_ref())?;
                let client = AnthropicChat::new(
                    resolve_api_key(name, section)?,
                    model_or(section, "claude-sonnet-4-20250514"),
                    temperature,
                )?;
                Ok(ChatBackend::Anthropic(client))
            }
            "ollama" => {
                // Local and unauthenticated; a missing section just means defaults
                let section = providers.ollama.clone().unwrap_or_default();
                let client = OllamaChat::new(
                    base_url_or(&section, "http://localhost:11434"),
                    model_or(&section, "llama3.2"),
                    temperature,
                )?;
                Ok(ChatBackend::Ollama(client))
            }
            "mock" => Ok(ChatBackend::Mock(MockChat::new())),
            other => Err(ProviderError::Unknown(other.to_string()).into()),
        }
    }

    /// Registry name of this backend, as used in config and logs.
    pub fn name(&self) -> &str {
        match self {
            ChatBackend::Gemini(_) => "gemini",
            ChatBackend::OpenAi(client) => client.provider(),
            ChatBackend::Anthropic(_) => "anthropic",
            ChatBackend::Ollama(_) => "ollama",
            ChatBackend::Mock(client) => client.provider(),
        }
    }

    /// Whether the backend can honor a schema-constrained completion.
    pub fn supports_structured(&self) -> bool {
        !matches!(self, ChatBackend::Anthropic(_))
    }

    /// One plain completion.
    pub async fn invoke(&self, request: &ChatRequest) -> Result<String> {
        match self {
            ChatBackend::Gemini(client) => client.invoke(request).await,
            ChatBackend::OpenAi(client) => client.invoke(request).await,
            ChatBackend::Anthropic(client) => client.invoke(request).await,
            ChatBackend::Ollama(client) => client.invoke(request).await,
            ChatBackend::Mock(client) => client.invoke(request).await,
        }
    }

    /// One schema-constrained completion.
    pub async fn invoke_structured(&self, request: &ChatRequest) -> Result<StructuredPost> {
        match self {
            ChatBackend::Gemini(client) => client.invoke_structured(request).await,
            ChatBackend::OpenAi(client) => client.invoke_structured(request).await,
            ChatBackend::Anthropic(client) => client.invoke_structured(request).await,
            ChatBackend::Ollama(client) => client.invoke_structured(request).await,
            ChatBackend::Mock(client) => client.invoke_structured(request).await,
        }
    }
}

fn require_section<'a>(
    name: &str,
    section: Option<&'a ProviderConfig>,
) -> Result<&'a ProviderConfig> {
    section.ok_or_else(|| ProviderError::NotConfigured(name.to_string()).into())
}

fn model_or(section: &ProviderConfig, default: &str) -> String {
    section
        .model
        .clone()
        .unwrap_or_else(|| default.to_string())
}

fn base_url_or(section: &ProviderConfig, default: &str) -> String {
    section
        .base_url
        .clone()
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve a provider API key: inline value first, then a key file with
/// shell expansion. Surrounding whitespace is stripped; an empty key is
/// rejected either way.
fn resolve_api_key(provider: &str, section: &ProviderConfig) -> Result<String> {
    if let Some(key) = &section.api_key {
        let key = key.trim();
        if key.is_empty() {
            return Err(
                ProviderError::Credentials(format!("{} api_key is empty", provider)).into(),
            );
        }
        return Ok(key.to_string());
    }

    if let Some(path) = &section.api_key_file {
        let expanded = shellexpand::full(path).map_err(|e| {
            ProviderError::Credentials(format!(
                "cannot expand {} api_key_file '{}': {}",
                provider, path, e
            ))
        })?;
        let content = std::fs::read_to_string(expanded.as_ref()).map_err(|e| {
            ProviderError::Credentials(format!(
                "cannot read {} api_key_file '{}': {}",
                provider, path, e
            ))
        })?;
        let key = content.trim();
        if key.is_empty() {
            return Err(ProviderError::Credentials(format!(
                "{} api_key_file '{}' is empty",
                provider, path
            ))
            .into());
        }
        return Ok(key.to_string());
    }

    Err(ProviderError::Credentials(format!(
        "{} requires api_key or api_key_file",
        provider
    ))
    .into())
}

/// Parse a structured completion out of raw model text.
pub(crate) fn parse_structured(provider: &str, text: &str) -> Result<StructuredPost> {
    let post: StructuredPost = serde_json::from_str(text.trim()).map_err(|e| {
        ProviderError::Malformed {
            provider: provider.to_string(),
            message: format!("structured completion is not valid JSON: {}", e),
        }
    })?;

    if post.generated_text.trim().is_empty() {
        return Err(ProviderError::Malformed {
            provider: provider.to_string(),
            message: "structured completion has an empty generated_text".to_string(),
        }
        .into());
    }

    Ok(post)
}
