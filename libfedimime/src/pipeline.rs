//! Generation pipeline
//!
//! Drives one generation run across a primary backend and an optional
//! fallback: a fixed number of attempts per backend with a flat backoff,
//! then a one-way switch to the fallback. A second refinement pass can
//! rewrite the first draft; the first pass failing ends the run, the
//! second pass failing only costs the refinement.
//!
//! The first-pass text goes into the account's generation history before
//! any refinement, and the suffix tag goes on after the final pass. The
//! tag is therefore never part of the history the next run sees.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::CorpusCache;
use crate::config::GenerationConfig;
use crate::error::{FedimimeError, ProviderError, Result};
use crate::providers::{ChatBackend, ChatRequest};

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Final text, suffix tag included.
    pub text: String,
    /// Backend that produced the final accepted pass.
    pub provider: String,
    /// Completed passes, 1 or 2.
    pub passes: u32,
}

pub struct GenerationPipeline<'a> {
    primary: &'a ChatBackend,
    fallback: Option<&'a ChatBackend>,
    config: &'a GenerationConfig,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(
        primary: &'a ChatBackend,
        fallback: Option<&'a ChatBackend>,
        config: &'a GenerationConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
        }
    }

    /// Run the configured passes over `first_request` and return the final
    /// text.
    ///
    /// # Errors
    ///
    /// Fails only when the first pass exhausts every backend, or when the
    /// refine instruction is configured but unreadable.
    pub async fn generate(
        &self,
        first_request: ChatRequest,
        cache: &dyn CorpusCache,
        account_id: &str,
    ) -> Result<GenerationOutcome> {
        let (draft, draft_provider) = self.run_pass(&first_request, "first").await?;

        // Recorded before any refinement so the next run sees what this
        // one drafted, even if the process dies mid-refine.
        cache.append_history(account_id, &draft, self.config.history_limit);

        let refine = if self.config.two_pass {
            self.config.refine_instruction_text()?
        } else {
            None
        };

        let (text, provider, passes) = match refine {
            Some(instruction) => {
                let second_request = ChatRequest::new(Some(instruction), draft.clone());
                match self.run_pass(&second_request, "second").await {
                    Ok((refined, refine_provider)) => (refined, refine_provider, 2),
                    Err(e) => {
                        warn!("Second pass failed ({}); keeping the first-pass text", e);
                        (draft, draft_provider, 1)
                    }
                }
            }
            None => (draft, draft_provider, 1),
        };

        Ok(GenerationOutcome {
            text: apply_tag(&text, &self.config.tag),
            provider,
            passes,
        })
    }

    /// One pass of the retry/fallback state machine. Returns the trimmed
    /// completion and the name of the backend that produced it.
    async fn run_pass(&self, request: &ChatRequest, pass: &str) -> Result<(String, String)> {
        info!(
            "Running {} generation pass via {}",
            pass,
            self.primary.name()
        );

        let primary_err = match self.attempt_slot(self.primary, request, pass).await {
            Ok(text) => return Ok((text, self.primary.name().to_string())),
            Err(e) => e,
        };

        let fallback = match self.fallback {
            Some(backend) if backend.name() != self.primary.name() => backend,
            _ => return Err(primary_err),
        };

        warn!(
            "Provider {} exhausted on the {} pass; switching to fallback {}",
            self.primary.name(),
            pass,
            fallback.name()
        );
        match self.attempt_slot(fallback, request, pass).await {
            Ok(text) => Ok((text, fallback.name().to_string())),
            Err(e) => Err(e),
        }
    }

    /// Drive one backend through its attempt budget.
    async fn attempt_slot(
        &self,
        backend: &ChatBackend,
        request: &ChatRequest,
        pass: &str,
    ) -> Result<String> {
        let attempts = self.config.max_retries.max(1);
        let structured = self.config.structured && backend.supports_structured();
        if self.config.structured && !structured {
            warn!(
                "{} does not support structured output; using plain completions for this backend",
                backend.name()
            );
        }

        let mut last: Option<FedimimeError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(Duration::from_secs(self.config.retry_backoff_secs)).await;
            }

            match self.invoke_once(backend, request, structured).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        warn!(
                            "{} returned an empty completion on the {} pass (attempt {}/{})",
                            backend.name(),
                            pass,
                            attempt,
                            attempts
                        );
                        last = Some(
                            ProviderError::Malformed {
                                provider: backend.name().to_string(),
                                message: "empty completion".to_string(),
                            }
                            .into(),
                        );
                        continue;
                    }
                    debug!(
                        "{} completed the {} pass on attempt {}/{}",
                        backend.name(),
                        pass,
                        attempt,
                        attempts
                    );
                    return Ok(text);
                }
                Err(e) => {
                    if matches!(
                        e,
                        FedimimeError::Provider(ProviderError::Recitation { .. })
                    ) {
                        // A fresh attempt can draw a different continuation
                        warn!(
                            "{} refused the {} pass as recitation (attempt {}/{}); retrying",
                            backend.name(),
                            pass,
                            attempt,
                            attempts
                        );
                    } else {
                        warn!(
                            "{} failed the {} pass (attempt {}/{}): {}",
                            backend.name(),
                            pass,
                            attempt,
                            attempts,
                            e
                        );
                    }
                    last = Some(e);
                }
            }
        }

        let last = last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(ProviderError::Exhausted {
            provider: backend.name().to_string(),
            attempts,
            last,
        }
        .into())
    }

    async fn invoke_once(
        &self,
        backend: &ChatBackend,
        request: &ChatRequest,
        structured: bool,
    ) -> Result<String> {
        if structured {
            let post = backend.invoke_structured(request).await?;
            if !post.source_words.is_empty() {
                debug!(
                    "{} drew on source words: {}",
                    backend.name(),
                    post.source_words
                );
            }
            return Ok(post.generated_text);
        }
        backend.invoke(request).await
    }
}

fn apply_tag(text: &str, tag: &str) -> String {
    if tag.is_empty() {
        text.to_string()
    } else {
        format!("{} {}", text, tag)
    }
}
