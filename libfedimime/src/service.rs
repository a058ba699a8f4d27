//! Run orchestration
//!
//! [`MimicService`] wires the whole pipeline together: resolve the
//! configured handle, bring the corpus cache up to date, sample the
//! corpus into a prompt, generate through the provider pipeline, and
//! optionally publish the result. Publishing failures never fail a run;
//! the generated text is the deliverable and is always returned.

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CorpusCache, FileCache};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::StatusFetcher;
use crate::pipeline::GenerationPipeline;
use crate::providers::{ChatBackend, ChatRequest};
use crate::resolver::resolve_account;
use crate::sampler;
use crate::source::mastodon::{MastodonPublisher, MastodonSource};
use crate::source::{StatusPublisher, StatusSource};
use crate::types::HistoryEntry;

/// Result of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Generated {
        /// Final text, suffix tag included.
        text: String,
        /// Backend that produced the accepted pass.
        provider: String,
        /// Completed generation passes.
        passes: u32,
        /// Status id when the text was published.
        published: Option<String>,
    },
    /// The source account yielded no usable posts; nothing was generated.
    EmptyCorpus,
}

/// Result of a sync-only run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub acct: String,
    pub account_id: String,
    pub texts: usize,
    pub latest_id: Option<String>,
    /// Whether this run wrote a new corpus record (false when the cache
    /// was already current or the remote was unreachable).
    pub refreshed: bool,
}

pub struct MimicService {
    config: Config,
    source: Box<dyn StatusSource>,
    publisher: Option<Box<dyn StatusPublisher>>,
    cache: Box<dyn CorpusCache>,
    primary: ChatBackend,
    fallback: Option<ChatBackend>,
}

impl MimicService {
    /// Assemble a service from explicit parts.
    pub fn new(
        config: Config,
        source: Box<dyn StatusSource>,
        publisher: Option<Box<dyn StatusPublisher>>,
        cache: Box<dyn CorpusCache>,
        primary: ChatBackend,
        fallback: Option<ChatBackend>,
    ) -> Self {
        Self {
            config,
            source,
            publisher,
            cache,
            primary,
            fallback,
        }
    }

    /// Assemble the production service: megalodon source, file cache,
    /// configured providers, and a publisher when publishing is enabled.
    pub fn from_config(config: Config) -> Result<Self> {
        let source = MastodonSource::from_config(&config.source)?;
        let cache = FileCache::new(config.cache.resolve_dir()?);

        let primary = ChatBackend::from_config(
            &config.generation.provider,
            &config.providers,
            &config.generation,
        )?;
        let fallback = match &config.generation.fallback_provider {
            Some(name) => Some(ChatBackend::from_config(
                name,
                &config.providers,
                &config.generation,
            )?),
            None => None,
        };

        let publisher: Option<Box<dyn StatusPublisher>> = match &config.publish {
            Some(publish) if publish.enabled => {
                Some(Box::new(MastodonPublisher::from_config(publish)?))
            }
            _ => None,
        };

        Ok(Self::new(
            config,
            Box::new(source),
            publisher,
            Box::new(cache),
            primary,
            fallback,
        ))
    }

    /// One full run: resolve, sync, sample, generate, publish.
    ///
    /// With `dry_run` the publish step is skipped even when a publisher
    /// is configured.
    ///
    /// # Errors
    ///
    /// Fails on unreadable configuration values, an unresolvable handle,
    /// or a first generation pass that exhausts every backend. Cache and
    /// publish trouble degrade with a warning instead.
    pub async fn run(&self, dry_run: bool) -> Result<RunOutcome> {
        let account = resolve_account(self.source.as_ref(), &self.config.source.handle).await?;
        info!("Mirroring account {} (id {})", account.acct, account.id);

        let fetcher = StatusFetcher::new(
            self.source.as_ref(),
            self.cache.as_ref(),
            self.config.cache.max_corpus,
        );
        let corpus = fetcher.refresh(&account.id).await;
        if corpus.is_empty() {
            info!("No usable posts for {}; nothing to mimic", account.acct);
            return Ok(RunOutcome::EmptyCorpus);
        }

        let sample_size = self.config.generation.sample_size.min(corpus.len());
        let sampled = sampler::sample(&corpus, sample_size, &mut rand::thread_rng());
        info!("Sampled {} of {} corpus texts", sampled.len(), corpus.len());

        let history = self.cache.load_history(&account.id);
        let request = build_first_request(
            &self.config.generation.instruction_text()?,
            &sampled,
            &history,
        );

        let pipeline =
            GenerationPipeline::new(&self.primary, self.fallback.as_ref(), &self.config.generation);
        let generated = pipeline
            .generate(request, self.cache.as_ref(), &account.id)
            .await?;

        let published = if dry_run {
            info!("Dry run; skipping publish");
            None
        } else {
            self.publish(&generated.text).await
        };

        Ok(RunOutcome::Generated {
            text: generated.text,
            provider: generated.provider,
            passes: generated.passes,
            published,
        })
    }

    /// Resolve and sync only, reporting where the cache ended up.
    pub async fn sync_corpus(&self) -> Result<CorpusStats> {
        let account = resolve_account(self.source.as_ref(), &self.config.source.handle).await?;
        info!("Syncing corpus for {} (id {})", account.acct, account.id);

        let before = self.cache.load_corpus(&account.id).updated_at;
        let fetcher = StatusFetcher::new(
            self.source.as_ref(),
            self.cache.as_ref(),
            self.config.cache.max_corpus,
        );
        let texts = fetcher.refresh(&account.id).await;

        let after = self.cache.load_corpus(&account.id);
        Ok(CorpusStats {
            acct: account.acct,
            account_id: account.id,
            texts: texts.len(),
            latest_id: after.latest_id,
            refreshed: after.updated_at != before,
        })
    }

    async fn publish(&self, text: &str) -> Option<String> {
        let publisher = self.publisher.as_ref()?;
        let visibility = self
            .config
            .publish
            .as_ref()
            .map(|p| p.visibility)
            .unwrap_or_default();

        match publisher.publish(text, visibility).await {
            Ok(id) => {
                info!("Published status {}", id);
                Some(id)
            }
            Err(e) => {
                warn!("Publishing failed: {}; the generated text still stands", e);
                None
            }
        }
    }
}

/// First-pass prompt: instruction as the system message, sampled corpus
/// as the user message, with a do-not-repeat block when history exists.
fn build_first_request(
    instruction: &str,
    sampled: &[String],
    history: &[HistoryEntry],
) -> ChatRequest {
    let mut user = format!("Reference posts:\n{}", sampled.join("\n\n"));

    if !history.is_empty() {
        let recent: Vec<&str> = history.iter().map(|entry| entry.text.as_str()).collect();
        user.push_str(&format!(
            "\n\nRecently generated posts (avoid repeating these):\n{}",
            recent.join("\n\n")
        ));
    }

    ChatRequest::new(Some(instruction.to_string()), user)
}
