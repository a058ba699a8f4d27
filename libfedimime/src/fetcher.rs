//! Incremental timeline mirroring
//!
//! Keeps one account's corpus cache in step with its remote timeline:
//!
//! - never synced (or cache lost): full backfill, paging backwards with a
//!   `max_id` cursor until the timeline ends or the corpus cap is reached
//! - drift (remote has newer posts): delta fetch of just the gap, with
//!   `since_id` pinned at the cached position, prepended to the cache
//! - no drift: one probe call, no page fetches, no cache write
//!
//! Refreshing never fails. A failed probe serves the cached corpus; a failed
//! page ends pagination and whatever was accumulated is kept. Partial data
//! beats no data for this workload.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::cache::CorpusCache;
use crate::source::{StatusPage, StatusSource};
use crate::types::{CachedCorpus, SourceStatus, Visibility};

/// Statuses requested per timeline page.
pub const PAGE_LIMIT: u32 = 40;

pub struct StatusFetcher<'a> {
    source: &'a dyn StatusSource,
    cache: &'a dyn CorpusCache,
    max_corpus: usize,
}

impl<'a> StatusFetcher<'a> {
    pub fn new(source: &'a dyn StatusSource, cache: &'a dyn CorpusCache, max_corpus: usize) -> Self {
        Self {
            source,
            cache,
            max_corpus,
        }
    }

    /// Bring the cached corpus up to date and return its texts,
    /// newest-first.
    pub async fn refresh(&self, account_id: &str) -> Vec<String> {
        let cached = self.cache.load_corpus(account_id);

        let probed = match self.probe_latest(account_id).await {
            Some(id) => id,
            None => {
                warn!(
                    "Could not determine latest status for account {}; serving cached corpus ({} texts)",
                    account_id,
                    cached.len()
                );
                return cached.texts;
            }
        };

        let mut merged = match cached.latest_id.as_deref() {
            Some(latest) if !cached.is_empty() => {
                if latest == probed {
                    debug!(
                        "Corpus for account {} is current (latest id {})",
                        account_id, probed
                    );
                    return cached.texts;
                }

                info!(
                    "Account {} drifted (cached latest {}, remote latest {}); fetching the gap",
                    account_id, latest, probed
                );
                let mut fresh = self.fetch_newer_than(account_id, latest).await;
                debug!("Delta fetch yielded {} new texts", fresh.len());
                fresh.extend(cached.texts);
                fresh
            }
            _ => {
                info!(
                    "Cold start for account {}; backfilling up to {} texts",
                    account_id, self.max_corpus
                );
                self.backfill(account_id).await
            }
        };

        merged.truncate(self.max_corpus);

        let corpus = CachedCorpus {
            texts: merged,
            latest_id: Some(probed),
            updated_at: None,
        };
        self.cache.save_corpus(account_id, &corpus);
        info!(
            "Corpus for account {} holds {} texts",
            account_id,
            corpus.len()
        );
        corpus.texts
    }

    /// Id of the newest remote status, or `None` when the probe fails or
    /// the timeline is empty.
    async fn probe_latest(&self, account_id: &str) -> Option<String> {
        let page = StatusPage {
            limit: 1,
            ..Default::default()
        };

        match self.source.account_statuses(account_id, &page).await {
            Ok(statuses) => statuses.into_iter().next().map(|s| s.id),
            Err(e) => {
                warn!("Latest-status probe failed for account {}: {}", account_id, e);
                None
            }
        }
    }

    async fn backfill(&self, account_id: &str) -> Vec<String> {
        let mut texts = Vec::new();
        let mut max_id: Option<String> = None;

        while texts.len() < self.max_corpus {
            let page = StatusPage {
                limit: PAGE_LIMIT,
                since_id: None,
                max_id: max_id.clone(),
            };

            let statuses = match self.source.account_statuses(account_id, &page).await {
                Ok(statuses) => statuses,
                Err(e) => {
                    warn!(
                        "Backfill page failed for account {} (cursor {:?}): {}; keeping {} texts",
                        account_id,
                        max_id,
                        e,
                        texts.len()
                    );
                    break;
                }
            };

            let cursor = match statuses.last() {
                Some(last) => last.id.clone(),
                None => break,
            };
            max_id = Some(cursor);
            texts.extend(extract_public_texts(&statuses));
        }

        texts
    }

    /// Walk the gap between `since_id` and the remote head, newest-first.
    async fn fetch_newer_than(&self, account_id: &str, since_id: &str) -> Vec<String> {
        let mut texts = Vec::new();
        let mut max_id: Option<String> = None;

        loop {
            let page = StatusPage {
                limit: PAGE_LIMIT,
                since_id: Some(since_id.to_string()),
                max_id: max_id.clone(),
            };

            let statuses = match self.source.account_statuses(account_id, &page).await {
                Ok(statuses) => statuses,
                Err(e) => {
                    warn!(
                        "Delta page failed for account {} (cursor {:?}): {}; keeping {} new texts",
                        account_id,
                        max_id,
                        e,
                        texts.len()
                    );
                    break;
                }
            };

            let cursor = match statuses.last() {
                Some(last) => last.id.clone(),
                None => break,
            };
            max_id = Some(cursor);
            texts.extend(extract_public_texts(&statuses));
        }

        texts
    }
}

fn markup_pattern() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| Regex::new(r"<[^>]*>").expect("markup pattern is valid"))
}

/// Reduce one page of statuses to the texts worth mirroring.
///
/// In order: drop boosts, drop posts that have replies, keep only public
/// and unlisted posts, strip markup, drop mentions (texts starting with
/// `@`), drop empty leftovers.
pub fn extract_public_texts(statuses: &[SourceStatus]) -> Vec<String> {
    statuses
        .iter()
        .filter(|s| !s.is_reblog)
        .filter(|s| s.replies_count == 0)
        .filter(|s| matches!(s.visibility, Visibility::Public | Visibility::Unlisted))
        .map(|s| strip_markup(&s.content))
        .filter(|text| !text.starts_with('@'))
        .filter(|text| !text.is_empty())
        .collect()
}

fn strip_markup(content: &str) -> String {
    markup_pattern()
        .replace_all(content, "")
        .trim()
        .to_string()
}
