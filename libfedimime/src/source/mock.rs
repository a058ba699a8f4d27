//! Mock source and publisher implementations for testing
//!
//! The mock source serves a fixed timeline and honors the same
//! `since_id`/`max_id`/`limit` paging semantics as a Mastodon instance, so
//! fetcher tests exercise real pagination logic without network access.
//! Failure injection covers search failures and per-page fetch failures.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{PlatformError, Result};
use crate::source::{StatusPage, StatusPublisher, StatusSource};
use crate::types::{Account, SourceStatus, Visibility};

/// Behavior configuration for the mock source
#[derive(Clone)]
pub struct MockSourceConfig {
    /// Candidates returned by every account search
    pub accounts: Vec<Account>,

    /// The full timeline, newest-first, with numeric string ids
    pub timeline: Vec<SourceStatus>,

    /// Whether account searches fail
    pub fail_search: bool,

    /// Fail every `account_statuses` call from this call index on
    /// (0-based, counting limit-1 probes too)
    pub fail_pages_from: Option<usize>,

    /// Number of search calls observed
    pub search_calls: Arc<Mutex<usize>>,

    /// Number of `account_statuses` calls observed (probes included)
    pub page_calls: Arc<Mutex<usize>>,

    /// Queries passed to search, for verification
    pub queries: Arc<Mutex<Vec<String>>>,

    /// Page parameters passed to `account_statuses`, for verification
    pub pages_seen: Arc<Mutex<Vec<StatusPage>>>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            timeline: Vec::new(),
            fail_search: false,
            fail_pages_from: None,
            search_calls: Arc::new(Mutex::new(0)),
            page_calls: Arc::new(Mutex::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
            pages_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock status source for testing. Clones share the call counters and
/// recorded pages.
#[derive(Clone)]
pub struct MockSource {
    config: MockSourceConfig,
}

impl MockSource {
    pub fn new(config: MockSourceConfig) -> Self {
        Self { config }
    }

    /// A source with search candidates and a timeline, everything succeeding.
    pub fn with_timeline(accounts: Vec<Account>, timeline: Vec<SourceStatus>) -> Self {
        Self::new(MockSourceConfig {
            accounts,
            timeline,
            ..Default::default()
        })
    }

    /// A source whose searches fail.
    pub fn search_failure() -> Self {
        Self::new(MockSourceConfig {
            fail_search: true,
            ..Default::default()
        })
    }

    pub fn search_calls(&self) -> usize {
        *self.config.search_calls.lock().unwrap()
    }

    pub fn page_calls(&self) -> usize {
        *self.config.page_calls.lock().unwrap()
    }

    pub fn queries(&self) -> Vec<String> {
        self.config.queries.lock().unwrap().clone()
    }

    pub fn pages_seen(&self) -> Vec<StatusPage> {
        self.config.pages_seen.lock().unwrap().clone()
    }
}

fn numeric_id(id: &str) -> u64 {
    id.parse().unwrap_or(0)
}

#[async_trait]
impl StatusSource for MockSource {
    async fn search_accounts(&self, query: &str, _limit: u32) -> Result<Vec<Account>> {
        *self.config.search_calls.lock().unwrap() += 1;
        self.config
            .queries
            .lock()
            .unwrap()
            .push(query.to_string());

        if self.config.fail_search {
            return Err(PlatformError::Network("injected search failure".to_string()).into());
        }

        Ok(self.config.accounts.clone())
    }

    async fn account_statuses(
        &self,
        _account_id: &str,
        page: &StatusPage,
    ) -> Result<Vec<SourceStatus>> {
        let call_index = {
            let mut calls = self.config.page_calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            index
        };
        self.config.pages_seen.lock().unwrap().push(page.clone());

        if let Some(from) = self.config.fail_pages_from {
            if call_index >= from {
                return Err(PlatformError::Network(format!(
                    "injected page failure on call {}",
                    call_index
                ))
                .into());
            }
        }

        let below = page.max_id.as_deref().map(numeric_id).unwrap_or(u64::MAX);
        let above = page.since_id.as_deref().map(numeric_id).unwrap_or(0);

        Ok(self
            .config
            .timeline
            .iter()
            .filter(|s| {
                let id = numeric_id(&s.id);
                id < below && id > above
            })
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

/// Mock publisher for testing. Clones share the posted log.
#[derive(Clone)]
pub struct MockPublisher {
    succeed: bool,
    posted: Arc<Mutex<Vec<(String, Visibility)>>>,
}

impl MockPublisher {
    /// A publisher that accepts everything.
    pub fn success() -> Self {
        Self {
            succeed: true,
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A publisher that rejects everything.
    pub fn failure() -> Self {
        Self {
            succeed: false,
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Published `(text, visibility)` pairs, in order.
    pub fn posted(&self) -> Vec<(String, Visibility)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusPublisher for MockPublisher {
    async fn publish(&self, text: &str, visibility: Visibility) -> Result<String> {
        if !self.succeed {
            return Err(PlatformError::Posting("injected publish failure".to_string()).into());
        }

        let mut posted = self.posted.lock().unwrap();
        posted.push((text.to_string(), visibility));
        Ok(format!("mock-status-{}", posted.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(ids: &[u64]) -> Vec<SourceStatus> {
        ids.iter()
            .map(|id| SourceStatus::new(id.to_string(), format!("post {}", id)))
            .collect()
    }

    #[tokio::test]
    async fn test_mock_search_returns_candidates_and_records_query() {
        let source = MockSource::with_timeline(
            vec![Account::new("1", "ambi", "ambi")],
            Vec::new(),
        );

        let accounts = source.search_accounts("@ambi", 10).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(source.search_calls(), 1);
        assert_eq!(source.queries(), vec!["@ambi".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_search_failure() {
        let source = MockSource::search_failure();

        let result = source.search_accounts("@ambi", 10).await;
        assert!(result.is_err());
        assert_eq!(source.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_pages_newest_first_with_limit() {
        let source = MockSource::with_timeline(Vec::new(), timeline(&[50, 40, 30, 20, 10]));

        let page = StatusPage {
            limit: 2,
            ..Default::default()
        };
        let statuses = source.account_statuses("1", &page).await.unwrap();

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].id, "50");
        assert_eq!(statuses[1].id, "40");
    }

    #[tokio::test]
    async fn test_mock_honors_max_id_and_since_id() {
        let source = MockSource::with_timeline(Vec::new(), timeline(&[50, 40, 30, 20, 10]));

        let page = StatusPage {
            limit: 10,
            since_id: Some("10".to_string()),
            max_id: Some("40".to_string()),
        };
        let statuses = source.account_statuses("1", &page).await.unwrap();

        // Both bounds are exclusive
        let ids: Vec<&str> = statuses.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["30", "20"]);
    }

    #[tokio::test]
    async fn test_mock_fails_pages_from_index() {
        let source = MockSource::new(MockSourceConfig {
            timeline: timeline(&[3, 2, 1]),
            fail_pages_from: Some(1),
            ..Default::default()
        });

        let page = StatusPage {
            limit: 1,
            ..Default::default()
        };
        assert!(source.account_statuses("1", &page).await.is_ok());
        assert!(source.account_statuses("1", &page).await.is_err());
        assert_eq!(source.page_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_publisher_records_posts() {
        let publisher = MockPublisher::success();

        let id = publisher
            .publish("hello #bot", Visibility::Unlisted)
            .await
            .unwrap();
        assert_eq!(id, "mock-status-1");

        let posted = publisher.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "hello #bot");
        assert_eq!(posted[0].1, Visibility::Unlisted);
    }

    #[tokio::test]
    async fn test_mock_publisher_failure() {
        let publisher = MockPublisher::failure();

        let result = publisher.publish("hello", Visibility::Public).await;
        assert!(result.is_err());
        assert!(publisher.posted().is_empty());
    }
}
