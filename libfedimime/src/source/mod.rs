//! Platform abstraction for reading timelines and publishing statuses
//!
//! The engine never talks a concrete wire protocol. It depends on two narrow
//! capabilities: a [`StatusSource`] it can search and page through, and a
//! [`StatusPublisher`] it can hand a finished post to. The Mastodon-compatible
//! implementations live in [`mastodon`]; [`mock`] provides scripted
//! implementations for tests.
//!
//! # Examples
//!
//! ```no_run
//! use libfedimime::source::{StatusPage, StatusSource};
//! use libfedimime::source::mastodon::MastodonSource;
//! use libfedimime::config::SourceConfig;
//!
//! # async fn example() -> libfedimime::error::Result<()> {
//! let config = SourceConfig {
//!     instance: "https://mastodon.social".to_string(),
//!     token_file: "~/.config/fedimime/source_token".to_string(),
//!     handle: "someone".to_string(),
//! };
//!
//! let source = MastodonSource::from_config(&config)?;
//! let accounts = source.search_accounts("@someone", 10).await?;
//!
//! if let Some(account) = accounts.first() {
//!     let page = StatusPage {
//!         limit: 40,
//!         ..Default::default()
//!     };
//!     let statuses = source.account_statuses(&account.id, &page).await?;
//!     println!("fetched {} statuses", statuses.len());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Account, SourceStatus, Visibility};

pub mod mastodon;

// Mock implementations are available for all builds (not just tests) to
// support integration tests
pub mod mock;

/// Parameters for one timeline page request.
///
/// `since_id` bounds the page from below (only statuses newer than the id),
/// `max_id` from above (only statuses older than the id). Platforms return
/// pages newest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPage {
    pub limit: u32,
    pub since_id: Option<String>,
    pub max_id: Option<String>,
}

/// Read access to a platform: account search and timeline paging.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Search for accounts matching a query.
    ///
    /// # Arguments
    ///
    /// * `query` - Search string; for handles a leading `@` is customary
    /// * `limit` - Maximum number of candidates to return
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Network` or `PlatformError::Authentication`
    /// depending on why the search could not be performed.
    async fn search_accounts(&self, query: &str, limit: u32) -> Result<Vec<Account>>;

    /// Fetch one page of an account's statuses, newest first.
    ///
    /// # Errors
    ///
    /// Returns a platform error when the page could not be fetched. Callers
    /// that page through a timeline decide for themselves whether a failed
    /// page aborts or truncates the walk.
    async fn account_statuses(
        &self,
        account_id: &str,
        page: &StatusPage,
    ) -> Result<Vec<SourceStatus>>;
}

/// Write access to a platform: publish one status.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Publish `text` with the given visibility and return the
    /// platform-specific status id.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Posting`, `PlatformError::Authentication`, or
    /// `PlatformError::Network` depending on the failure.
    async fn publish(&self, text: &str, visibility: Visibility) -> Result<String>;
}
