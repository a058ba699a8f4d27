//! Core types for Fedimime

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account as surfaced by the platform's account search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    /// Webfinger-style handle: bare username for local accounts,
    /// `user@host` for remote ones.
    pub acct: String,
    pub username: String,
}

impl Account {
    pub fn new(id: impl Into<String>, acct: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            acct: acct.into(),
            username: username.into(),
        }
    }

    /// Whether this account lives on another instance.
    pub fn is_remote(&self) -> bool {
        self.acct.contains('@')
    }
}

/// Visibility of a status, both for filtering fetched timelines and for
/// publishing generated posts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single timeline status, reduced to the fields the mirror cares about.
///
/// The raw `content` is HTML as served by the platform; markup is stripped
/// by the fetcher's filter pipeline, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub id: String,
    pub content: String,
    /// True when the status is a boost of someone else's post.
    pub is_reblog: bool,
    pub replies_count: u32,
    pub visibility: Visibility,
}

impl SourceStatus {
    /// A plain public status with no replies. Tests adjust fields from here.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_reblog: false,
            replies_count: 0,
            visibility: Visibility::Public,
        }
    }
}

/// The locally cached mirror of one account's post history.
///
/// `texts` is newest-first. `latest_id` is the id of the newest remote
/// status the mirror has seen; `None` means the cache has never synced.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CachedCorpus {
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub latest_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CachedCorpus {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// One previously generated post, kept so later runs can avoid repeating
/// themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
