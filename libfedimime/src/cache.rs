//! Local persistence for corpus mirrors, sync position, and generation
//! history.
//!
//! Three JSON records per source account, keyed by account id under a cache
//! root:
//!
//! - `corpus_{id}.json`: cleaned post texts (newest-first), the latest
//!   remote status id seen, and a save timestamp
//! - `latest_id_{id}.json`: just the latest id, so sync position can be
//!   inspected without loading the whole corpus
//! - `history_{id}.json`: recently generated posts

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{CachedCorpus, HistoryEntry};

/// Storage seam for the mirror's local records.
///
/// The contract is deliberately infallible: reads degrade to empty data,
/// writes degrade to a logged warning. Cache trouble slows a run down
/// (cold refetch) but never fails it.
pub trait CorpusCache: Send + Sync {
    /// Load the cached corpus; empty (never-synced) when the record is
    /// missing or unreadable.
    fn load_corpus(&self, account_id: &str) -> CachedCorpus;

    /// Persist the corpus and its latest-id sidecar.
    fn save_corpus(&self, account_id: &str, corpus: &CachedCorpus);

    /// Load generation history, newest-first; empty when missing.
    fn load_history(&self, account_id: &str) -> Vec<HistoryEntry>;

    fn save_history(&self, account_id: &str, entries: &[HistoryEntry]);

    /// Prepend one freshly generated text and truncate to `limit`.
    fn append_history(&self, account_id: &str, text: &str, limit: usize) {
        let mut entries = self.load_history(account_id);
        entries.insert(0, HistoryEntry::new(text));
        entries.truncate(limit);
        self.save_history(account_id, &entries);
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct HistoryRecord {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct LatestIdRecord<'a> {
    latest_id: Option<&'a str>,
}

/// JSON-file cache rooted at a directory.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn corpus_path(&self, account_id: &str) -> PathBuf {
        self.root.join(format!("corpus_{}.json", account_id))
    }

    fn latest_id_path(&self, account_id: &str) -> PathBuf {
        self.root.join(format!("latest_id_{}.json", account_id))
    }

    fn history_path(&self, account_id: &str) -> PathBuf {
        self.root.join(format!("history_{}.json", account_id))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file at {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read cache file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring malformed cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) {
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            warn!(
                "Failed to create cache directory {}: {}",
                self.root.display(),
                e
            );
            return;
        }

        let json = match serde_json::to_string_pretty(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache record {}: {}", path.display(), e);
                return;
            }
        };

        if let Err(e) = std::fs::write(path, json) {
            warn!("Failed to write cache file {}: {}", path.display(), e);
        }
    }
}

impl CorpusCache for FileCache {
    fn load_corpus(&self, account_id: &str) -> CachedCorpus {
        self.read_json(&self.corpus_path(account_id)).unwrap_or_default()
    }

    fn save_corpus(&self, account_id: &str, corpus: &CachedCorpus) {
        let record = CachedCorpus {
            updated_at: Some(Utc::now()),
            ..corpus.clone()
        };
        self.write_json(&self.corpus_path(account_id), &record);
        self.write_json(
            &self.latest_id_path(account_id),
            &LatestIdRecord {
                latest_id: record.latest_id.as_deref(),
            },
        );
        debug!(
            "Saved corpus for account {} ({} texts, latest id {:?})",
            account_id,
            record.texts.len(),
            record.latest_id
        );
    }

    fn load_history(&self, account_id: &str) -> Vec<HistoryEntry> {
        self.read_json::<HistoryRecord>(&self.history_path(account_id))
            .unwrap_or_default()
            .history
    }

    fn save_history(&self, account_id: &str, entries: &[HistoryEntry]) {
        self.write_json(
            &self.history_path(account_id),
            &HistoryRecord {
                history: entries.to_vec(),
            },
        );
    }
}

/// In-memory cache for tests. Mirrors `FileCache` semantics (including the
/// save-time `updated_at` stamp) and counts corpus saves so tests can assert
/// that a no-drift refresh writes nothing.
#[derive(Default)]
pub struct MemoryCache {
    corpora: Mutex<HashMap<String, CachedCorpus>>,
    histories: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    corpus_saves: Mutex<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a corpus without counting it as a save.
    pub fn seed_corpus(&self, account_id: &str, corpus: CachedCorpus) {
        self.corpora
            .lock()
            .unwrap()
            .insert(account_id.to_string(), corpus);
    }

    /// Number of `save_corpus` calls observed.
    pub fn corpus_saves(&self) -> usize {
        *self.corpus_saves.lock().unwrap()
    }
}

impl CorpusCache for MemoryCache {
    fn load_corpus(&self, account_id: &str) -> CachedCorpus {
        self.corpora
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    fn save_corpus(&self, account_id: &str, corpus: &CachedCorpus) {
        let record = CachedCorpus {
            updated_at: Some(Utc::now()),
            ..corpus.clone()
        };
        self.corpora
            .lock()
            .unwrap()
            .insert(account_id.to_string(), record);
        *self.corpus_saves.lock().unwrap() += 1;
    }

    fn load_history(&self, account_id: &str) -> Vec<HistoryEntry> {
        self.histories
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    fn save_history(&self, account_id: &str, entries: &[HistoryEntry]) {
        self.histories
            .lock()
            .unwrap()
            .insert(account_id.to_string(), entries.to_vec());
    }
}
