//! Fedimime - a fediverse account mimic
//!
//! This library mirrors a Mastodon-compatible account's public post
//! history into a local corpus and drives LLM providers to generate new
//! posts in that account's voice, optionally publishing them through a
//! second account.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod providers;
pub mod resolver;
pub mod sampler;
pub mod service;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{FedimimeError, Result};
pub use service::{CorpusStats, MimicService, RunOutcome};
pub use types::{Account, HistoryEntry, SourceStatus, Visibility};
