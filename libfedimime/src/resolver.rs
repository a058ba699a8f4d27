//! Handle resolution
//!
//! Maps a configured handle string to a concrete account id through the
//! platform's account search. Search results are fuzzy, so resolution
//! prefers exact handle matches and only falls back to the first candidate
//! when nothing matches exactly.

use tracing::{debug, warn};

use crate::error::{PlatformError, Result};
use crate::source::StatusSource;
use crate::types::Account;

const SEARCH_LIMIT: u32 = 10;

/// Resolve a handle to an account.
///
/// A leading `@` is stripped. A handle containing `@` after that
/// (`user@otherhost`) is treated as remote and matched against candidate
/// `acct` values verbatim; a bare handle is treated as local, searched as
/// `@handle`, and matched only against local candidates' `acct` or
/// `username`. All matching is case-insensitive.
///
/// # Errors
///
/// Returns `PlatformError::AccountNotFound` when the search yields no
/// candidates at all, and propagates search failures unchanged.
pub async fn resolve_account(source: &dyn StatusSource, handle: &str) -> Result<Account> {
    let handle = handle.strip_prefix('@').unwrap_or(handle);
    let is_remote = handle.contains('@');
    let query = if is_remote {
        handle.to_string()
    } else {
        format!("@{}", handle)
    };

    let candidates = source.search_accounts(&query, SEARCH_LIMIT).await?;

    let exact = if is_remote {
        candidates
            .iter()
            .find(|a| a.acct.eq_ignore_ascii_case(handle))
    } else {
        candidates.iter().find(|a| {
            !a.is_remote()
                && (a.acct.eq_ignore_ascii_case(handle)
                    || a.username.eq_ignore_ascii_case(handle))
        })
    }
    .cloned();

    if let Some(account) = exact {
        debug!(
            "Resolved handle '{}' to account {} ({})",
            handle, account.id, account.acct
        );
        return Ok(account);
    }

    match candidates.into_iter().next() {
        Some(first) => {
            warn!(
                "No exact match for handle '{}'; using first search candidate {} ({})",
                handle, first.id, first.acct
            );
            Ok(first)
        }
        None => Err(PlatformError::AccountNotFound(format!(
            "no account matching '{}'",
            handle
        ))
        .into()),
    }
}
