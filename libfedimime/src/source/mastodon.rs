//! Mastodon-compatible source and publisher
//!
//! Backed by the megalodon library, so anything speaking the Mastodon API
//! works: Mastodon, Pleroma, Friendica, Firefish, GoToSocial, Akkoma.

use std::time::Duration;

use async_trait::async_trait;
use megalodon::{Megalodon, SNS};
use tokio::time::timeout;
use tracing::debug;

use crate::config::{PublishConfig, SourceConfig};
use crate::error::{ConfigError, PlatformError, Result};
use crate::source::{StatusPage, StatusPublisher, StatusSource};
use crate::types::{Account, SourceStatus, Visibility};

/// Deadline for every remote call. megalodon exposes no timeout knob, so
/// calls are raced against this externally.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Read side of a Mastodon-compatible instance: account search and
/// timeline paging for the mirrored account.
pub struct MastodonSource {
    client: Box<dyn Megalodon + Send + Sync>,
    instance_url: String,
}

impl MastodonSource {
    /// Create a source client for an instance.
    ///
    /// # Arguments
    ///
    /// * `instance_url` - Base URL of the instance; a bare host gets an
    ///   `https://` prefix
    /// * `access_token` - OAuth access token for the API
    pub fn new(instance_url: String, access_token: String) -> Result<Self> {
        let instance_url = normalize_instance_url(&instance_url);
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token),
            None,
        )
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to create Mastodon client: {:?}", e))
        })?;

        Ok(Self {
            client,
            instance_url,
        })
    }

    /// Create a source client from configuration, reading the access token
    /// from the configured token file.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the token file cannot be
    /// read or is empty.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use libfedimime::source::mastodon::MastodonSource;
    /// use libfedimime::config::SourceConfig;
    ///
    /// # fn example() -> libfedimime::error::Result<()> {
    /// let config = SourceConfig {
    ///     instance: "mastodon.social".to_string(),
    ///     token_file: "~/.config/fedimime/source_token".to_string(),
    ///     handle: "someone".to_string(),
    /// };
    ///
    /// let source = MastodonSource::from_config(&config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let token = read_token_file(&config.token_file)?;
        Self::new(config.instance.clone(), token)
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }
}

impl std::fmt::Debug for MastodonSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonSource")
            .field("instance_url", &self.instance_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StatusSource for MastodonSource {
    async fn search_accounts(&self, query: &str, limit: u32) -> Result<Vec<Account>> {
        let options = megalodon::megalodon::SearchInputOptions {
            r#type: Some(megalodon::megalodon::SearchType::Accounts),
            limit: Some(limit),
            ..Default::default()
        };

        let response = timeout(
            CALL_TIMEOUT,
            self.client.search(query.to_string(), Some(&options)),
        )
        .await
        .map_err(|_| elapsed_error("account search"))?
        .map_err(|e| map_megalodon_error(e, "account search"))?;

        let accounts = response
            .json
            .accounts
            .into_iter()
            .map(map_account)
            .collect::<Vec<_>>();
        debug!("Account search '{}' returned {} candidates", query, accounts.len());
        Ok(accounts)
    }

    async fn account_statuses(
        &self,
        account_id: &str,
        page: &StatusPage,
    ) -> Result<Vec<SourceStatus>> {
        let options = megalodon::megalodon::GetAccountStatusesInputOptions {
            limit: Some(page.limit),
            since_id: page.since_id.clone(),
            max_id: page.max_id.clone(),
            ..Default::default()
        };

        let response = timeout(
            CALL_TIMEOUT,
            self.client
                .get_account_statuses(account_id.to_string(), Some(&options)),
        )
        .await
        .map_err(|_| elapsed_error("timeline fetch"))?
        .map_err(|e| map_megalodon_error(e, "timeline fetch"))?;

        Ok(response.json.into_iter().map(map_status).collect())
    }
}

/// Write side of a Mastodon-compatible instance, usually a different
/// account (and often a different instance) than the source.
pub struct MastodonPublisher {
    client: Box<dyn Megalodon + Send + Sync>,
}

impl MastodonPublisher {
    pub fn new(instance_url: String, access_token: String) -> Result<Self> {
        let instance_url = normalize_instance_url(&instance_url);
        let client = megalodon::generator(SNS::Mastodon, instance_url, Some(access_token), None)
            .map_err(|e| {
                PlatformError::Authentication(format!(
                    "Failed to create Mastodon publish client: {:?}",
                    e
                ))
            })?;

        Ok(Self { client })
    }

    /// Create a publisher from an enabled `[publish]` section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` when the section lacks an
    /// instance or token file, and `PlatformError::Authentication` when the
    /// token file cannot be read or is empty.
    pub fn from_config(config: &PublishConfig) -> Result<Self> {
        let instance = config
            .instance
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("publish.instance".to_string()))?;
        let token_file = config
            .token_file
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("publish.token_file".to_string()))?;

        let token = read_token_file(token_file)?;
        Self::new(instance.to_string(), token)
    }
}

impl std::fmt::Debug for MastodonPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonPublisher").finish_non_exhaustive()
    }
}

#[async_trait]
impl StatusPublisher for MastodonPublisher {
    async fn publish(&self, text: &str, visibility: Visibility) -> Result<String> {
        let options = megalodon::megalodon::PostStatusInputOptions {
            visibility: Some(to_megalodon_visibility(visibility)),
            ..Default::default()
        };

        let response = timeout(
            CALL_TIMEOUT,
            self.client.post_status(text.to_string(), Some(&options)),
        )
        .await
        .map_err(|_| elapsed_error("post status"))?
        .map_err(|e| map_megalodon_error(e, "post status"))?;

        let status_id = match response.json {
            megalodon::megalodon::PostStatusOutput::Status(status) => status.id,
            megalodon::megalodon::PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };

        debug!("Published status {}", status_id);
        Ok(status_id)
    }
}

/// Expand the token file path and read a non-empty token from it.
fn read_token_file(token_file: &str) -> Result<String> {
    let token_path = shellexpand::full(token_file).map_err(|e| {
        PlatformError::Authentication(format!(
            "Failed to expand token file path '{}': {}",
            token_file, e
        ))
    })?;

    let token = std::fs::read_to_string(token_path.as_ref())
        .map_err(|e| {
            PlatformError::Authentication(format!(
                "Failed to read token file '{}': {}",
                token_file, e
            ))
        })?
        .trim()
        .to_string();

    if token.is_empty() {
        return Err(PlatformError::Authentication(format!(
            "Token file '{}' is empty",
            token_file
        ))
        .into());
    }

    Ok(token)
}

fn normalize_instance_url(instance: &str) -> String {
    if instance.starts_with("http://") || instance.starts_with("https://") {
        instance.to_string()
    } else {
        format!("https://{}", instance)
    }
}

fn map_account(account: megalodon::entities::Account) -> Account {
    Account {
        id: account.id,
        acct: account.acct,
        username: account.username,
    }
}

fn map_status(status: megalodon::entities::Status) -> SourceStatus {
    SourceStatus {
        id: status.id,
        content: status.content,
        is_reblog: status.reblog.is_some(),
        replies_count: status.replies_count,
        visibility: from_megalodon_visibility(&status.visibility),
    }
}

fn from_megalodon_visibility(v: &megalodon::entities::StatusVisibility) -> Visibility {
    use megalodon::entities::StatusVisibility as SV;
    match v {
        SV::Public => Visibility::Public,
        SV::Unlisted => Visibility::Unlisted,
        SV::Direct => Visibility::Direct,
        // Private, plus anything platform-specific megalodon may grow
        _ => Visibility::Private,
    }
}

fn to_megalodon_visibility(v: Visibility) -> megalodon::entities::StatusVisibility {
    use megalodon::entities::StatusVisibility as SV;
    match v {
        Visibility::Public => SV::Public,
        Visibility::Unlisted => SV::Unlisted,
        Visibility::Private => SV::Private,
        Visibility::Direct => SV::Direct,
    }
}

fn elapsed_error(context: &str) -> PlatformError {
    PlatformError::Network(format!(
        "Mastodon {} timed out after {}s",
        context,
        CALL_TIMEOUT.as_secs()
    ))
}

/// Map megalodon errors to PlatformError
///
/// # Error Mapping
///
/// - HTTP 401/403 → `PlatformError::Authentication`
/// - HTTP 404 → `PlatformError::AccountNotFound`
/// - HTTP 429 → `PlatformError::RateLimit`
/// - HTTP 5xx and everything else → `PlatformError::Network`
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    let error_str = error.to_string();
    let error_lower = error_str.to_lowercase();

    match extract_http_status(&error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon {} failed: {}. Check that the access token is valid and has not expired.",
            context, error_str
        )),
        Some(404) => PlatformError::AccountNotFound(format!(
            "Mastodon {} failed: {}",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon {} failed: {}. Wait a few minutes before retrying.",
            context, error_str
        )),
        Some(_) => PlatformError::Network(format!("Mastodon {} failed: {}", context, error_str)),
        None => {
            if error_lower.contains("unauthorized")
                || error_lower.contains("forbidden")
                || error_lower.contains("token")
            {
                PlatformError::Authentication(format!(
                    "Mastodon {} failed: {}. Check that the access token is valid.",
                    context, error_str
                ))
            } else if error_lower.contains("rate limit")
                || error_lower.contains("too many requests")
            {
                PlatformError::RateLimit(format!("Mastodon {} failed: {}", context, error_str))
            } else {
                PlatformError::Network(format!("Mastodon {} failed: {}", context, error_str))
            }
        }
    }
}

/// Find a standalone three-digit HTTP status code in an error message.
fn extract_http_status(error_str: &str) -> Option<u16> {
    let bytes = error_str.as_bytes();
    for i in 0..bytes.len().saturating_sub(2) {
        if !bytes[i..i + 3].iter().all(|b| b.is_ascii_digit()) {
            continue;
        }
        // Standalone: not part of a longer digit run
        let bounded_before = i == 0 || !bytes[i - 1].is_ascii_digit();
        let bounded_after = i + 3 == bytes.len() || !bytes[i + 3].is_ascii_digit();
        if !bounded_before || !bounded_after {
            continue;
        }
        if let Ok(code) = error_str[i..i + 3].parse::<u16>() {
            if (100..=599).contains(&code) {
                return Some(code);
            }
        }
    }
    None
}
