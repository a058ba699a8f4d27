//! Configuration management for Fedimime

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::Visibility;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub publish: Option<PublishConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// The account whose voice gets mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub instance: String,
    pub token_file: String,
    /// Handle to mirror: `name` for a local account, `name@host` for a
    /// remote one. A leading `@` is tolerated.
    pub handle: String,
}

/// The account generated posts are published through. Optional; with no
/// `[publish]` section (or `enabled = false`) runs stop after generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory; defaults to `{data_dir}/fedimime`.
    pub dir: Option<String>,
    /// Cap on cached corpus texts per account.
    pub max_corpus: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_corpus: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider registry name: gemini, openai, anthropic, ollama, openrouter.
    pub provider: String,
    #[serde(default)]
    pub fallback_provider: Option<String>,
    /// Ask the provider for a schema-constrained JSON completion.
    #[serde(default)]
    pub structured: bool,
    /// Run a second refinement pass over the first completion.
    #[serde(default)]
    pub two_pass: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub instruction_file: Option<String>,
    #[serde(default)]
    pub refine_instruction: Option<String>,
    #[serde(default)]
    pub refine_instruction_file: Option<String>,
    /// Appended to the final text as ` {tag}`; empty string disables.
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_backoff_secs() -> u64 {
    1
}

fn default_sample_size() -> usize {
    500
}

fn default_history_limit() -> usize {
    5
}

fn default_temperature() -> f64 {
    0.7
}

fn default_tag() -> String {
    "#bot".to_string()
}

impl GenerationConfig {
    /// The first-pass system instruction, inline value taking precedence
    /// over `instruction_file`.
    pub fn instruction_text(&self) -> Result<String> {
        match (&self.instruction, &self.instruction_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => read_text_file(path, "generation.instruction_file"),
            (None, None) => Err(ConfigError::MissingField(
                "generation.instruction or generation.instruction_file".to_string(),
            )
            .into()),
        }
    }

    /// The second-pass system instruction, or `None` when not configured.
    pub fn refine_instruction_text(&self) -> Result<Option<String>> {
        match (&self.refine_instruction, &self.refine_instruction_file) {
            (Some(text), _) => Ok(Some(text.clone())),
            (None, Some(path)) => {
                read_text_file(path, "generation.refine_instruction_file").map(Some)
            }
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub gemini: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
    pub openrouter: Option<ProviderConfig>,
}

/// One `[providers.*]` section. All fields optional at parse time; what is
/// actually required depends on the backend (ollama needs no key, the rest
/// do) and is enforced when the backend is built.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_key_file: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Shape-level validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if self.source.instance.trim().is_empty() {
            return Err(ConfigError::MissingField("source.instance".to_string()).into());
        }
        if self.source.token_file.trim().is_empty() {
            return Err(ConfigError::MissingField("source.token_file".to_string()).into());
        }
        if self.source.handle.trim().is_empty() {
            return Err(ConfigError::MissingField("source.handle".to_string()).into());
        }
        if self.generation.provider.trim().is_empty() {
            return Err(ConfigError::MissingField("generation.provider".to_string()).into());
        }
        if self.generation.instruction.is_none() && self.generation.instruction_file.is_none() {
            return Err(ConfigError::MissingField(
                "generation.instruction or generation.instruction_file".to_string(),
            )
            .into());
        }
        if self.generation.two_pass
            && self.generation.refine_instruction.is_none()
            && self.generation.refine_instruction_file.is_none()
        {
            return Err(ConfigError::Invalid(
                "generation.two_pass requires refine_instruction or refine_instruction_file"
                    .to_string(),
            )
            .into());
        }
        if let Some(publish) = &self.publish {
            if publish.enabled {
                if publish.instance.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(ConfigError::MissingField("publish.instance".to_string()).into());
                }
                if publish.token_file.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(
                        ConfigError::MissingField("publish.token_file".to_string()).into(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Whether this configuration publishes generated posts.
    pub fn publishing_enabled(&self) -> bool {
        self.publish.as_ref().map(|p| p.enabled).unwrap_or(false)
    }
}

impl CacheConfig {
    /// Resolve the cache root, creating nothing. Follows XDG when no
    /// explicit directory is configured.
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(PathBuf::from(shellexpand::tilde(dir).to_string()));
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

        Ok(data_dir.join("fedimime"))
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("FEDIMIME_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("fedimime").join("config.toml"))
}

/// Read a config-referenced text file (instruction prompts), with shell
/// expansion on the path.
fn read_text_file(path: &str, field: &str) -> Result<String> {
    let expanded = shellexpand::full(path)
        .map_err(|e| ConfigError::Invalid(format!("cannot expand {} '{}': {}", field, path, e)))?;
    let content = std::fs::read_to_string(expanded.as_ref()).map_err(ConfigError::ReadError)?;
    if content.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} '{}' is empty", field, path)).into());
    }
    Ok(content.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[source]
instance = "https://mastodon.example"
token_file = "/tmp/token"
handle = "ambi"

[generation]
provider = "gemini"
instruction = "Write one post in the account's voice."
"#;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();

        assert_eq!(config.source.handle, "ambi");
        assert!(config.publish.is_none());
        assert!(!config.publishing_enabled());
        assert_eq!(config.cache.max_corpus, 3000);
        assert_eq!(config.generation.max_retries, 10);
        assert_eq!(config.generation.retry_backoff_secs, 1);
        assert_eq!(config.generation.sample_size, 500);
        assert_eq!(config.generation.history_limit, 5);
        assert_eq!(config.generation.tag, "#bot");
        assert!(!config.generation.structured);
        assert!(!config.generation.two_pass);
        assert!(config.providers.gemini.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_full_config_parses() {
        let toml_str = r##"
[source]
instance = "https://mastodon.example"
token_file = "~/.config/fedimime/source_token"
handle = "someone@example.org"

[publish]
enabled = true
instance = "https://botsin.example"
token_file = "~/.config/fedimime/publish_token"
visibility = "unlisted"

[cache]
dir = "/var/cache/fedimime"
max_corpus = 1200

[generation]
provider = "gemini"
fallback_provider = "openai"
structured = true
two_pass = true
max_retries = 3
retry_backoff_secs = 2
sample_size = 200
history_limit = 8
temperature = 0.9
instruction = "Mimic the voice."
refine_instruction = "Polish it."
tag = "#mimic"

[providers.gemini]
api_key = "g-key"
model = "gemini-2.0-flash"

[providers.openai]
api_key_file = "~/.config/fedimime/openai_key"
"##;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        assert!(config.publishing_enabled());
        assert_eq!(
            config.publish.as_ref().unwrap().visibility,
            Visibility::Unlisted
        );
        assert_eq!(config.cache.max_corpus, 1200);
        assert_eq!(
            config.generation.fallback_provider.as_deref(),
            Some("openai")
        );
        assert_eq!(
            config.providers.gemini.as_ref().unwrap().api_key.as_deref(),
            Some("g-key")
        );
        assert_eq!(
            config.cache.resolve_dir().unwrap(),
            PathBuf::from("/var/cache/fedimime")
        );
    }

    #[test]
    fn test_missing_source_section_fails_parse() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
[generation]
provider = "gemini"
instruction = "x"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_handle() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.source.handle = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("source.handle"));
    }

    #[test]
    fn test_validate_rejects_enabled_publish_without_instance() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.publish = Some(PublishConfig {
            enabled: true,
            instance: None,
            token_file: Some("/tmp/t".to_string()),
            visibility: Visibility::Public,
        });

        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("publish.instance"));
    }

    #[test]
    fn test_validate_allows_disabled_publish_without_fields() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.publish = Some(PublishConfig {
            enabled: false,
            instance: None,
            token_file: None,
            visibility: Visibility::Public,
        });

        config.validate().unwrap();
        assert!(!config.publishing_enabled());
    }

    #[test]
    fn test_validate_rejects_two_pass_without_refine_instruction() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.generation.two_pass = true;

        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("refine_instruction"));
    }

    #[test]
    fn test_validate_requires_some_instruction() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.generation.instruction = None;
        config.generation.instruction_file = None;

        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("generation.instruction"));
    }

    #[test]
    fn test_instruction_text_prefers_inline() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.generation.instruction_file = Some("/nonexistent/never-read".to_string());

        let text = config.generation.instruction_text().unwrap();
        assert_eq!(text, "Write one post in the account's voice.");
    }

    #[test]
    fn test_instruction_text_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Speak like the archive.").unwrap();

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.generation.instruction = None;
        config.generation.instruction_file =
            Some(file.path().to_string_lossy().into_owned());

        let text = config.generation.instruction_text().unwrap();
        assert_eq!(text, "Speak like the archive.");
    }

    #[test]
    fn test_instruction_file_empty_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.generation.instruction = None;
        config.generation.instruction_file =
            Some(file.path().to_string_lossy().into_owned());

        assert!(config.generation.instruction_text().is_err());
    }

    #[test]
    fn test_refine_instruction_none_when_unconfigured() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.generation.refine_instruction_text().unwrap(), None);
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_config_path_env_override() {
        std::env::set_var("FEDIMIME_CONFIG", "/tmp/fedimime-test.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("FEDIMIME_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/fedimime-test.toml"));
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_config_path_default_location() {
        std::env::remove_var("FEDIMIME_CONFIG");
        let path = resolve_config_path().unwrap();

        let s = path.to_string_lossy();
        assert!(s.ends_with("fedimime/config.toml") || s.ends_with("fedimime\\config.toml"));
    }

    #[test]
    fn test_load_from_path_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // Parses fine but fails validation: two_pass with no refine prompt
        write!(
            file,
            r#"
[source]
instance = "https://mastodon.example"
token_file = "/tmp/token"
handle = "ambi"

[generation]
provider = "gemini"
instruction = "x"
two_pass = true
"#
        )
        .unwrap();

        let result = Config::load_from_path(&file.path().to_path_buf());
        assert!(result.is_err());
    }
}
