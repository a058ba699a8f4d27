//! Error types for Fedimime

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FedimimeError>;

#[derive(Error, Debug)]
pub enum FedimimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl FedimimeError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            FedimimeError::Platform(PlatformError::AccountNotFound(_)) => 3,
            FedimimeError::Platform(PlatformError::Authentication(_)) => 2,
            FedimimeError::Provider(ProviderError::Credentials(_)) => 2,
            FedimimeError::Platform(_) => 1,
            FedimimeError::Provider(_) => 1,
            FedimimeError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    Unknown(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider credentials error: {0}")]
    Credentials(String),

    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },

    #[error("{provider} blocked the completion as recitation")]
    Recitation { provider: String },

    #[error("{provider} returned an unusable completion: {message}")]
    Malformed { provider: String, message: String },

    #[error("{provider} network error: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} exhausted after {attempts} attempts: {last}")]
    Exhausted {
        provider: String,
        attempts: u32,
        last: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_account_not_found() {
        let error = FedimimeError::Platform(PlatformError::AccountNotFound(
            "no account matching 'ghost@nowhere.example'".to_string(),
        ));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_platform_authentication() {
        let error = FedimimeError::Platform(PlatformError::Authentication(
            "token rejected".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_provider_credentials() {
        let error = FedimimeError::Provider(ProviderError::Credentials(
            "gemini: api_key_file is empty".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        let posting = FedimimeError::Platform(PlatformError::Posting("rejected".to_string()));
        assert_eq!(posting.exit_code(), 1);

        let network = FedimimeError::Platform(PlatformError::Network("refused".to_string()));
        assert_eq!(network.exit_code(), 1);

        let rate_limit = FedimimeError::Platform(PlatformError::RateLimit("429".to_string()));
        assert_eq!(rate_limit.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_other_provider_errors() {
        let unknown = FedimimeError::Provider(ProviderError::Unknown("grok".to_string()));
        assert_eq!(unknown.exit_code(), 1);

        let api = FedimimeError::Provider(ProviderError::Api {
            provider: "openai".to_string(),
            message: "500".to_string(),
        });
        assert_eq!(api.exit_code(), 1);

        let recitation = FedimimeError::Provider(ProviderError::Recitation {
            provider: "gemini".to_string(),
        });
        assert_eq!(recitation.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = FedimimeError::Config(ConfigError::MissingField("source.handle".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = FedimimeError::Config(ConfigError::MissingField("source.instance".to_string()));
        let message = format!("{}", error);
        assert_eq!(
            message,
            "Configuration error: Missing required field: source.instance"
        );
    }

    #[test]
    fn test_error_message_formatting_account_not_found() {
        let error = FedimimeError::Platform(PlatformError::AccountNotFound(
            "no account matching 'ambi'".to_string(),
        ));
        let message = format!("{}", error);
        assert_eq!(
            message,
            "Platform error: Account not found: no account matching 'ambi'"
        );
    }

    #[test]
    fn test_error_message_formatting_recitation() {
        let error = ProviderError::Recitation {
            provider: "gemini".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "gemini blocked the completion as recitation"
        );
    }

    #[test]
    fn test_error_message_formatting_exhausted() {
        let error = ProviderError::Exhausted {
            provider: "openai".to_string(),
            attempts: 10,
            last: "openai API error: 503".to_string(),
        };
        let message = format!("{}", error);
        assert!(message.contains("openai"));
        assert!(message.contains("10 attempts"));
        assert!(message.contains("503"));
    }

    #[test]
    fn test_error_conversion_from_config_error() {
        let config_error = ConfigError::MissingField("test".to_string());
        let error: FedimimeError = config_error.into();

        match error {
            FedimimeError::Config(_) => {}
            _ => panic!("Expected FedimimeError::Config"),
        }
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Network("test".to_string());
        let error: FedimimeError = platform_error.into();

        match error {
            FedimimeError::Platform(_) => {}
            _ => panic!("Expected FedimimeError::Platform"),
        }
    }

    #[test]
    fn test_error_conversion_from_provider_error() {
        let provider_error = ProviderError::Unknown("test".to_string());
        let error: FedimimeError = provider_error.into();

        match error {
            FedimimeError::Provider(_) => {}
            _ => panic!("Expected FedimimeError::Provider"),
        }
    }

    #[test]
    fn test_platform_error_variants_format() {
        let auth = PlatformError::Authentication("bad token".to_string());
        assert_eq!(format!("{}", auth), "Authentication failed: bad token");

        let posting = PlatformError::Posting("rejected".to_string());
        assert_eq!(format!("{}", posting), "Posting failed: rejected");

        let network = PlatformError::Network("connection refused".to_string());
        assert_eq!(format!("{}", network), "Network error: connection refused");

        let rate_limit = PlatformError::RateLimit("slow down".to_string());
        assert_eq!(format!("{}", rate_limit), "Rate limit exceeded: slow down");
    }

    #[test]
    fn test_provider_error_with_context() {
        let error = ProviderError::Api {
            provider: "anthropic".to_string(),
            message: "Mimic generation failed (first pass): status 529".to_string(),
        };
        let message = format!("{}", error);
        assert!(message.contains("anthropic"));
        assert!(message.contains("first pass"));
        assert!(message.contains("529"));
    }

    #[test]
    fn test_error_chain_preserves_context() {
        let platform_error =
            PlatformError::Network("Mastodon timeline fetch failed (page 3): timeout".to_string());
        let error: FedimimeError = platform_error.into();

        let message = format!("{}", error);
        assert!(message.contains("Mastodon"));
        assert!(message.contains("page 3"));
        assert!(message.contains("timeout"));
    }

    #[test]
    fn test_exit_code_consistency() {
        // Authentication failures on either side of the system use exit code 2
        let platform_auth =
            FedimimeError::Platform(PlatformError::Authentication("a".to_string()));
        let provider_creds =
            FedimimeError::Provider(ProviderError::Credentials("b".to_string()));
        assert_eq!(platform_auth.exit_code(), provider_creds.exit_code());
        assert_eq!(platform_auth.exit_code(), 2);

        // Resolution failure is the invalid-input class
        let not_found =
            FedimimeError::Platform(PlatformError::AccountNotFound("c".to_string()));
        assert_eq!(not_found.exit_code(), 3);

        // Everything else is a plain failure
        let config = FedimimeError::Config(ConfigError::Invalid("d".to_string()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_platform_error_clone() {
        // Retry logic holds onto the last error while it keeps attempting
        let original = PlatformError::Network("connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_provider_error_clone() {
        let original = ProviderError::Recitation {
            provider: "gemini".to_string(),
        };
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_error_debug_output() {
        let error = FedimimeError::Provider(ProviderError::Malformed {
            provider: "ollama".to_string(),
            message: "empty completion".to_string(),
        });

        let debug_output = format!("{:?}", error);
        assert!(debug_output.contains("Provider"));
        assert!(debug_output.contains("Malformed"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<String> {
            Ok("generated".to_string())
        }

        fn returns_err() -> Result<String> {
            Err(FedimimeError::Provider(ProviderError::Unknown(
                "test".to_string(),
            )))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
