use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the sync service
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Sync token expired for calendar {0}")]
    #[diagnostic(code(calsync::token_expired))]
    TokenExpired(String),

    #[error("Authorization required: {0}")]
    #[diagnostic(
        code(calsync::unauthorized),
        help("Hand the service a fresh refresh token (GOOGLE_REFRESH_TOKEN)")
    )]
    Unauthorized(String),

    #[error("Calendar provider error: {0}")]
    #[diagnostic(code(calsync::provider))]
    Provider(String),

    #[error("Cache unavailable: {0}")]
    #[diagnostic(code(calsync::cache))]
    CacheUnavailable(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(calsync::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(calsync::config))]
    Config(String),

    #[error(transparent)]
    #[diagnostic(code(calsync::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(calsync::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(calsync::other))]
    Other(String),
}

impl Error {
    /// Whether the error means the credential is no longer usable
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Provider(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::CacheUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type SyncResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create provider errors
pub fn provider_error(message: &str) -> Error {
    Error::Provider(message.to_string())
}

/// Helper to create cache errors
pub fn cache_error(message: &str) -> Error {
    Error::CacheUnavailable(message.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
