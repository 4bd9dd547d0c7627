//! Error types for Omnicast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmnicastError>;

#[derive(Error, Debug)]
pub enum OmnicastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Linking error: {0}")]
    Link(#[from] LinkError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl OmnicastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            OmnicastError::Validation(_) | OmnicastError::InvalidInput(_) => 3,
            OmnicastError::Link(_) => 2,
            OmnicastError::Config(_)
            | OmnicastError::Database(_)
            | OmnicastError::Provider(_)
            | OmnicastError::Generation(_) => 1,
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
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Column encoding failed: {0}")]
    EncodingError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures from a provider adapter. Always tagged with the platform so the
/// caller can say which integration failed and why.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Adapter is missing required credentials or configuration. Operator
    /// fixable, never retried automatically.
    #[error("{platform} is not configured: {message}")]
    Config { platform: String, message: String },

    /// Upstream rejected the request with a non-success status.
    #[error("{platform} returned {status}: {message}")]
    Http {
        platform: String,
        status: u16,
        message: String,
    },

    /// Transport failure (connect error, timeout). Counts as that single
    /// platform's failure only.
    #[error("{platform} network error: {message}")]
    Network { platform: String, message: String },

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// CSRF state is missing, expired, or already consumed. The user must
    /// restart the authorize flow.
    #[error("OAuth state is missing, expired, or already used")]
    InvalidState,

    #[error("redirect URI does not match the one used to request authorization")]
    RedirectUriMismatch,

    /// Refusing to disconnect the user's only remaining sign-in identity.
    #[error("cannot disconnect the only remaining sign-in identity")]
    LastIdentity,

    #[error("no linked account for platform: {0}")]
    AccountNotFound(String),

    /// Upstream identity layer rejected the operation.
    #[error("identity provider error: {0}")]
    Identity(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content cannot be empty when no media is attached")]
    EmptyContent,

    #[error("at least one account must be selected")]
    NoAccounts,

    #[error("a signed-in user is required to schedule a post")]
    AuthRequired,

    #[error("scheduled time must be more than {0} minutes from now")]
    ScheduleTooSoon(i64),
}

/// Failure from the external content-generation collaborator.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct GenerationError(pub String);
