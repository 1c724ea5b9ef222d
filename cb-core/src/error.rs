//! Global error types for the CleanBiz backend.
//!
//! All error categories across the workspace are unified into a single
//! `CbError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using CbError.
pub type CbResult<T> = Result<T, CbError>;

/// Unified error type covering all error categories in CleanBiz.
#[derive(Error, Debug)]
pub enum CbError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Database errors --
    /// SQLite database error.
    #[error("database error: {0}")]
    Database(String),

    /// Database migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database connection pool error.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Database integrity check failed.
    #[error("database integrity check failed: {0}")]
    IntegrityCheck(String),

    // -- Network errors --
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// HTTP request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Remote service returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from the remote service.
        message: String,
    },

    /// Authentication against a remote service failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The language model returned something unusable.
    #[error("llm error: {0}")]
    Llm(String),

    // -- Domain errors --
    /// Input failed a business rule or could not be parsed.
    #[error("{0}")]
    Validation(String),

    /// A record looked up by its public id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. "booking".
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// No cleaner can take the requested slot.
    #[error("{0}")]
    Unavailable(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Service errors --
    /// A service failed to initialize.
    #[error("service init error: {0}")]
    ServiceInit(String),

    /// A service is not yet initialized.
    #[error("service not initialized: {0}")]
    ServiceNotInitialized(String),

    /// A service operation failed.
    #[error("service error: {0}")]
    Service(String),

    // -- Notification errors --
    /// SMS or call delivery failed.
    #[error("notification error: {0}")]
    Notification(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CbError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CbError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether this error is caused by caller input rather than the system.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            CbError::Validation(_) | CbError::NotFound { .. } | CbError::Unavailable(_)
        )
    }
}

impl From<serde_json::Error> for CbError {
    fn from(e: serde_json::Error) -> Self {
        CbError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CbError {
    fn from(e: toml::de::Error) -> Self {
        CbError::Config(e.to_string())
    }
}

impl From<chrono::ParseError> for CbError {
    fn from(e: chrono::ParseError) -> Self {
        CbError::Validation(format!("invalid date or time: {e}"))
    }
}
