//! Error types for the servlet resolver

use thiserror::Error;

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Error types that can occur in the resolver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolverError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Content fixture error: {0}")]
    FixtureError(String),

    #[error("Error handler {handler} failed with I/O error: {message}")]
    ErrorHandlerIo { handler: String, message: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl From<std::io::Error> for ResolverError {
    fn from(err: std::io::Error) -> Self {
        ResolverError::IoError(err.to_string())
    }
}

impl From<prometheus::Error> for ResolverError {
    fn from(err: prometheus::Error) -> Self {
        ResolverError::MetricsError(err.to_string())
    }
}

impl ResolverError {
    /// Create an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ResolverError::InvalidArgument(message.into())
    }

    /// Convert error to HTTP status code
    ///
    /// Resolution itself never fails a request; these codes only apply to
    /// the fallible administrative surfaces.
    pub fn to_http_status(&self) -> u16 {
        match self {
            ResolverError::InvalidArgument(_) => 400,
            ResolverError::ErrorHandlerIo { .. } => 500,
            ResolverError::ConfigError(_) => 500,
            ResolverError::FixtureError(_) => 500,
            ResolverError::IoError(_) => 500,
            ResolverError::MetricsError(_) => 500,
        }
    }
}

/// Errors raised by handlers themselves
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// The handler could not write to the client
    #[error("I/O failure: {0}")]
    Io(String),

    /// The handler failed while processing the request
    #[error("handler failed: {0}")]
    Failed(String),

    /// Initialization was refused
    #[error("initialization failed: {0}")]
    Init(String),
}

impl HandlerError {
    /// Whether this error must be forwarded to the caller of the error handler
    pub fn is_io(&self) -> bool {
        matches!(self, HandlerError::Io(_))
    }
}
