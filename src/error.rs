use std::path::PathBuf;
use thiserror::Error;

// Define our own Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the API layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    // External library errors with automatic conversion
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Metrics errors with context
    #[error("Metrics error: {message}")]
    Metrics {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Configuration errors with location info
    #[error("Configuration error at {location}: {message}")]
    Config {
        message: String,
        location: String,
        suggestion: Option<String>,
    },

    // Lookup errors
    #[error("Service '{name}' not found")]
    ServiceNotFound { name: String },

    #[error("No conditions available for protocol '{protocol}'")]
    ProtocolNotFound { protocol: String },

    // File system errors
    #[error("File operation failed on {}: {operation}", path.display())]
    FileOperation {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    // Module-specific errors that will be converted from module error types
    #[error(transparent)]
    DatabaseModule(#[from] crate::database::error::DatabaseError),

    #[error(transparent)]
    ManagerModule(#[from] crate::manager::error::ManagerError),

    #[error(transparent)]
    ValidationModule(#[from] crate::rules::validation::error::ValidationError),

    #[error(transparent)]
    BootstrapModule(#[from] crate::bootstrap::error::BootstrapError),
}

// Helper methods for creating errors with context
impl Error {
    // Configuration error constructors
    pub fn config_with_suggestion(
        message: impl Into<String>,
        location: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Config {
            message: message.into(),
            location: location.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    // Lookup error constructors
    pub fn service_not_found(name: impl Into<String>) -> Self {
        Self::ServiceNotFound { name: name.into() }
    }

    pub fn protocol_not_found(protocol: impl Into<String>) -> Self {
        Self::ProtocolNotFound {
            protocol: protocol.into(),
        }
    }

    pub fn file_operation(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::FileOperation {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    // Metrics error constructor
    pub fn metrics(message: impl Into<String>) -> Self {
        Self::Metrics {
            message: message.into(),
            source: None,
        }
    }

    /// Classify the error for the caller-facing surface.
    pub fn kind(&self) -> ErrorKind {
        use crate::bootstrap::error::BootstrapError;

        match self {
            Self::ServiceNotFound { .. } | Self::ProtocolNotFound { .. } => ErrorKind::NotFound,
            Self::Json(_) | Self::ValidationModule(_) => ErrorKind::BadRequest,
            Self::ManagerModule(e) if e.is_client_error() => ErrorKind::BadRequest,
            Self::BootstrapModule(e) => match e {
                BootstrapError::UnknownActionType { .. }
                | BootstrapError::InvalidFileName { .. }
                | BootstrapError::InvalidManifest { .. } => ErrorKind::BadRequest,
                _ => ErrorKind::Internal,
            },
            Self::Yaml(_)
            | Self::Io(_)
            | Self::Metrics { .. }
            | Self::Config { .. }
            | Self::FileOperation { .. }
            | Self::DatabaseModule(_)
            | Self::ManagerModule(_) => ErrorKind::Internal,
        }
    }
}
