//! Error types for hostpilot.

use thiserror::Error;

/// Primary error type for fallible hostpilot operations.
///
/// Errors never cross the orchestration boundary: provider failures are
/// folded into a failed [`ProviderResponse`](crate::provider::ProviderResponse)
/// and bridge/tool failures into a failed [`ToolResult`](crate::types::ToolResult).
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Failed to signal host: {0}")]
    Signal(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Host,
    Unknown,
}

impl PilotError {
    /// Create an API error from a status code and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::ModelNotFound(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::HostUnavailable(_) | Self::Signal(_) => ErrorCategory::Host,
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PilotError>;
