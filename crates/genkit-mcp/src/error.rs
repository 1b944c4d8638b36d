//! Error types for the MCP resource bridge

use std::time::Duration;
use thiserror::Error;

/// Result type for MCP resource bridge operations
pub type McpResult<T> = Result<T, McpError>;

/// Error type for template registration, extraction and resource reads.
///
/// Matching itself never produces an error: a URI that matches nothing is
/// reported as `None` by the matcher.
#[derive(Error, Debug)]
pub enum McpError {
    /// Malformed template rejected at registration time
    #[error("Invalid URI template '{pattern}': {reason}")]
    InvalidTemplate { pattern: String, reason: String },

    /// A URI was forced onto a template it does not match
    #[error("URI '{uri}' does not match template '{pattern}'")]
    NoMatch { uri: String, pattern: String },

    /// Expansion was asked for a variable it was not given
    #[error("Missing value for template variable '{0}'")]
    MissingVariable(String),

    /// Remote provider could not be enumerated or is marked unusable
    #[error("Provider '{provider}' unavailable: {source}")]
    ProviderUnavailable {
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// Content read failed for a matched resource
    #[error("Failed to read resource '{uri}': {source}")]
    FetchFailed {
        uri: String,
        #[source]
        source: ProviderError,
    },

    #[error("Provider '{0}' is already connected")]
    AlreadyConnected(String),

    #[error("Provider '{0}' is not connected")]
    UnknownProvider(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by a remote resource provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error (code {code}): {message}")]
    Server { code: i32, message: String },

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Connection closed")]
    Closed,
}

impl McpError {
    pub fn invalid_template(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn no_match(uri: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::NoMatch {
            uri: uri.into(),
            pattern: pattern.into(),
        }
    }

    pub fn fetch_failed(uri: impl Into<String>, source: ProviderError) -> Self {
        Self::FetchFailed {
            uri: uri.into(),
            source,
        }
    }

    pub fn provider_unavailable(provider: impl Into<String>, source: ProviderError) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the failed operation may succeed when attempted again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FetchFailed { source, .. } | Self::ProviderUnavailable { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }

    /// URI the error refers to, if any
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::NoMatch { uri, .. } | Self::FetchFailed { uri, .. } => Some(uri),
            _ => None,
        }
    }
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn server(code: i32, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Closed => true,
            // Implementation-defined JSON-RPC server errors
            Self::Server { code, .. } => matches!(code, -32099..=-32000),
            Self::InvalidContent(_) | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::transport("reset").is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::server(-32001, "busy").is_retryable());
        assert!(!ProviderError::server(-32602, "bad params").is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());

        let err = McpError::fetch_failed("file://x", ProviderError::Closed);
        assert!(err.is_retryable());
        assert!(err.is_fetch_failure());
        assert_eq!(err.uri(), Some("file://x"));
    }

    #[test]
    fn test_fetch_failure_message_names_uri() {
        let err = McpError::fetch_failed("file://data/a.txt", ProviderError::transport("refused"));
        let message = err.to_string();
        assert!(message.contains("file://data/a.txt"));
        assert!(message.contains("refused"));
    }

    #[test]
    fn test_invalid_template_is_not_retryable() {
        let err = McpError::invalid_template("user://profile/{id", "unclosed '{'");
        assert!(!err.is_retryable());
        assert!(err.uri().is_none());
    }
}
