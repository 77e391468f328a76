//! Error types for sip-core

use thiserror::Error;

/// Result type for message model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or reading SIP message values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A value could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A URI did not follow the sip/sips grammar
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// A header value was present but malformed
    #[error("Invalid {header} header: {message}")]
    InvalidHeader { header: String, message: String },

    /// A required header is absent
    #[error("Missing header: {0}")]
    MissingHeader(String),

    /// Status code outside 100..=699
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Method token is empty or contains separators
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
}

impl Error {
    /// Create a header error
    pub fn invalid_header(header: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            header: header.into(),
            message: message.into(),
        }
    }
}
