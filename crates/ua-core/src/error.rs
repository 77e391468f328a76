//! Error types for the subscription engine
//!
//! Every engine operation returns [`UaResult`]. The variants follow the
//! failure categories a test program has to tell apart: a local misuse, a
//! wait that ran out of time, a far end that said no, a NOTIFY that did not
//! validate, a challenge we hold no credentials for, and a provider failure.

use thiserror::Error;

/// Result type for engine operations
pub type UaResult<T> = std::result::Result<T, UaError>;

/// Coarse category of a [`UaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Precondition,
    Timeout,
    FarEnd,
    Validation,
    NoCredentials,
    Transport,
    Pipeline,
}

/// Errors raised by the engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UaError {
    /// Invalid argument or operation called in the wrong state; nothing was sent
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A wait exceeded its deadline
    #[error("Timed out after {timeout_ms} ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    /// The far end answered with a final non-success status
    #[error("Far end answered {status} {reason}")]
    FarEnd { status: u16, reason: String },

    /// An incoming message failed validation; `status` is the response code
    /// that reports it
    #[error("Validation failed ({status}): {message}")]
    Validation { status: u16, message: String },

    /// A challenge arrived for a realm without configured credentials
    #[error("No credentials available for realm '{realm}'")]
    NoCredentials { realm: String },

    /// The SIP provider failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Structural misuse of a classification pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A message could not be built or read
    #[error("Message error: {0}")]
    Message(#[from] sipevent_sip_core::Error),
}

impl UaError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn timeout(what: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms,
        }
    }

    pub fn far_end(status: u16, reason: impl Into<String>) -> Self {
        Self::FarEnd {
            status,
            reason: reason.into(),
        }
    }

    pub fn validation(status: u16, message: impl Into<String>) -> Self {
        Self::Validation {
            status,
            message: message.into(),
        }
    }

    pub fn no_credentials(realm: impl Into<String>) -> Self {
        Self::NoCredentials {
            realm: realm.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UaError::Precondition(_) | UaError::Message(_) => ErrorKind::Precondition,
            UaError::Timeout { .. } => ErrorKind::Timeout,
            UaError::FarEnd { .. } => ErrorKind::FarEnd,
            UaError::Validation { .. } => ErrorKind::Validation,
            UaError::NoCredentials { .. } => ErrorKind::NoCredentials,
            UaError::Transport(_) => ErrorKind::Transport,
            UaError::Pipeline(_) => ErrorKind::Pipeline,
        }
    }

    /// SIP status associated with the failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            UaError::FarEnd { status, .. } | UaError::Validation { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Whether retrying the same operation can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_status() {
        let err = UaError::far_end(481, "Call/Transaction Does Not Exist");
        assert_eq!(err.kind(), ErrorKind::FarEnd);
        assert_eq!(err.status_code(), Some(481));
        assert!(!err.is_recoverable());

        let err = UaError::timeout("SUBSCRIBE response", 500);
        assert!(err.is_timeout());
        assert_eq!(err.status_code(), None);
        assert_eq!(err.to_string(), "Timed out after 500 ms waiting for SUBSCRIBE response");
    }

    #[test]
    fn test_message_errors_are_preconditions() {
        let err: UaError = sipevent_sip_core::Error::InvalidUri("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}
