//! # SIP Status Codes
//!
//! Status codes as defined in RFC 3261 §21 and the event extensions. Only the
//! codes this stack reasons about get a named variant; every other valid
//! code is carried as [`StatusCode::Other`].
//!
//! - `1xx`: Provisional
//! - `2xx`: Success
//! - `3xx`: Redirection
//! - `4xx`: Client Error
//! - `5xx`: Server Error
//! - `6xx`: Global Failure
//!
//! ```rust
//! use sipevent_sip_core::StatusCode;
//!
//! let status = StatusCode::from_u16(489).unwrap();
//! assert_eq!(status, StatusCode::BadEvent);
//! assert_eq!(status.reason_phrase(), "Bad Event");
//! assert!(StatusCode::ProxyAuthenticationRequired.is_auth_challenge());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SIP response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// 100 Trying
    Trying,
    /// 180 Ringing
    Ringing,
    /// 183 Session Progress
    SessionProgress,
    /// 200 OK
    Ok,
    /// 202 Accepted (SUBSCRIBE / REFER)
    Accepted,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 407 Proxy Authentication Required
    ProxyAuthenticationRequired,
    /// 408 Request Timeout
    RequestTimeout,
    /// 415 Unsupported Media Type
    UnsupportedMediaType,
    /// 423 Interval Too Brief
    IntervalTooBrief,
    /// 481 Call/Transaction Does Not Exist
    CallOrTransactionDoesNotExist,
    /// 489 Bad Event
    BadEvent,
    /// 500 Server Internal Error
    ServerInternalError,
    /// 503 Service Unavailable
    ServiceUnavailable,
    /// 603 Decline
    Decline,
    /// Any other code in 100..=699
    Other(u16),
}

impl StatusCode {
    /// Build a status code from its numeric value
    pub fn from_u16(code: u16) -> Result<Self> {
        Ok(match code {
            100 => StatusCode::Trying,
            180 => StatusCode::Ringing,
            183 => StatusCode::SessionProgress,
            200 => StatusCode::Ok,
            202 => StatusCode::Accepted,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            407 => StatusCode::ProxyAuthenticationRequired,
            408 => StatusCode::RequestTimeout,
            415 => StatusCode::UnsupportedMediaType,
            423 => StatusCode::IntervalTooBrief,
            481 => StatusCode::CallOrTransactionDoesNotExist,
            489 => StatusCode::BadEvent,
            500 => StatusCode::ServerInternalError,
            503 => StatusCode::ServiceUnavailable,
            603 => StatusCode::Decline,
            100..=699 => StatusCode::Other(code),
            _ => return Err(Error::InvalidStatusCode(code)),
        })
    }

    /// Numeric value
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Trying => 100,
            StatusCode::Ringing => 180,
            StatusCode::SessionProgress => 183,
            StatusCode::Ok => 200,
            StatusCode::Accepted => 202,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::ProxyAuthenticationRequired => 407,
            StatusCode::RequestTimeout => 408,
            StatusCode::UnsupportedMediaType => 415,
            StatusCode::IntervalTooBrief => 423,
            StatusCode::CallOrTransactionDoesNotExist => 481,
            StatusCode::BadEvent => 489,
            StatusCode::ServerInternalError => 500,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::Decline => 603,
            StatusCode::Other(code) => *code,
        }
    }

    /// Default reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.as_u16() {
            100 => "Trying",
            180 => "Ringing",
            183 => "Session Progress",
            200 => "OK",
            202 => "Accepted",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            415 => "Unsupported Media Type",
            423 => "Interval Too Brief",
            481 => "Call/Transaction Does Not Exist",
            489 => "Bad Event",
            500 => "Server Internal Error",
            503 => "Service Unavailable",
            603 => "Decline",
            code if code < 200 => "Provisional",
            code if code < 300 => "Success",
            code if code < 400 => "Redirection",
            code if code < 500 => "Client Error",
            code if code < 600 => "Server Error",
            _ => "Global Failure",
        }
    }

    /// 1xx
    pub fn is_provisional(&self) -> bool {
        self.as_u16() < 200
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Anything >= 200
    pub fn is_final(&self) -> bool {
        !self.is_provisional()
    }

    /// 3xx and above
    pub fn is_error(&self) -> bool {
        self.as_u16() >= 300
    }

    /// 401 or 407
    pub fn is_auth_challenge(&self) -> bool {
        matches!(
            self,
            StatusCode::Unauthorized | StatusCode::ProxyAuthenticationRequired
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

impl FromStr for StatusCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::ParseError(format!("Invalid status code: {}", s)))?;
        Self::from_u16(code)
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        Self::from_u16(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StatusCode::Trying.is_provisional());
        assert!(StatusCode::Accepted.is_success());
        assert!(StatusCode::Accepted.is_final());
        assert!(StatusCode::BadEvent.is_error());
        assert!(StatusCode::Unauthorized.is_auth_challenge());
        assert!(!StatusCode::Forbidden.is_auth_challenge());
    }

    #[test]
    fn test_other_codes() {
        let code = StatusCode::from_u16(486).unwrap();
        assert_eq!(code, StatusCode::Other(486));
        assert_eq!(code.as_u16(), 486);
        assert_eq!(code.reason_phrase(), "Client Error");
        assert!(StatusCode::from_u16(99).is_err());
        assert!(StatusCode::from_u16(700).is_err());
    }

    #[test]
    fn test_named_round_trip() {
        for code in [100u16, 200, 202, 401, 407, 415, 481, 489] {
            assert_eq!(StatusCode::from_u16(code).unwrap().as_u16(), code);
            assert!(!matches!(StatusCode::from_u16(code).unwrap(), StatusCode::Other(_)));
        }
    }
}
