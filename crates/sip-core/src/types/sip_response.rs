//! # SIP Response Message

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::content_type::ContentType;
use crate::types::headers::{Header, HeaderAccess, HeaderName};
use crate::types::status::StatusCode;

/// A SIP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    /// Reason phrase as sent, may differ from the default phrase
    pub reason: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.reason_phrase().to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn with_body(mut self, content_type: &ContentType, body: impl Into<Bytes>) -> Self {
        self.set_header(HeaderName::ContentType, content_type.to_string());
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Numeric status code
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl HeaderAccess for Response {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0 {} {}\r\n", self.status.as_u16(), self.reason)?;
        for header in self.headers.iter().filter(|h| h.name != HeaderName::ContentLength) {
            write!(f, "{}\r\n", header)?;
        }
        write!(f, "Content-Length: {}\r\n\r\n", self.body.len())?;
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reason_and_override() {
        let resp = Response::new(StatusCode::BadEvent);
        assert_eq!(resp.reason_phrase(), "Bad Event");
        let resp = resp.with_reason("Unknown package");
        assert_eq!(resp.status_code(), 489);
        assert!(resp.to_string().starts_with("SIP/2.0 489 Unknown package\r\n"));
    }
}
