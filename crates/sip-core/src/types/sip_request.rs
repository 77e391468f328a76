//! # SIP Request Message
//!
//! A request line, an ordered header list and an optional body. Typed header
//! access comes from [`HeaderAccess`]; `Display` renders the wire form with a
//! computed Content-Length, which is what providers and logs consume.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::content_type::ContentType;
use crate::types::headers::{Header, HeaderAccess, HeaderName};
use crate::types::method::Method;
use crate::types::uri::Uri;

/// A SIP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Attach a body together with its Content-Type
    pub fn with_body(mut self, content_type: &ContentType, body: impl Into<Bytes>) -> Self {
        self.set_body(content_type, body);
        self
    }

    pub fn set_body(&mut self, content_type: &ContentType, body: impl Into<Bytes>) {
        self.set_header(HeaderName::ContentType, content_type.to_string());
        self.body = body.into();
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, lossy
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl HeaderAccess for Request {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} SIP/2.0\r\n", self.method, self.uri)?;
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
    fn test_wire_rendering() {
        let req = Request::new(Method::Subscribe, "sip:alice@example.com".parse().unwrap())
            .with_header(HeaderName::CallId, "abc@host")
            .with_body(&ContentType::pidf(), "<presence/>");
        let text = req.to_string();
        assert!(text.starts_with("SUBSCRIBE sip:alice@example.com SIP/2.0\r\n"));
        assert!(text.contains("Call-ID: abc@host\r\n"));
        assert!(text.contains("Content-Type: application/pidf+xml\r\n"));
        assert!(text.ends_with("Content-Length: 11\r\n\r\n<presence/>"));
    }
}
