//! # message/sipfrag bodies (RFC 3420)
//!
//! NOTIFYs sent for a REFER report progress of the referred request as a
//! SIP fragment, normally just a status line:
//!
//! ```text
//! SIP/2.0 180 Ringing
//! ```
//!
//! A fragment may also start with a request line and carry headers. Anything
//! after the header block is kept as an opaque body.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::headers::{Header, HeaderName};
use crate::types::method::Method;
use crate::types::status::StatusCode;

/// Start line of a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Status { code: StatusCode, reason: String },
    Request { method: Method, uri: String },
}

/// A parsed message/sipfrag body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipFrag {
    pub start_line: StartLine,
    pub headers: Vec<Header>,
    pub body: String,
}

impl SipFrag {
    /// Status-line-only fragment, `reason` defaults to the standard phrase
    pub fn status(code: StatusCode, reason: Option<&str>) -> Self {
        Self {
            start_line: StartLine::Status {
                code,
                reason: reason.unwrap_or(code.reason_phrase()).to_string(),
            },
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Status code when the fragment starts with a status line
    pub fn status_code(&self) -> Option<StatusCode> {
        match &self.start_line {
            StartLine::Status { code, .. } => Some(*code),
            StartLine::Request { .. } => None,
        }
    }

    /// True for a final (>= 200) status fragment
    pub fn is_final(&self) -> bool {
        self.status_code().is_some_and(|code| code.is_final())
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }
}

impl fmt::Display for SipFrag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start_line {
            StartLine::Status { code, reason } => write!(f, "SIP/2.0 {} {}\r\n", code.as_u16(), reason)?,
            StartLine::Request { method, uri } => write!(f, "{} {} SIP/2.0\r\n", method, uri)?,
        }
        for header in &self.headers {
            write!(f, "{}\r\n", header)?;
        }
        if !self.body.is_empty() {
            write!(f, "\r\n{}", self.body)?;
        }
        Ok(())
    }
}

impl FromStr for SipFrag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim_start();
        let (head, body) = match text.find("\r\n\r\n") {
            Some(idx) => (&text[..idx], text[idx + 4..].to_string()),
            None => match text.find("\n\n") {
                Some(idx) => (&text[..idx], text[idx + 2..].to_string()),
                None => (text, String::new()),
            },
        };
        let mut lines = head.lines().map(|l| l.trim_end_matches('\r'));
        let first = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::ParseError("empty sipfrag".to_string()))?;

        let start_line = if let Some(rest) = first.strip_prefix("SIP/2.0 ") {
            let rest = rest.trim();
            let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
            let code: u16 = code
                .parse()
                .map_err(|_| Error::ParseError(format!("bad sipfrag status line: {}", first)))?;
            StartLine::Status {
                code: StatusCode::from_u16(code)?,
                reason: reason.trim().to_string(),
            }
        } else {
            let mut parts = first.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(method), Some(uri), Some("SIP/2.0")) => StartLine::Request {
                    method: method.parse()?,
                    uri: uri.to_string(),
                },
                _ => return Err(Error::ParseError(format!("bad sipfrag start line: {}", first))),
            }
        };

        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::ParseError(format!("bad sipfrag header: {}", line)))?;
            headers.push(Header::new(name.parse()?, value.trim()));
        }

        Ok(SipFrag {
            start_line,
            headers,
            body,
        })
    }
}
