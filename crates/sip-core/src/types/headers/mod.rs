//! Raw headers and typed access to them
//!
//! Messages keep their headers as an ordered list of name/value pairs, exactly
//! as the provider delivered them. [`HeaderAccess`] layers typed readers on
//! top: a value is parsed when asked for, and a malformed value reads as
//! absent, which is what the subscription rules want ("absence of any
//! relevant header is a non-match").

mod header_name;

pub use header_name::HeaderName;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::address::Address;
use crate::types::content_type::ContentType;
use crate::types::cseq::CSeq;
use crate::types::event::EventHeader;
use crate::types::subscription_state::SubscriptionStateHeader;

/// One header line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: HeaderName,
    pub value: String,
}

impl Header {
    pub fn new(name: HeaderName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Header reading and editing shared by requests and responses
pub trait HeaderAccess {
    fn headers(&self) -> &[Header];
    fn headers_mut(&mut self) -> &mut Vec<Header>;

    /// First value of `name`
    fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers()
            .iter()
            .find(|h| h.name.matches(name))
            .map(|h| h.value.as_str())
    }

    /// All values of `name`, in order
    fn header_values(&self, name: &HeaderName) -> Vec<&str> {
        self.headers()
            .iter()
            .filter(|h| h.name.matches(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    fn has_header(&self, name: &HeaderName) -> bool {
        self.header(name).is_some()
    }

    /// Replace every `name` header with a single value, keeping the position
    /// of the first occurrence
    fn set_header(&mut self, name: HeaderName, value: impl Into<String>) {
        let value = value.into();
        let headers = self.headers_mut();
        match headers.iter().position(|h| h.name.matches(&name)) {
            Some(idx) => {
                headers[idx].value = value;
                let mut seen = 0usize;
                headers.retain(|h| {
                    if h.name.matches(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => headers.push(Header::new(name, value)),
        }
    }

    /// Append a header line
    fn add_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.headers_mut().push(Header::new(name, value));
    }

    /// Insert a header line in front of all others
    fn prepend_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.headers_mut().insert(0, Header::new(name, value));
    }

    /// Remove every `name` header; true if any was removed
    fn remove_header(&mut self, name: &HeaderName) -> bool {
        let headers = self.headers_mut();
        let before = headers.len();
        headers.retain(|h| !h.name.matches(name));
        headers.len() != before
    }

    fn call_id(&self) -> Option<&str> {
        self.header(&HeaderName::CallId).map(str::trim)
    }

    fn from_address(&self) -> Option<Address> {
        typed(self, HeaderName::From)
    }

    fn to_address(&self) -> Option<Address> {
        typed(self, HeaderName::To)
    }

    fn from_tag(&self) -> Option<String> {
        self.from_address()?.tag().map(str::to_string)
    }

    fn to_tag(&self) -> Option<String> {
        self.to_address()?.tag().map(str::to_string)
    }

    fn contact(&self) -> Option<Address> {
        typed(self, HeaderName::Contact)
    }

    fn cseq(&self) -> Option<CSeq> {
        typed(self, HeaderName::CSeq)
    }

    fn event(&self) -> Option<EventHeader> {
        typed(self, HeaderName::Event)
    }

    fn expires(&self) -> Option<u32> {
        typed(self, HeaderName::Expires)
    }

    fn subscription_state(&self) -> Option<SubscriptionStateHeader> {
        typed(self, HeaderName::SubscriptionState)
    }

    fn content_type(&self) -> Option<ContentType> {
        typed(self, HeaderName::ContentType)
    }
}

/// Read a header as `T`; a malformed value reads as absent
fn typed<H, T>(message: &H, name: HeaderName) -> Option<T>
where
    H: HeaderAccess + ?Sized,
    T: FromStr,
{
    let value = message.header(&name)?.trim();
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            trace!(header = %name, value, "Ignoring malformed header value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::method::Method;
    use crate::types::sip_request::Request;

    fn request() -> Request {
        Request::new(Method::Notify, "sip:bob@example.com".parse().unwrap())
    }

    #[test]
    fn test_set_header_collapses_duplicates() {
        let mut req = request();
        req.add_header(HeaderName::Expires, "10");
        req.add_header(HeaderName::CallId, "abc");
        req.add_header(HeaderName::Other("expires".into()), "20");
        req.set_header(HeaderName::Expires, "30");
        assert_eq!(req.header_values(&HeaderName::Expires), vec!["30"]);
        assert_eq!(req.headers()[0].name, HeaderName::Expires);
    }

    #[test]
    fn test_malformed_value_reads_as_absent() {
        let mut req = request();
        req.add_header(HeaderName::CSeq, "not-a-number NOTIFY");
        req.add_header(HeaderName::Expires, "soon");
        assert!(req.cseq().is_none());
        assert!(req.expires().is_none());
    }

    #[test]
    fn test_remove_header() {
        let mut req = request();
        req.add_header(HeaderName::Authorization, "Digest x=1");
        assert!(req.remove_header(&HeaderName::Authorization));
        assert!(!req.remove_header(&HeaderName::Authorization));
    }
}
