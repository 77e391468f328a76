use bytes::Bytes;

use crate::error::Result;
use crate::types::content_type::ContentType;
use crate::types::cseq::CSeq;
use crate::types::event::EventHeader;
use crate::types::headers::{HeaderAccess, HeaderName};
use crate::types::method::Method;
use crate::types::sip_request::Request;
use crate::types::subscription_state::SubscriptionStateHeader;
use crate::types::uri::Uri;

use super::name_addr;

/// Builder for SIP requests
///
/// The CSeq method always follows the request method, so [`cseq`](Self::cseq)
/// only takes the sequence number.
///
/// ```rust
/// use sipevent_sip_core::prelude::*;
///
/// let refer = SimpleRequestBuilder::new(Method::Refer, "sip:bob@example.com")
///     .unwrap()
///     .from("Alice", "sip:alice@example.com", Some("xyz"))
///     .to("Bob", "sip:bob@example.com", None)
///     .call_id("refer-1@example.com")
///     .cseq(1)
///     .via("10.0.0.1:5060", "UDP", None)
///     .refer_to("sip:carol@example.com")
///     .build();
///
/// assert_eq!(refer.header(&HeaderName::ReferTo), Some("<sip:carol@example.com>"));
/// assert_eq!(refer.cseq().unwrap().method, Method::Refer);
/// ```
#[derive(Debug, Clone)]
pub struct SimpleRequestBuilder {
    request: Request,
}

impl SimpleRequestBuilder {
    /// Start a request; fails when `uri` is not a valid SIP URI
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri: Uri = uri.parse()?;
        Ok(Self::with_uri(method, uri))
    }

    pub fn with_uri(method: Method, uri: Uri) -> Self {
        Self {
            request: Request::new(method, uri),
        }
    }

    /// Continue building from an existing request
    pub fn from_request(request: Request) -> Self {
        Self { request }
    }

    pub fn from(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Self {
        self.request
            .set_header(HeaderName::From, name_addr(display_name, uri, tag));
        self
    }

    pub fn to(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Self {
        self.request
            .set_header(HeaderName::To, name_addr(display_name, uri, tag));
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.request.set_header(HeaderName::CallId, call_id);
        self
    }

    pub fn cseq(mut self, seq: u32) -> Self {
        let cseq = CSeq::new(seq, self.request.method.clone());
        self.request.set_header(HeaderName::CSeq, cseq.to_string());
        self
    }

    /// Add a Via; `sent_by` is `host[:port]`. A fresh branch is generated
    /// when none is given.
    pub fn via(mut self, sent_by: &str, transport: &str, branch: Option<&str>) -> Self {
        let branch = branch
            .map(str::to_string)
            .unwrap_or_else(crate::generate_branch);
        self.request.add_header(
            HeaderName::Via,
            format!("SIP/2.0/{} {};branch={}", transport.to_ascii_uppercase(), sent_by, branch),
        );
        self
    }

    pub fn contact(mut self, uri: &str) -> Self {
        self.request.set_header(HeaderName::Contact, format!("<{}>", uri));
        self
    }

    pub fn max_forwards(mut self, hops: u32) -> Self {
        self.request.set_header(HeaderName::MaxForwards, hops.to_string());
        self
    }

    /// `Event: package` without an id
    pub fn event(self, package: &str) -> Self {
        self.event_header(&EventHeader::new(package))
    }

    pub fn event_header(mut self, event: &EventHeader) -> Self {
        self.request.set_header(HeaderName::Event, event.to_string());
        self
    }

    pub fn expires(mut self, seconds: u32) -> Self {
        self.request.set_header(HeaderName::Expires, seconds.to_string());
        self
    }

    pub fn subscription_state(mut self, state: &SubscriptionStateHeader) -> Self {
        self.request
            .set_header(HeaderName::SubscriptionState, state.to_string());
        self
    }

    pub fn refer_to(mut self, target: &str) -> Self {
        self.request
            .set_header(HeaderName::ReferTo, format!("<{}>", target));
        self
    }

    pub fn accept(mut self, media_type: &str) -> Self {
        self.request.add_header(HeaderName::Accept, media_type);
        self
    }

    pub fn user_agent(mut self, agent: &str) -> Self {
        self.request.set_header(HeaderName::UserAgent, agent);
        self
    }

    /// Any header, appended as written
    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.request.add_header(name, value);
        self
    }

    pub fn body(mut self, content_type: &ContentType, body: impl Into<Bytes>) -> Self {
        self.request.set_body(content_type, body);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_uri_rejected() {
        assert!(SimpleRequestBuilder::new(Method::Subscribe, "not a uri").is_err());
    }

    #[test]
    fn test_generated_branch() {
        let req = SimpleRequestBuilder::new(Method::Subscribe, "sip:a@example.com")
            .unwrap()
            .via("127.0.0.1:5060", "udp", None)
            .build();
        let via = req.header(&HeaderName::Via).unwrap();
        assert!(via.starts_with("SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK"));
    }

    #[test]
    fn test_display_name_rendering() {
        let req = SimpleRequestBuilder::new(Method::Subscribe, "sip:a@example.com")
            .unwrap()
            .from("Bob", "sip:bob@example.com", Some("t1"))
            .to("", "sip:a@example.com", None)
            .build();
        assert_eq!(req.header(&HeaderName::From), Some("\"Bob\" <sip:bob@example.com>;tag=t1"));
        assert_eq!(req.header(&HeaderName::To), Some("<sip:a@example.com>"));
        assert_eq!(req.from_address().unwrap().display_name.as_deref(), Some("Bob"));
    }
}
