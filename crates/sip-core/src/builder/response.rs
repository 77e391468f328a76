use bytes::Bytes;

use crate::types::content_type::ContentType;
use crate::types::headers::{HeaderAccess, HeaderName};
use crate::types::sip_request::Request;
use crate::types::sip_response::Response;
use crate::types::status::StatusCode;

/// Builder for SIP responses
///
/// Most responses are built from the request they answer with
/// [`response_from_request`](Self::response_from_request), which copies the
/// Via, From, To, Call-ID and CSeq headers per RFC 3261 §8.2.6.
#[derive(Debug, Clone)]
pub struct SimpleResponseBuilder {
    response: Response,
}

impl SimpleResponseBuilder {
    pub fn new(status: StatusCode, reason: Option<&str>) -> Self {
        let mut response = Response::new(status);
        if let Some(reason) = reason {
            response.reason = reason.to_string();
        }
        Self { response }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, None)
    }

    /// Start a response that mirrors the transaction headers of `request`
    pub fn response_from_request(request: &Request, status: StatusCode, reason: Option<&str>) -> Self {
        let mut builder = Self::new(status, reason);
        for header in request.headers() {
            let copied = [
                HeaderName::Via,
                HeaderName::From,
                HeaderName::To,
                HeaderName::CallId,
                HeaderName::CSeq,
            ]
            .iter()
            .any(|name| header.name.matches(name));
            if copied {
                builder.response.add_header(header.name.clone(), header.value.clone());
            }
        }
        builder
    }

    /// Add a To tag unless one is already present
    pub fn to_tag(mut self, tag: &str) -> Self {
        if self.response.to_tag().is_none() {
            if let Some(mut to) = self.response.to_address() {
                to.set_tag(tag);
                self.response.set_header(HeaderName::To, to.to_string());
            }
        }
        self
    }

    pub fn contact(mut self, uri: &str) -> Self {
        self.response.set_header(HeaderName::Contact, format!("<{}>", uri));
        self
    }

    pub fn expires(mut self, seconds: u32) -> Self {
        self.response.set_header(HeaderName::Expires, seconds.to_string());
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.response.add_header(name, value);
        self
    }

    pub fn body(mut self, content_type: &ContentType, body: impl Into<Bytes>) -> Self {
        self.response.set_header(HeaderName::ContentType, content_type.to_string());
        self.response.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SimpleRequestBuilder;
    use crate::types::method::Method;

    fn subscribe() -> Request {
        SimpleRequestBuilder::new(Method::Subscribe, "sip:alice@example.com")
            .unwrap()
            .via("10.0.0.1:5060", "UDP", Some("z9hG4bK1"))
            .from("", "sip:bob@example.com", Some("b1"))
            .to("", "sip:alice@example.com", None)
            .call_id("call-1")
            .cseq(3)
            .event("presence")
            .build()
    }

    #[test]
    fn test_copies_transaction_headers_only() {
        let resp = SimpleResponseBuilder::response_from_request(&subscribe(), StatusCode::Ok, None).build();
        assert_eq!(resp.call_id(), Some("call-1"));
        assert_eq!(resp.cseq().unwrap().seq, 3);
        assert!(resp.header(&HeaderName::Via).is_some());
        assert!(resp.event().is_none());
    }

    #[test]
    fn test_to_tag_added_once() {
        let resp = SimpleResponseBuilder::response_from_request(&subscribe(), StatusCode::Accepted, None)
            .to_tag("a1")
            .to_tag("a2")
            .build();
        assert_eq!(resp.to_tag().as_deref(), Some("a1"));
        assert_eq!(resp.reason_phrase(), "Accepted");
    }
}
