//! # sipevent-sip-core
//!
//! SIP message model used at the boundary between the subscription engine and
//! whatever SIP stack actually moves bytes on the wire.
//!
//! The crate deliberately stops short of full wire parsing: a provider hands
//! us already-parsed [`Request`]s and [`Response`]s, and we only need to read
//! and write the handful of headers that event subscriptions care about
//! (RFC 3265 / RFC 6665 and the REFER variant of RFC 3515).
//!
//! ## Contents
//!
//! - [`types`]: methods, status codes, URIs, name-addr values and the typed
//!   header values (`Event`, `Subscription-State`, `CSeq`, `Content-Type`,
//!   digest challenges and credentials)
//! - [`builder`]: `SimpleRequestBuilder` / `SimpleResponseBuilder`
//! - body documents carried by NOTIFY: [`PidfDocument`] and [`SipFrag`]
//!
//! ## Example
//!
//! ```rust
//! use sipevent_sip_core::prelude::*;
//!
//! let request = SimpleRequestBuilder::new(Method::Subscribe, "sip:alice@example.com")
//!     .unwrap()
//!     .from("Bob", "sip:bob@example.com", Some("tag123"))
//!     .to("", "sip:alice@example.com", None)
//!     .call_id("subscription-12345")
//!     .cseq(1)
//!     .event("presence")
//!     .expires(3600)
//!     .build();
//!
//! assert_eq!(request.event().unwrap().package, "presence");
//! assert_eq!(request.expires(), Some(3600));
//! assert_eq!(request.from_tag().as_deref(), Some("tag123"));
//! ```

pub mod builder;
pub mod error;
pub mod parser;
pub mod types;

pub use builder::{SimpleRequestBuilder, SimpleResponseBuilder};
pub use error::{Error, Result};
pub use types::{
    address::Address,
    auth::{Challenge, DigestCredentials},
    content_type::ContentType,
    cseq::CSeq,
    event::EventHeader,
    headers::{Header, HeaderAccess, HeaderName},
    method::Method,
    param::Param,
    pidf::{BasicStatus, PidfDocument, Tuple},
    sip_request::Request,
    sip_response::Response,
    sipfrag::SipFrag,
    status::StatusCode,
    subscription_state::{SubState, SubscriptionStateHeader},
    uri::{Host, Scheme, Uri},
};

/// Convenience re-exports for the common case
pub mod prelude {
    pub use crate::builder::{SimpleRequestBuilder, SimpleResponseBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::types::address::Address;
    pub use crate::types::content_type::ContentType;
    pub use crate::types::cseq::CSeq;
    pub use crate::types::event::EventHeader;
    pub use crate::types::headers::{Header, HeaderAccess, HeaderName};
    pub use crate::types::method::Method;
    pub use crate::types::sip_request::Request;
    pub use crate::types::sip_response::Response;
    pub use crate::types::status::StatusCode;
    pub use crate::types::subscription_state::{SubState, SubscriptionStateHeader};
    pub use crate::types::uri::{Host, Scheme, Uri};
}

/// Generate a fresh dialog tag
pub fn generate_tag() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..10].to_string()
}

/// Generate a fresh Call-ID scoped to `host`
pub fn generate_call_id(host: &str) -> String {
    format!("{}@{}", uuid::Uuid::new_v4().simple(), host)
}

/// Generate an RFC 3261 magic-cookie Via branch
pub fn generate_branch() -> String {
    format!("z9hG4bK-{}", uuid::Uuid::new_v4().simple())
}
