//! SIP value types
//!
//! Each submodule owns one concept: its representation, `FromStr` for the
//! header value grammar and `Display` for rendering back onto the wire.

pub mod address;
pub mod auth;
pub mod content_type;
pub mod cseq;
pub mod event;
pub mod headers;
pub mod method;
pub mod param;
pub mod pidf;
pub mod sip_request;
pub mod sip_response;
pub mod sipfrag;
pub mod status;
pub mod subscription_state;
pub mod uri;
