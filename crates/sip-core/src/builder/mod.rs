//! # Message builders
//!
//! Fluent builders for the requests and responses the event stack sends.
//! Header values are written in their wire form; the typed readers in
//! [`HeaderAccess`](crate::types::headers::HeaderAccess) parse them back.
//!
//! ```rust
//! use sipevent_sip_core::prelude::*;
//!
//! let notify = SimpleRequestBuilder::new(Method::Notify, "sip:bob@10.0.0.2:5070")
//!     .unwrap()
//!     .from("", "sip:alice@example.com", Some("a1"))
//!     .to("", "sip:bob@example.com", Some("b2"))
//!     .call_id("c@example.com")
//!     .cseq(7)
//!     .event("presence")
//!     .subscription_state(&SubscriptionStateHeader::active(600))
//!     .build();
//!
//! let ok = SimpleResponseBuilder::response_from_request(&notify, StatusCode::Ok, None).build();
//! assert_eq!(ok.cseq().unwrap().seq, 7);
//! assert_eq!(ok.to_tag().as_deref(), Some("b2"));
//! ```

mod request;
mod response;

pub use request::SimpleRequestBuilder;
pub use response::SimpleResponseBuilder;

/// `"Display" <uri>;tag=x` as written into From/To
pub(crate) fn name_addr(display_name: &str, uri: &str, tag: Option<&str>) -> String {
    let mut value = if display_name.is_empty() {
        format!("<{}>", uri)
    } else {
        format!("\"{}\" <{}>", display_name.replace('"', "\\\""), uri)
    };
    if let Some(tag) = tag {
        value.push_str(";tag=");
        value.push_str(tag);
    }
    value
}
