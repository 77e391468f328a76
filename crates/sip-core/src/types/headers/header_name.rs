use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SIP header names used by the event stack
///
/// Header names are case-insensitive in SIP. Parsing accepts any case and
/// the compact forms (`f`, `t`, `i`, `o`, ...); rendering always uses the
/// canonical capitalisation.
///
/// ```rust
/// use sipevent_sip_core::HeaderName;
///
/// assert_eq!("o".parse::<HeaderName>().unwrap(), HeaderName::Event);
/// assert_eq!("subscription-state".parse::<HeaderName>().unwrap(), HeaderName::SubscriptionState);
/// assert_eq!(HeaderName::CallId.as_str(), "Call-ID");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderName {
    Via,
    From,
    To,
    CallId,
    CSeq,
    Contact,
    MaxForwards,
    ContentType,
    ContentLength,
    /// Event: event package for SUBSCRIBE/NOTIFY
    Event,
    Expires,
    MinExpires,
    /// Subscription-State: state of the subscription in NOTIFY
    SubscriptionState,
    AllowEvents,
    Allow,
    Accept,
    UserAgent,
    WwwAuthenticate,
    ProxyAuthenticate,
    Authorization,
    ProxyAuthorization,
    /// Refer-To: target of a REFER
    ReferTo,
    ReferredBy,
    /// Any other header, kept as written
    Other(String),
}

impl HeaderName {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::Contact => "Contact",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::Event => "Event",
            HeaderName::Expires => "Expires",
            HeaderName::MinExpires => "Min-Expires",
            HeaderName::SubscriptionState => "Subscription-State",
            HeaderName::AllowEvents => "Allow-Events",
            HeaderName::Allow => "Allow",
            HeaderName::Accept => "Accept",
            HeaderName::UserAgent => "User-Agent",
            HeaderName::WwwAuthenticate => "WWW-Authenticate",
            HeaderName::ProxyAuthenticate => "Proxy-Authenticate",
            HeaderName::Authorization => "Authorization",
            HeaderName::ProxyAuthorization => "Proxy-Authorization",
            HeaderName::ReferTo => "Refer-To",
            HeaderName::ReferredBy => "Referred-By",
            HeaderName::Other(name) => name,
        }
    }

    /// Case-insensitive comparison, also for [`HeaderName::Other`]
    pub fn matches(&self, other: &HeaderName) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == ':') {
            return Err(Error::ParseError(format!("Invalid header name: {:?}", s)));
        }
        Ok(match name.to_ascii_lowercase().as_str() {
            "via" | "v" => HeaderName::Via,
            "from" | "f" => HeaderName::From,
            "to" | "t" => HeaderName::To,
            "call-id" | "i" => HeaderName::CallId,
            "cseq" => HeaderName::CSeq,
            "contact" | "m" => HeaderName::Contact,
            "max-forwards" => HeaderName::MaxForwards,
            "content-type" | "c" => HeaderName::ContentType,
            "content-length" | "l" => HeaderName::ContentLength,
            "event" | "o" => HeaderName::Event,
            "expires" => HeaderName::Expires,
            "min-expires" => HeaderName::MinExpires,
            "subscription-state" => HeaderName::SubscriptionState,
            "allow-events" | "u" => HeaderName::AllowEvents,
            "allow" => HeaderName::Allow,
            "accept" => HeaderName::Accept,
            "user-agent" => HeaderName::UserAgent,
            "www-authenticate" => HeaderName::WwwAuthenticate,
            "proxy-authenticate" => HeaderName::ProxyAuthenticate,
            "authorization" => HeaderName::Authorization,
            "proxy-authorization" => HeaderName::ProxyAuthorization,
            "refer-to" | "r" => HeaderName::ReferTo,
            "referred-by" | "b" => HeaderName::ReferredBy,
            _ => HeaderName::Other(name.to_string()),
        })
    }
}
