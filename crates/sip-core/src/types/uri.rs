//! # SIP URI Implementation
//!
//! SIP and SIPS URIs as defined in [RFC 3261 §19.1](https://tools.ietf.org/html/rfc3261#section-19.1):
//!
//! ```text
//! sip:user:password@host:port;uri-parameters?headers
//! ```
//!
//! The port is kept as an `Option` so that callers can tell an explicit
//! `:5060` apart from an implied default. URI comparison rules that depend on
//! that distinction live with their users (see the request matching pipeline
//! in ua-core).
//!
//! ```rust
//! use sipevent_sip_core::types::uri::{Uri, Scheme};
//!
//! let uri: Uri = "sip:alice@example.com:5060;transport=udp".parse().unwrap();
//! assert_eq!(uri.scheme, Scheme::Sip);
//! assert_eq!(uri.username(), Some("alice"));
//! assert_eq!(uri.port, Some(5060));
//! assert_eq!(uri.parameter("transport"), Some("udp"));
//!
//! let built = Uri::sip("example.com").with_user("bob").with_port(5070);
//! assert_eq!(built.to_string(), "sip:bob@example.com:5070");
//! ```

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::sip_uri::parse_uri;
use crate::types::param::{find_param, set_param, Param};

/// URI scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// SIP URI (non-secure)
    Sip,
    /// SIPS URI (secure SIP)
    Sips,
    /// Any other scheme using the same hierarchical form
    Custom(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
            Scheme::Custom(scheme) => scheme,
        }
    }

    /// Port implied when the URI carries none
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Sips => 5061,
            _ => 5060,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Schemes compare case-insensitively; normalise to lower case here
        match s.to_ascii_lowercase().as_str() {
            "sip" => Ok(Scheme::Sip),
            "sips" => Ok(Scheme::Sips),
            "" => Err(Error::InvalidUri("empty scheme".to_string())),
            other => Ok(Scheme::Custom(other.to_string())),
        }
    }
}

/// Host part of a URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Host {
    /// Domain name, kept as written
    Domain(String),
    /// IPv4 or IPv6 literal
    Address(IpAddr),
}

impl Host {
    pub fn domain(domain: impl Into<String>) -> Self {
        Host::Domain(domain.into())
    }

    /// Case-insensitive host comparison (RFC 3261 §19.1.4)
    pub fn eq_ignore_case(&self, other: &Host) -> bool {
        match (self, other) {
            (Host::Domain(a), Host::Domain(b)) => a.eq_ignore_ascii_case(b),
            (Host::Address(a), Host::Address(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Domain(domain) => f.write_str(domain),
            Host::Address(IpAddr::V6(addr)) => write!(f, "[{}]", addr),
            Host::Address(IpAddr::V4(addr)) => write!(f, "{}", addr),
        }
    }
}

impl From<IpAddr> for Host {
    fn from(addr: IpAddr) -> Self {
        Host::Address(addr)
    }
}

/// A sip/sips URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Host,
    /// Explicit port, `None` when the URI text shows no port
    pub port: Option<u16>,
    pub parameters: Vec<Param>,
    pub headers: Vec<(String, String)>,
}

impl Uri {
    pub fn new(scheme: Scheme, host: Host) -> Self {
        Self {
            scheme,
            user: None,
            password: None,
            host,
            port: None,
            parameters: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// `sip:` URI for a host
    pub fn sip(host: impl Into<String>) -> Self {
        let host = host.into();
        let host = match host.parse::<IpAddr>() {
            Ok(addr) => Host::Address(addr),
            Err(_) => Host::Domain(host),
        };
        Self::new(Scheme::Sip, host)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_parameter(mut self, param: Param) -> Self {
        set_param(&mut self.parameters, &param.name, param.value);
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Value of a URI parameter (flag parameters yield `Some("")`)
    pub fn parameter(&self, name: &str) -> Option<&str> {
        find_param(&self.parameters, name).map(|p| p.value.as_deref().unwrap_or(""))
    }

    /// Port to use when none is written
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// `host:port` with the default port filled in, used for routing
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port_or_default())
    }

    /// The URI reduced to scheme, user and host part, as used in
    /// address-of-record comparisons and digest `uri=` values
    pub fn without_parameters(&self) -> Uri {
        Uri {
            parameters: Vec::new(),
            headers: Vec::new(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            f.write_str(user)?;
            if let Some(password) = &self.password {
                write!(f, ":{}", password)?;
            }
            f.write_str("@")?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for param in &self.parameters {
            write!(f, ";{}", param)?;
        }
        for (idx, (name, value)) in self.headers.iter().enumerate() {
            let sep = if idx == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_uri(s)
    }
}
