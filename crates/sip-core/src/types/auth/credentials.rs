use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::params::parse_auth_params;

/// Digest response carried in Authorization / Proxy-Authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    /// Digest URI, the request URI of the authorized request
    pub uri: String,
    /// 32 hex digit response
    pub response: String,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl fmt::Display for DigestCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.username, self.realm, self.nonce, self.uri, self.response
        )?;
        if let Some(algorithm) = &self.algorithm {
            write!(f, ", algorithm={}", algorithm)?;
        }
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{}\"", opaque)?;
        }
        if let Some(qop) = &self.qop {
            write!(f, ", qop={}", qop)?;
        }
        if let Some(nc) = &self.nc {
            write!(f, ", nc={}", nc)?;
        }
        if let Some(cnonce) = &self.cnonce {
            write!(f, ", cnonce=\"{}\"", cnonce)?;
        }
        Ok(())
    }
}

impl FromStr for DigestCredentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::invalid_header("Authorization", s))?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return Err(Error::invalid_header("Authorization", format!("unsupported scheme {}", scheme)));
        }
        let params = parse_auth_params(rest);
        let get = |name: &str| params.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone());
        let required = |name: &str| {
            get(name).ok_or_else(|| Error::invalid_header("Authorization", format!("missing {}", name)))
        };
        Ok(Self {
            username: required("username")?,
            realm: required("realm")?,
            nonce: required("nonce")?,
            uri: required("uri")?,
            response: required("response")?,
            algorithm: get("algorithm"),
            opaque: get("opaque"),
            qop: get("qop"),
            nc: get("nc"),
            cnonce: get("cnonce"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let creds = DigestCredentials {
            username: "alice".into(),
            realm: "example.com".into(),
            nonce: "abc".into(),
            uri: "sip:bob@example.com".into(),
            response: "0123456789abcdef0123456789abcdef".into(),
            algorithm: Some("MD5".into()),
            opaque: None,
            qop: Some("auth".into()),
            nc: Some("00000001".into()),
            cnonce: Some("xyz".into()),
        };
        let parsed: DigestCredentials = creds.to_string().parse().unwrap();
        assert_eq!(parsed, creds);
    }

    #[test]
    fn test_missing_response_rejected() {
        let text = r#"Digest username="a", realm="r", nonce="n", uri="sip:x@y""#;
        assert!(text.parse::<DigestCredentials>().is_err());
    }
}
