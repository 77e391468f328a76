use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::params::parse_auth_params;

/// A challenge carried by a 401 or 407 response
///
/// ```rust
/// use sipevent_sip_core::Challenge;
///
/// let challenge: Challenge = r#"Digest realm="example.com", nonce="abc", qop="auth,auth-int""#
///     .parse()
///     .unwrap();
/// assert!(challenge.is_digest());
/// assert_eq!(challenge.realm(), Some("example.com"));
/// assert_eq!(challenge.qop_options(), vec!["auth", "auth-int"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Authentication scheme, normally `Digest`
    pub scheme: String,
    /// Parameters with lower-cased names and unquoted values
    pub params: Vec<(String, String)>,
}

impl Challenge {
    /// Build a digest challenge for `realm` with a fresh nonce
    pub fn digest(realm: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            scheme: "Digest".to_string(),
            params: vec![
                ("realm".to_string(), realm.into()),
                ("nonce".to_string(), nonce.into()),
                ("algorithm".to_string(), "MD5".to_string()),
            ],
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn is_digest(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("digest")
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn realm(&self) -> Option<&str> {
        self.param("realm")
    }

    pub fn nonce(&self) -> Option<&str> {
        self.param("nonce")
    }

    pub fn opaque(&self) -> Option<&str> {
        self.param("opaque")
    }

    /// Algorithm, `MD5` when absent
    pub fn algorithm(&self) -> &str {
        self.param("algorithm").unwrap_or("MD5")
    }

    /// The comma separated `qop` options offered
    pub fn qop_options(&self) -> Vec<&str> {
        self.param("qop")
            .map(|q| q.split(',').map(str::trim).filter(|q| !q.is_empty()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.scheme)?;
        for (idx, (name, value)) in self.params.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            if name == "algorithm" || name == "stale" {
                write!(f, "{}={}", name, value)?;
            } else {
                write!(f, "{}=\"{}\"", name, value)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Challenge {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::invalid_header("WWW-Authenticate", s))?;
        let params = parse_auth_params(rest);
        if params.is_empty() {
            return Err(Error::invalid_header("WWW-Authenticate", s));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_reparse() {
        let challenge = Challenge::digest("example.com", "n0nce").with_param("qop", "auth");
        let reparsed: Challenge = challenge.to_string().parse().unwrap();
        assert_eq!(reparsed, challenge);
        assert_eq!(reparsed.algorithm(), "MD5");
    }

    #[test]
    fn test_missing_params_rejected() {
        assert!("Digest".parse::<Challenge>().is_err());
    }
}
