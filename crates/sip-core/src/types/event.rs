//! # Event header (RFC 6665 §8.2.1)
//!
//! ```text
//! Event: presence;id=1234
//! ```
//!
//! Two Event headers match when their packages are equal (case-insensitive)
//! and their `id` parameters are either both absent or equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::params::{parse_params, split_unquoted};
use crate::types::param::Param;

/// Parsed Event header value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Event package token, e.g. `presence` or `refer`
    pub package: String,
    /// The `id` parameter
    pub id: Option<String>,
    /// Any other parameters
    pub params: Vec<Param>,
}

impl EventHeader {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            id: None,
            params: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Same package (ignoring case)
    pub fn same_package(&self, package: &str) -> bool {
        self.package.eq_ignore_ascii_case(package)
    }

    /// RFC 6665 equality: same package and same id, absent ids being equal
    pub fn matches(&self, other: &EventHeader) -> bool {
        self.same_package(&other.package) && self.id == other.id
    }
}

impl fmt::Display for EventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.package)?;
        if let Some(id) = &self.id {
            write!(f, ";id={}", id)?;
        }
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for EventHeader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut segments = split_unquoted(s, ';').into_iter();
        let package = segments.next().unwrap_or_default().trim();
        if package.is_empty() || package.contains(char::is_whitespace) {
            return Err(Error::invalid_header("Event", s));
        }
        let rest = &s[package.len()..];
        let mut id = None;
        let mut params = Vec::new();
        for param in parse_params(rest) {
            if param.is("id") {
                id = param.value;
            } else {
                params.push(param);
            }
        }
        Ok(Self {
            package: package.to_string(),
            id,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_id() {
        let event: EventHeader = "presence;id=42;foo".parse().unwrap();
        assert_eq!(event.package, "presence");
        assert_eq!(event.id.as_deref(), Some("42"));
        assert_eq!(event.params.len(), 1);
        assert_eq!(event.to_string(), "presence;id=42;foo");
    }

    #[test]
    fn test_matching_rules() {
        let a: EventHeader = "presence".parse().unwrap();
        let b: EventHeader = "Presence".parse().unwrap();
        let c: EventHeader = "presence;id=1".parse().unwrap();
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(c.matches(&"presence;id=1".parse().unwrap()));
        assert!(!c.matches(&"presence;id=2".parse().unwrap()));
    }

    #[test]
    fn test_rejects_empty() {
        assert!("".parse::<EventHeader>().is_err());
        assert!(";id=1".parse::<EventHeader>().is_err());
    }
}
