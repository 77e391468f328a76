//! # Name-addr values
//!
//! The value shape shared by From, To, Contact, Refer-To and Referred-By:
//!
//! ```text
//! "Alice" <sip:alice@example.com>;tag=88sja8x
//! <sip:alice@example.com>;expires=60
//! sip:alice@example.com;tag=88sja8x        (addr-spec, parameters belong to the header)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::params::{parse_params, unquote};
use crate::types::param::{find_param, set_param, Param};
use crate::types::uri::Uri;

/// A display name, URI and header parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: Vec<Param>,
}

impl Address {
    pub fn new(uri: Uri) -> Self {
        Self {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = if name.is_empty() { None } else { Some(name) };
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.set_tag(tag);
        self
    }

    /// The `tag` parameter, if any
    pub fn tag(&self) -> Option<&str> {
        self.param("tag")
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        set_param(&mut self.params, "tag", Some(tag.into()));
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name).and_then(|p| p.value.as_deref())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name.replace('"', "\\\""))?;
        }
        write!(f, "<{}>", self.uri)?;
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.find('<') {
            Some(open) => {
                let close = s[open..]
                    .find('>')
                    .map(|idx| open + idx)
                    .ok_or_else(|| Error::ParseError(format!("unterminated name-addr: {}", s)))?;
                let display = unquote(&s[..open]);
                let uri: Uri = s[open + 1..close].parse()?;
                let params = parse_params(&s[close + 1..]);
                Ok(Address {
                    display_name: if display.is_empty() { None } else { Some(display) },
                    uri,
                    params,
                })
            }
            None => {
                let (uri_part, params_part) = match s.find(';') {
                    Some(idx) => (&s[..idx], &s[idx + 1..]),
                    None => (s, ""),
                };
                Ok(Address {
                    display_name: None,
                    uri: uri_part.parse()?,
                    params: parse_params(params_part),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_addr() {
        let addr: Address = "\"Alice Smith\" <sip:alice@example.com;transport=tcp>;tag=abc"
            .parse()
            .unwrap();
        assert_eq!(addr.display_name.as_deref(), Some("Alice Smith"));
        assert_eq!(addr.uri.parameter("transport"), Some("tcp"));
        assert_eq!(addr.tag(), Some("abc"));
    }

    #[test]
    fn test_addr_spec_params_belong_to_header() {
        let addr: Address = "sip:bob@example.com;tag=xyz".parse().unwrap();
        assert!(addr.uri.parameters.is_empty());
        assert_eq!(addr.tag(), Some("xyz"));
    }

    #[test]
    fn test_display_always_brackets() {
        let addr = Address::new("sip:bob@example.com".parse().unwrap()).with_tag("t1");
        assert_eq!(addr.to_string(), "<sip:bob@example.com>;tag=t1");
    }
}
