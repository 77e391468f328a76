//! Content-Type header value (`application/pidf+xml;charset=utf-8`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::params::parse_params;
use crate::types::param::Param;

/// Media type of a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    pub media_type: String,
    pub sub_type: String,
    pub params: Vec<Param>,
}

impl ContentType {
    pub fn new(media_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            sub_type: sub_type.into(),
            params: Vec::new(),
        }
    }

    /// `application/pidf+xml`
    pub fn pidf() -> Self {
        Self::new("application", "pidf+xml")
    }

    /// `message/sipfrag`
    pub fn sipfrag() -> Self {
        Self::new("message", "sipfrag")
    }

    /// Case-insensitive type/subtype check, parameters ignored
    pub fn is(&self, media_type: &str, sub_type: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type) && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Same type/subtype as `other`
    pub fn same_type(&self, other: &ContentType) -> bool {
        self.is(&other.media_type, &other.sub_type)
    }

    /// Lower-case `type/subtype`, used as a registry key
    pub fn essence(&self) -> String {
        format!("{}/{}", self.media_type, self.sub_type).to_ascii_lowercase()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type, self.sub_type)?;
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (essence, rest) = match s.find(';') {
            Some(idx) => (&s[..idx], &s[idx..]),
            None => (s, ""),
        };
        let (media_type, sub_type) = essence
            .split_once('/')
            .map(|(t, st)| (t.trim(), st.trim()))
            .filter(|(t, st)| !t.is_empty() && !st.is_empty())
            .ok_or_else(|| Error::invalid_header("Content-Type", s))?;
        Ok(Self {
            media_type: media_type.to_string(),
            sub_type: sub_type.to_string(),
            params: parse_params(rest),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_params() {
        let ct: ContentType = "Application/PIDF+XML; charset=utf-8".parse().unwrap();
        assert!(ct.is("application", "pidf+xml"));
        assert!(ct.same_type(&ContentType::pidf()));
        assert_eq!(ct.essence(), "application/pidf+xml");
        assert_eq!(ct.params.len(), 1);
    }

    #[test]
    fn test_rejects_missing_subtype() {
        assert!("text".parse::<ContentType>().is_err());
        assert!("text/".parse::<ContentType>().is_err());
    }
}
