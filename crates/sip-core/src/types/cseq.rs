//! CSeq header value (`314159 SUBSCRIBE`)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::method::Method;

/// Sequence number and method of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        Self { seq, method }
    }

    /// Same method, sequence number plus one
    pub fn next(&self) -> Self {
        Self {
            seq: self.seq.wrapping_add(1),
            method: self.method.clone(),
        }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let seq = parts
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| Error::invalid_header("CSeq", s))?;
        let method = parts
            .next()
            .ok_or_else(|| Error::invalid_header("CSeq", s))?
            .parse()?;
        if parts.next().is_some() {
            return Err(Error::invalid_header("CSeq", s));
        }
        Ok(Self { seq, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_next() {
        let cseq: CSeq = "41 SUBSCRIBE".parse().unwrap();
        assert_eq!(cseq.seq, 41);
        assert_eq!(cseq.method, Method::Subscribe);
        assert_eq!(cseq.next().to_string(), "42 SUBSCRIBE");
        assert!("SUBSCRIBE".parse::<CSeq>().is_err());
        assert!("1 NOTIFY extra".parse::<CSeq>().is_err());
    }
}
