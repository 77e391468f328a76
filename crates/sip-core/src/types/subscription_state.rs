//! # Subscription-State header (RFC 6665 §8.2.3)
//!
//! ```text
//! Subscription-State: active;expires=3600
//! Subscription-State: terminated;reason=timeout
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::params::parse_params;
use crate::types::param::Param;

/// Substate value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubState {
    Active,
    Pending,
    Terminated,
    /// Unknown extension substate
    Extension(String),
}

impl SubState {
    pub fn as_str(&self) -> &str {
        match self {
            SubState::Active => "active",
            SubState::Pending => "pending",
            SubState::Terminated => "terminated",
            SubState::Extension(s) => s,
        }
    }
}

impl fmt::Display for SubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        if token.is_empty() {
            return Err(Error::invalid_header("Subscription-State", s));
        }
        Ok(match token.to_ascii_lowercase().as_str() {
            "active" => SubState::Active,
            "pending" => SubState::Pending,
            "terminated" => SubState::Terminated,
            other => SubState::Extension(other.to_string()),
        })
    }
}

/// Parsed Subscription-State header value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStateHeader {
    pub state: SubState,
    /// `reason` parameter (termination reason)
    pub reason: Option<String>,
    /// `expires` parameter, seconds
    pub expires: Option<u32>,
    /// `retry-after` parameter, seconds
    pub retry_after: Option<u32>,
    /// Any other parameters
    pub params: Vec<Param>,
}

impl SubscriptionStateHeader {
    pub fn new(state: SubState) -> Self {
        Self {
            state,
            reason: None,
            expires: None,
            retry_after: None,
            params: Vec::new(),
        }
    }

    pub fn active(expires: u32) -> Self {
        Self::new(SubState::Active).with_expires(expires)
    }

    pub fn pending(expires: u32) -> Self {
        Self::new(SubState::Pending).with_expires(expires)
    }

    pub fn terminated(reason: impl Into<String>) -> Self {
        Self::new(SubState::Terminated).with_reason(reason)
    }

    pub fn with_expires(mut self, expires: u32) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.reason = if reason.is_empty() { None } else { Some(reason) };
        self
    }
}

impl fmt::Display for SubscriptionStateHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)?;
        if let Some(reason) = &self.reason {
            write!(f, ";reason={}", reason)?;
        }
        if let Some(expires) = self.expires {
            write!(f, ";expires={}", expires)?;
        }
        if let Some(retry) = self.retry_after {
            write!(f, ";retry-after={}", retry)?;
        }
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for SubscriptionStateHeader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (state_part, rest) = match s.find(';') {
            Some(idx) => (&s[..idx], &s[idx..]),
            None => (s, ""),
        };
        let mut header = Self::new(state_part.parse()?);
        for param in parse_params(rest) {
            let number = || {
                param
                    .value
                    .as_deref()
                    .and_then(|v| v.trim().parse::<u32>().ok())
                    .ok_or_else(|| Error::invalid_header("Subscription-State", s))
            };
            if param.is("reason") {
                header.reason = param.value.clone();
            } else if param.is("expires") {
                header.expires = Some(number()?);
            } else if param.is("retry-after") {
                header.retry_after = Some(number()?);
            } else {
                header.params.push(param.clone());
            }
        }
        Ok(header)
    }
}
