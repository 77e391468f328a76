//! # SIP Parameters
//!
//! Generic `name[=value]` parameters as they appear on URIs
//! (`sip:alice@host;transport=tcp`) and on header values
//! (`<sip:bob@host>;tag=1928301774`, `presence;id=42`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single generic parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name, compared case-insensitively
    pub name: String,
    /// Value, `None` for flag parameters such as `lr`
    pub value: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            value: value.map(Into::into),
        }
    }

    /// `tag=<value>` parameter
    pub fn tag(value: impl Into<String>) -> Self {
        Self::new("tag", Some(value))
    }

    /// Flag parameter without a value
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Case-insensitive name comparison
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) if needs_quoting(value) => write!(f, "{}=\"{}\"", self.name, value),
            Some(value) => write!(f, "{}={}", self.name, value),
            None => f.write_str(&self.name),
        }
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty() || value.chars().any(|c| c.is_whitespace() || ";,\"<>".contains(c))
}

/// Find a parameter value by name
pub fn find_param<'a>(params: &'a [Param], name: &str) -> Option<&'a Param> {
    params.iter().find(|p| p.is(name))
}

/// Set (or replace) a parameter in a list
pub fn set_param(params: &mut Vec<Param>, name: &str, value: Option<String>) {
    match params.iter_mut().find(|p| p.is(name)) {
        Some(existing) => existing.value = value,
        None => params.push(Param {
            name: name.to_string(),
            value,
        }),
    }
}
