//! User agent configuration
//!
//! ```rust
//! use sipevent_ua_core::config::UaConfig;
//!
//! let config = UaConfig::new("sip:alice@example.com")
//!     .with_display_name("Alice")
//!     .with_credentials("example.com", "alice", "secret")
//!     .with_default_timeout(2_000);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_auth_attempts, 2);
//! ```

use serde::{Deserialize, Serialize};

use sipevent_sip_core::Uri;

use crate::error::{UaError, UaResult};

/// A static digest credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub realm: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(realm: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Configuration of one user agent session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UaConfig {
    /// Address of record, used in From headers
    pub aor: String,
    pub display_name: Option<String>,
    /// Contact URI; derived from the provider's local address when unset
    pub contact: Option<String>,
    pub user_agent: String,
    /// Timeout used by convenience operations, milliseconds
    pub default_timeout_ms: u64,
    /// Challenges answered per request before giving up
    pub max_auth_attempts: u32,
    /// Default presence subscription duration, seconds
    pub presence_expires: u32,
    /// Default duration of a REFER-created subscription, seconds
    pub refer_expires: u32,
    pub credentials: Vec<Credential>,
}

impl Default for UaConfig {
    fn default() -> Self {
        Self {
            aor: "sip:user@127.0.0.1".to_string(),
            display_name: None,
            contact: None,
            user_agent: format!("sipevent/{}", env!("CARGO_PKG_VERSION")),
            default_timeout_ms: 5_000,
            max_auth_attempts: 2,
            presence_expires: 3600,
            refer_expires: 600,
            credentials: Vec::new(),
        }
    }
}

impl UaConfig {
    pub fn new(aor: impl Into<String>) -> Self {
        Self {
            aor: aor.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_auth_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_attempts = attempts;
        self
    }

    pub fn with_presence_expires(mut self, seconds: u32) -> Self {
        self.presence_expires = seconds;
        self
    }

    pub fn with_refer_expires(mut self, seconds: u32) -> Self {
        self.refer_expires = seconds;
        self
    }

    pub fn with_credentials(
        mut self,
        realm: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials.push(Credential::new(realm, username, password));
        self
    }

    pub fn aor_uri(&self) -> UaResult<Uri> {
        self.aor
            .parse()
            .map_err(|e| UaError::precondition(format!("invalid address of record '{}': {}", self.aor, e)))
    }

    /// Contact URI, falling back to `sip:<aor user>@<local_address>`
    pub fn contact_uri(&self, local_address: &str) -> UaResult<Uri> {
        if let Some(contact) = &self.contact {
            return contact
                .parse()
                .map_err(|e| UaError::precondition(format!("invalid contact '{}': {}", contact, e)));
        }
        let aor = self.aor_uri()?;
        let text = match aor.username() {
            Some(user) => format!("{}:{}@{}", aor.scheme, user, local_address),
            None => format!("{}:{}", aor.scheme, local_address),
        };
        text.parse()
            .map_err(|e| UaError::precondition(format!("invalid local address '{}': {}", local_address, e)))
    }

    pub fn validate(&self) -> UaResult<()> {
        self.aor_uri()?;
        if let Some(contact) = &self.contact {
            contact
                .parse::<Uri>()
                .map_err(|e| UaError::precondition(format!("invalid contact '{}': {}", contact, e)))?;
        }
        if self.user_agent.trim().is_empty() {
            return Err(UaError::precondition("user agent must not be empty"));
        }
        Ok(())
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> UaResult<Self> {
        let config: UaConfig = serde_json::from_str(json)
            .map_err(|e| UaError::precondition(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> UaResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| UaError::precondition(format!("cannot serialize configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_derived_from_local_address() {
        let config = UaConfig::new("sip:alice@example.com");
        let contact = config.contact_uri("10.0.0.1:5070").unwrap();
        assert_eq!(contact.to_string(), "sip:alice@10.0.0.1:5070");

        let config = config.with_contact("sip:alice@192.168.1.5");
        assert_eq!(config.contact_uri("10.0.0.1:5070").unwrap().to_string(), "sip:alice@192.168.1.5");
    }

    #[test]
    fn test_json_defaults() {
        let config = UaConfig::from_json(r#"{"aor": "sip:bob@example.com", "max_auth_attempts": 3}"#).unwrap();
        assert_eq!(config.aor, "sip:bob@example.com");
        assert_eq!(config.max_auth_attempts, 3);
        assert_eq!(config.presence_expires, 3600);
        assert_eq!(config.refer_expires, 600);

        let back = UaConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_bad_uris() {
        assert!(UaConfig::new("alice at example").validate().is_err());
        assert!(UaConfig::new("sip:alice@example.com").with_contact("::").validate().is_err());
        assert!(UaConfig::from_json("{\"aor\": 5}").is_err());
    }
}
