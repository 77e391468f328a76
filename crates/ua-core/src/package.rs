//! Event packages (RFC 6665 §7)
//!
//! A package names the `Event` token, the request that creates the
//! subscription and the body type its NOTIFYs carry. NOTIFY bodies of any
//! other type are refused with 415.

use std::time::Duration;

use sipevent_sip_core::{ContentType, Method};

/// Trait for SIP event packages
pub trait EventPackage: Send + Sync {
    /// Event header token
    fn name(&self) -> &str;

    /// Request that creates a subscription of this package
    fn method(&self) -> Method {
        Method::Subscribe
    }

    /// Body type accepted in NOTIFY
    fn content_type(&self) -> ContentType;

    fn default_expires(&self) -> Duration;

    fn min_expires(&self) -> Duration {
        Duration::from_secs(0)
    }

    fn max_expires(&self) -> Duration {
        Duration::from_secs(86400) // 24 hours
    }

    /// Clamp a requested duration into the package's bounds
    fn clamp_expires(&self, requested: u32) -> u32 {
        let min = self.min_expires().as_secs();
        let max = self.max_expires().as_secs();
        if requested == 0 {
            return 0;
        }
        (requested as u64).clamp(min, max) as u32
    }
}

/// Presence event package (RFC 3856)
#[derive(Debug, Clone, Copy, Default)]
pub struct PresencePackage;

impl EventPackage for PresencePackage {
    fn name(&self) -> &str {
        "presence"
    }

    fn content_type(&self) -> ContentType {
        ContentType::pidf()
    }

    fn default_expires(&self) -> Duration {
        Duration::from_secs(3600) // 1 hour default
    }
}

/// Implicit subscription created by REFER (RFC 3515)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferPackage;

impl EventPackage for ReferPackage {
    fn name(&self) -> &str {
        "refer"
    }

    fn method(&self) -> Method {
        Method::Refer
    }

    fn content_type(&self) -> ContentType {
        ContentType::sipfrag()
    }

    fn default_expires(&self) -> Duration {
        Duration::from_secs(600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_packages() {
        assert_eq!(PresencePackage.method(), Method::Subscribe);
        assert!(PresencePackage.content_type().is("application", "pidf+xml"));
        assert_eq!(ReferPackage.method(), Method::Refer);
        assert_eq!(ReferPackage.default_expires(), Duration::from_secs(600));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(PresencePackage.clamp_expires(0), 0);
        assert_eq!(PresencePackage.clamp_expires(100_000), 86400);
        assert_eq!(PresencePackage.clamp_expires(60), 60);
    }
}
