//! # SIP Digest Authentication values
//!
//! - [`Challenge`]: the value of WWW-Authenticate / Proxy-Authenticate
//! - [`DigestCredentials`]: the value of Authorization / Proxy-Authorization
//!
//! Computing the digest itself is the credential store's job; these types
//! only carry and render the parameters.

mod challenge;
mod credentials;

pub use challenge::Challenge;
pub use credentials::DigestCredentials;
