//! Small parsers for the header values this crate understands
//!
//! Whole-message parsing belongs to the SIP provider. What lives here is the
//! value-level grammar: URIs (nom based), `;`-separated parameter lists and
//! `,`-separated auth-param lists, all quote aware.

pub mod params;
pub mod sip_uri;

pub use params::{parse_auth_params, parse_params, split_unquoted, unquote};
pub use sip_uri::parse_uri;
