//! # sipevent-ua-core
//!
//! Client-side engine for SIP event subscriptions, used to write test user
//! agents that exercise SUBSCRIBE/NOTIFY (RFC 3265/6665) and REFER
//! (RFC 3515) against a far end.
//!
//! ## Pieces
//!
//! - [`session::SipSession`]: one local user agent bound to a
//!   [`transport::SipProvider`]. It owns the request classification
//!   pipelines and routes responses to the exchange waiting for them.
//! - [`subscription::Subscription`]: the subscriber state machine with
//!   challenge handling, refresh, unsubscribe, fetch and NOTIFY validation.
//! - [`notifier::Notifier`]: the notifier role, for playing the far end.
//! - [`pipeline`]: ordered matching and processing strategies deciding
//!   whether an inbound request is ours and who consumes it.
//! - [`auth`]: digest credentials and the bounded 401/407 retry.
//! - [`transport::LoopbackNetwork`]: an in-process provider so both ends of
//!   a scenario can run in one test.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipevent_ua_core::prelude::*;
//!
//! # async fn run() -> UaResult<()> {
//! let network = LoopbackNetwork::new();
//! let alice = SipSession::new(network.endpoint("10.0.0.1")?, UaConfig::new("sip:alice@10.0.0.1"))?;
//! let bob = SipSession::new(network.endpoint("10.0.0.2")?, UaConfig::new("sip:bob@10.0.0.2"))?;
//!
//! let notifier = bob.create_notifier(Arc::new(PresencePackage));
//! let subscription = alice.create_presence_subscription("sip:bob@10.0.0.2:5060")?;
//! let request = subscription.create_subscribe_request(3600, None)?;
//!
//! let (started, answered) = tokio::join!(
//!     subscription.start(request, 2_000),
//!     notifier.process_subscribe(2_000, StatusCode::Ok, None, Some(3600)),
//! );
//! started?;
//! answered?;
//! assert_eq!(subscription.state(), SubscriptionState::Active);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod body;
pub mod config;
pub mod correlator;
pub mod error;
pub mod exchange;
pub mod notifier;
pub mod package;
pub mod pipeline;
pub mod session;
pub mod subscription;
pub mod transport;

pub use auth::{AuthRetrier, CredentialStore, DigestCredentialStore};
pub use body::{BodyRegistry, BodyUnmarshaller, NotifyBody};
pub use config::{Credential, UaConfig};
pub use correlator::EventCorrelator;
pub use error::{ErrorKind, UaError, UaResult};
pub use exchange::{Deadline, EventQueue, PendingExchange};
pub use notifier::Notifier;
pub use package::{EventPackage, PresencePackage, ReferPackage};
pub use session::SipSession;
pub use subscription::{Subscription, SubscriptionState};
pub use transport::{
    DialogId, ExchangeId, LoopbackNetwork, LoopbackProvider, RequestEvent, ResponseEvent, ServerExchangeId,
    SipListener, SipProvider, TimeoutEvent,
};

/// Everything a test program usually needs
pub mod prelude {
    pub use crate::auth::{CredentialStore, DigestCredentialStore};
    pub use crate::body::NotifyBody;
    pub use crate::config::UaConfig;
    pub use crate::error::{UaError, UaResult};
    pub use crate::notifier::Notifier;
    pub use crate::package::{EventPackage, PresencePackage, ReferPackage};
    pub use crate::pipeline::{MatchingPipeline, MatchingStrategy, ProcessingPipeline, ProcessingStrategy};
    pub use crate::session::SipSession;
    pub use crate::subscription::{Subscription, SubscriptionState};
    pub use crate::transport::{DialogId, LoopbackNetwork, RequestEvent, SipProvider};
    pub use sipevent_sip_core::prelude::*;
    pub use sipevent_sip_core::{BasicStatus, PidfDocument, SipFrag, Tuple};
}
