//! The boundary to the SIP stack
//!
//! The engine never touches sockets, retransmission or transaction timers.
//! It hands fully formed requests and responses to a [`SipProvider`] and is
//! told about arriving traffic through a [`SipListener`] callback, one call
//! per delivered event. Exchanges and dialogs are opaque handles owned by the
//! provider.

pub mod loopback;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sipevent_sip_core::{Request, Response};

use crate::error::UaResult;

pub use loopback::{LoopbackNetwork, LoopbackProvider};

/// Handle of a client exchange (a request we sent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

/// Handle of a server exchange (a request we received and must answer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

impl fmt::Display for ServerExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server-{}", self.0)
    }
}

/// Dialog identity as seen from the local side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(call_id: impl Into<String>, local_tag: impl Into<String>, remote_tag: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }

    /// The same dialog seen from the other end
    pub fn reversed(&self) -> Self {
        Self {
            call_id: self.call_id.clone(),
            local_tag: self.remote_tag.clone(),
            remote_tag: self.local_tag.clone(),
        }
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};local={};remote={}", self.call_id, self.local_tag, self.remote_tag)
    }
}

/// An incoming request
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request: Request,
    pub server_exchange: ServerExchangeId,
    /// Dialog the request belongs to, when the provider knows one
    pub dialog: Option<DialogId>,
}

/// A response to one of our requests
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub exchange: ExchangeId,
    pub response: Response,
    /// Dialog established or confirmed by the response
    pub dialog: Option<DialogId>,
}

/// No final response arrived in time
#[derive(Debug, Clone, Copy)]
pub struct TimeoutEvent {
    pub exchange: ExchangeId,
}

/// Receives traffic from a provider
///
/// Callbacks run on the provider's delivery task and must not block; they
/// are expected to queue and return.
pub trait SipListener: Send + Sync {
    fn on_request(&self, event: RequestEvent);
    fn on_response(&self, event: ResponseEvent);
    fn on_timeout(&self, event: TimeoutEvent);
}

/// The external SIP stack
#[async_trait]
pub trait SipProvider: Send + Sync {
    /// `host:port` this provider receives on
    fn local_address(&self) -> String;

    /// Transport token written into Via headers
    fn transport(&self) -> &str {
        "UDP"
    }

    /// Install the listener; replaces any previous one
    fn set_listener(&self, listener: Arc<dyn SipListener>);

    /// Send a request outside any dialog
    async fn send_request(&self, request: Request) -> UaResult<ExchangeId>;

    /// Send a request within an established dialog
    async fn send_in_dialog(&self, dialog: &DialogId, request: Request) -> UaResult<ExchangeId>;

    /// Answer a received request
    async fn send_response(&self, exchange: ServerExchangeId, response: Response) -> UaResult<()>;

    /// Dialog currently associated with a client exchange
    fn dialog_for(&self, exchange: ExchangeId) -> Option<DialogId>;
}
