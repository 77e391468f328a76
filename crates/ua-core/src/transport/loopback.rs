//! In-process SIP provider
//!
//! A [`LoopbackNetwork`] connects any number of [`LoopbackProvider`]
//! endpoints, keyed by `host:port`. Requests are routed on the request-URI,
//! or through a registered address-of-record binding the way a proxy would
//! retarget them. Each endpoint delivers to its listener from one task, so
//! delivery order per endpoint is send order.
//!
//! Transactions are kept minimal: a request opens a client exchange at the
//! sender and a server exchange at the receiver; the first final response
//! closes both. When no final response arrives within the network's
//! transaction timeout the sender sees a [`TimeoutEvent`]. A 2xx to
//! SUBSCRIBE or REFER creates the dialog at both ends.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use sipevent_sip_core::{HeaderAccess, HeaderName, Method, Request, Response, Uri};

use super::{
    DialogId, ExchangeId, RequestEvent, ResponseEvent, ServerExchangeId, SipListener, SipProvider, TimeoutEvent,
};
use crate::error::{UaError, UaResult};

const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 2_000;

enum Delivery {
    Request(RequestEvent),
    Response(ResponseEvent),
    Timeout(TimeoutEvent),
}

struct ServerExchange {
    request: Request,
    origin: Arc<Endpoint>,
    client: ExchangeId,
}

struct Endpoint {
    address: String,
    tx: mpsc::UnboundedSender<Delivery>,
    listener: RwLock<Option<Arc<dyn SipListener>>>,
    /// Client exchanges still waiting for a final response
    client: DashMap<ExchangeId, Request>,
    server: DashMap<ServerExchangeId, ServerExchange>,
    /// Dialogs created by exchanges this endpoint started
    established: DashMap<ExchangeId, DialogId>,
    dialogs: Mutex<HashSet<DialogId>>,
}

impl Endpoint {
    fn deliver(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_err() {
            warn!(address = %self.address, "Loopback endpoint is gone, message dropped");
        }
    }

    fn knows_dialog(&self, dialog: &DialogId) -> bool {
        self.dialogs.lock().contains(dialog)
    }
}

struct NetworkInner {
    endpoints: DashMap<String, Arc<Endpoint>>,
    /// `user@host` in lower case to contact URI
    locations: DashMap<String, Uri>,
    timeout_ms: AtomicU64,
    next_id: AtomicU64,
}

/// A set of connected in-process endpoints
#[derive(Clone)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &self.inner.endpoints.len())
            .field("locations", &self.inner.locations.len())
            .finish()
    }
}

fn endpoint_key(address: &str) -> String {
    let address = address.trim().to_ascii_lowercase();
    if address.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        address
    } else {
        format!("{}:5060", address)
    }
}

fn location_key(uri: &Uri) -> Option<String> {
    let user = uri.username()?;
    Some(format!("{}@{}", user, uri.host).to_ascii_lowercase())
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                endpoints: DashMap::new(),
                locations: DashMap::new(),
                timeout_ms: AtomicU64::new(DEFAULT_TRANSACTION_TIMEOUT_MS),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Attach an endpoint at `address` (`host` or `host:port`). Must be
    /// called within a tokio runtime.
    pub fn endpoint(&self, address: &str) -> UaResult<Arc<LoopbackProvider>> {
        let key = endpoint_key(address);
        if self.inner.endpoints.contains_key(&key) {
            return Err(UaError::transport(format!("address {} already in use", key)));
        }
        let runtime = Handle::try_current()
            .map_err(|e| UaError::transport(format!("loopback endpoint needs a tokio runtime: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Endpoint {
            address: key.clone(),
            tx,
            listener: RwLock::new(None),
            client: DashMap::new(),
            server: DashMap::new(),
            established: DashMap::new(),
            dialogs: Mutex::new(HashSet::new()),
        });
        runtime.spawn(run_delivery(Arc::downgrade(&endpoint), rx));
        self.inner.endpoints.insert(key.clone(), endpoint.clone());
        debug!(address = %key, "Loopback endpoint attached");

        Ok(Arc::new(LoopbackProvider {
            endpoint,
            network: self.inner.clone(),
        }))
    }

    /// Route requests for `aor` to `contact`
    pub fn register(&self, aor: &Uri, contact: &Uri) {
        if let Some(key) = location_key(aor) {
            debug!(aor = %key, contact = %contact, "Loopback location registered");
            self.inner.locations.insert(key, contact.clone());
        }
    }

    pub fn unregister(&self, aor: &Uri) -> bool {
        location_key(aor).is_some_and(|key| self.inner.locations.remove(&key).is_some())
    }

    /// Time a client exchange waits for a final response before timing out
    pub fn set_transaction_timeout(&self, timeout: Duration) {
        self.inner
            .timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.timeout_ms.load(Ordering::Relaxed))
    }
}

impl NetworkInner {
    /// Destination endpoint and, for a registered AOR, the new request-URI
    fn resolve(&self, uri: &Uri) -> UaResult<(Arc<Endpoint>, Option<Uri>)> {
        let retarget = location_key(uri).and_then(|key| self.locations.get(&key).map(|c| c.clone()));
        let next_hop = retarget.as_ref().unwrap_or(uri).host_port();
        let endpoint = self
            .endpoints
            .get(&endpoint_key(&next_hop))
            .map(|e| e.clone())
            .ok_or_else(|| UaError::transport(format!("no loopback endpoint at {}", next_hop)))?;
        Ok((endpoint, retarget))
    }
}

async fn run_delivery(endpoint: Weak<Endpoint>, mut rx: mpsc::UnboundedReceiver<Delivery>) {
    while let Some(delivery) = rx.recv().await {
        let Some(endpoint) = endpoint.upgrade() else {
            break;
        };
        let listener = endpoint.listener.read().clone();
        let Some(listener) = listener else {
            debug!(address = %endpoint.address, "No listener installed, message dropped");
            continue;
        };
        match delivery {
            Delivery::Request(event) => listener.on_request(event),
            Delivery::Response(event) => listener.on_response(event),
            Delivery::Timeout(event) => listener.on_timeout(event),
        }
    }
}

/// One endpoint of a [`LoopbackNetwork`]
pub struct LoopbackProvider {
    endpoint: Arc<Endpoint>,
    network: Arc<NetworkInner>,
}

impl std::fmt::Debug for LoopbackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackProvider")
            .field("address", &self.endpoint.address)
            .finish()
    }
}

impl LoopbackProvider {
    /// Dialogs this endpoint takes part in
    pub fn dialogs(&self) -> Vec<DialogId> {
        self.endpoint.dialogs.lock().iter().cloned().collect()
    }

    /// Client exchanges still waiting for a final response
    pub fn outstanding(&self) -> usize {
        self.endpoint.client.len()
    }

    /// Received requests not answered with a final response yet
    pub fn unanswered(&self) -> usize {
        self.endpoint.server.len()
    }

    fn route(&self, mut request: Request) -> UaResult<ExchangeId> {
        if !request.has_header(&HeaderName::Via) {
            request.prepend_header(
                HeaderName::Via,
                format!(
                    "SIP/2.0/UDP {};branch={}",
                    self.endpoint.address,
                    sipevent_sip_core::generate_branch()
                ),
            );
        }
        let id = self.network.next_id.fetch_add(1, Ordering::Relaxed);
        let client_id = ExchangeId(id);
        let server_id = ServerExchangeId(id);

        let (destination, retarget) = match self.network.resolve(&request.uri) {
            Ok(resolved) => resolved,
            Err(e) => {
                // nobody will answer; the exchange runs into its timeout
                debug!(error = %e, exchange = %client_id, "Unroutable request");
                self.endpoint.client.insert(client_id, request);
                self.arm_timeout(client_id, None);
                return Ok(client_id);
            }
        };
        if let Some(contact) = retarget {
            trace!(from = %request.uri, to = %contact, "Request retargeted");
            request.uri = contact;
        }

        let dialog = match (request.call_id(), request.to_tag(), request.from_tag()) {
            (Some(call_id), Some(to_tag), Some(from_tag)) => {
                Some(DialogId::new(call_id, to_tag, from_tag)).filter(|d| destination.knows_dialog(d))
            }
            _ => None,
        };

        self.endpoint.client.insert(client_id, request.clone());
        destination.server.insert(
            server_id,
            ServerExchange {
                request: request.clone(),
                origin: self.endpoint.clone(),
                client: client_id,
            },
        );
        debug!(
            method = %request.method,
            from = %self.endpoint.address,
            to = %destination.address,
            exchange = %client_id,
            "Loopback request"
        );
        destination.deliver(Delivery::Request(RequestEvent {
            request,
            server_exchange: server_id,
            dialog,
        }));
        self.arm_timeout(client_id, Some((Arc::downgrade(&destination), server_id)));
        Ok(client_id)
    }

    /// Time the client exchange out; the receiver's unanswered server
    /// exchange goes with it
    fn arm_timeout(&self, exchange: ExchangeId, server: Option<(Weak<Endpoint>, ServerExchangeId)>) {
        let endpoint = Arc::downgrade(&self.endpoint);
        let timeout = Duration::from_millis(self.network.timeout_ms.load(Ordering::Relaxed));
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(endpoint) = endpoint.upgrade() else {
                return;
            };
            if endpoint.client.remove(&exchange).is_none() {
                return;
            }
            debug!(exchange = %exchange, "Loopback transaction timed out");
            if let Some((destination, server_id)) = server {
                if let Some(destination) = destination.upgrade() {
                    destination.server.remove(&server_id);
                }
            }
            endpoint.deliver(Delivery::Timeout(TimeoutEvent { exchange }));
        });
    }
}

#[async_trait]
impl SipProvider for LoopbackProvider {
    fn local_address(&self) -> String {
        self.endpoint.address.clone()
    }

    fn set_listener(&self, listener: Arc<dyn SipListener>) {
        *self.endpoint.listener.write() = Some(listener);
    }

    async fn send_request(&self, request: Request) -> UaResult<ExchangeId> {
        self.route(request)
    }

    async fn send_in_dialog(&self, dialog: &DialogId, request: Request) -> UaResult<ExchangeId> {
        if !self.endpoint.knows_dialog(dialog) {
            return Err(UaError::transport(format!("unknown dialog {}", dialog)));
        }
        self.route(request)
    }

    async fn send_response(&self, exchange: ServerExchangeId, response: Response) -> UaResult<()> {
        let is_final = response.status().is_final();
        let (request, origin, client) = if is_final {
            let (_, server) = self
                .endpoint
                .server
                .remove(&exchange)
                .ok_or_else(|| UaError::transport(format!("unknown or completed exchange {}", exchange)))?;
            (server.request, server.origin, server.client)
        } else {
            let server = self
                .endpoint
                .server
                .get(&exchange)
                .ok_or_else(|| UaError::transport(format!("unknown or completed exchange {}", exchange)))?;
            (server.request.clone(), server.origin.clone(), server.client)
        };

        let creates_dialog =
            response.status().is_success() && matches!(request.method, Method::Subscribe | Method::Refer);
        let client_dialog = match (response.call_id(), response.from_tag(), response.to_tag()) {
            (Some(call_id), Some(from_tag), Some(to_tag)) if response.status().is_success() => {
                let dialog = DialogId::new(call_id, from_tag, to_tag);
                if creates_dialog {
                    self.endpoint.dialogs.lock().insert(dialog.reversed());
                    origin.dialogs.lock().insert(dialog.clone());
                    origin.established.insert(client, dialog.clone());
                }
                Some(dialog).filter(|d| origin.knows_dialog(d))
            }
            _ => None,
        };

        let outstanding = if is_final {
            origin.client.remove(&client).is_some()
        } else {
            origin.client.contains_key(&client)
        };
        if !outstanding {
            debug!(exchange = %client, status = response.status_code(), "Response after transaction end dropped");
            return Ok(());
        }
        origin.deliver(Delivery::Response(ResponseEvent {
            exchange: client,
            response,
            dialog: client_dialog,
        }));
        Ok(())
    }

    fn dialog_for(&self, exchange: ExchangeId) -> Option<DialogId> {
        self.endpoint.established.get(&exchange).map(|d| d.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipevent_sip_core::{SimpleRequestBuilder, SimpleResponseBuilder, StatusCode};
    use tokio::sync::mpsc::UnboundedSender;

    #[derive(Debug)]
    enum Seen {
        Request(RequestEvent),
        Response(ResponseEvent),
        Timeout(TimeoutEvent),
    }

    struct Recorder(UnboundedSender<Seen>);

    impl SipListener for Recorder {
        fn on_request(&self, event: RequestEvent) {
            let _ = self.0.send(Seen::Request(event));
        }
        fn on_response(&self, event: ResponseEvent) {
            let _ = self.0.send(Seen::Response(event));
        }
        fn on_timeout(&self, event: TimeoutEvent) {
            let _ = self.0.send(Seen::Timeout(event));
        }
    }

    fn recorder(provider: &LoopbackProvider) -> mpsc::UnboundedReceiver<Seen> {
        let (tx, rx) = mpsc::unbounded_channel();
        provider.set_listener(Arc::new(Recorder(tx)));
        rx
    }

    fn subscribe(to: &str) -> Request {
        SimpleRequestBuilder::new(Method::Subscribe, to)
            .unwrap()
            .from("", "sip:alice@a.test", Some("atag"))
            .to("", to, None)
            .call_id("call-1")
            .cseq(1)
            .event("presence")
            .expires(60)
            .build()
    }

    #[tokio::test]
    async fn test_request_response_and_dialog() {
        let network = LoopbackNetwork::new();
        let alice = network.endpoint("10.0.0.1:5060").unwrap();
        let bob = network.endpoint("10.0.0.2").unwrap();
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);

        let id = alice.send_request(subscribe("sip:bob@10.0.0.2")).await.unwrap();
        let Some(Seen::Request(event)) = bob_rx.recv().await else {
            panic!("expected request");
        };
        assert!(event.request.has_header(&HeaderName::Via));
        assert!(event.dialog.is_none());

        let response = SimpleResponseBuilder::response_from_request(&event.request, StatusCode::Ok, None)
            .to_tag("btag")
            .build();
        bob.send_response(event.server_exchange, response).await.unwrap();

        let Some(Seen::Response(event)) = alice_rx.recv().await else {
            panic!("expected response");
        };
        assert_eq!(event.exchange, id);
        let dialog = DialogId::new("call-1", "atag", "btag");
        assert_eq!(event.dialog.as_ref(), Some(&dialog));
        assert_eq!(alice.dialog_for(id), Some(dialog.clone()));
        assert_eq!(bob.dialogs(), vec![dialog.reversed()]);
        assert_eq!(alice.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_registered_aor_is_retargeted() {
        let network = LoopbackNetwork::new();
        let alice = network.endpoint("10.0.0.1:5060").unwrap();
        let bob = network.endpoint("10.0.0.2:5070").unwrap();
        let mut bob_rx = recorder(&bob);
        network.register(
            &"sip:bob@example.com".parse().unwrap(),
            &"sip:bob@10.0.0.2:5070".parse().unwrap(),
        );

        alice.send_request(subscribe("sip:bob@example.com")).await.unwrap();
        let Some(Seen::Request(event)) = bob_rx.recv().await else {
            panic!("expected request");
        };
        assert_eq!(event.request.uri.to_string(), "sip:bob@10.0.0.2:5070");
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let network = LoopbackNetwork::new();
        network.set_transaction_timeout(Duration::from_millis(50));
        let alice = network.endpoint("10.0.0.1").unwrap();
        let bob = network.endpoint("10.0.0.2").unwrap();
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);

        let id = alice.send_request(subscribe("sip:bob@10.0.0.2")).await.unwrap();
        let Some(Seen::Request(request)) = bob_rx.recv().await else {
            panic!("expected request");
        };
        assert_eq!(bob.unanswered(), 1);
        let Some(Seen::Timeout(event)) = alice_rx.recv().await else {
            panic!("expected timeout");
        };
        assert_eq!(event.exchange, id);
        assert_eq!(alice.outstanding(), 0);
        assert_eq!(bob.unanswered(), 0);

        let late = SimpleResponseBuilder::response_from_request(&request.request, StatusCode::Ok, None)
            .to_tag("btag")
            .build();
        let err = bob.send_response(request.server_exchange, late).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_unknown_destination_and_dialog() {
        let network = LoopbackNetwork::new();
        network.set_transaction_timeout(Duration::from_millis(20));
        let alice = network.endpoint("10.0.0.1").unwrap();
        let mut alice_rx = recorder(&alice);
        let id = alice.send_request(subscribe("sip:bob@10.9.9.9")).await.unwrap();
        let Some(Seen::Timeout(event)) = alice_rx.recv().await else {
            panic!("expected timeout");
        };
        assert_eq!(event.exchange, id);

        let dialog = DialogId::new("c", "l", "r");
        let err = alice.send_in_dialog(&dialog, subscribe("sip:bob@10.0.0.1")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
        assert!(network.endpoint("10.0.0.1:5060").is_err());
    }
}
