//! A local user agent bound to one SIP provider
//!
//! [`SipSession`] is the provider's listener. Responses and timeouts go to
//! the [`PendingExchange`] of the request they answer; requests run through
//! the matching and processing pipelines and end up at a subscription, a
//! notifier or the session inbox.
//!
//! ```rust,no_run
//! # async fn run() -> sipevent_ua_core::error::UaResult<()> {
//! use std::sync::Arc;
//! use sipevent_ua_core::prelude::*;
//!
//! let network = LoopbackNetwork::new();
//! let provider = network.endpoint("10.0.0.1:5060")?;
//! let session = SipSession::new(provider, UaConfig::new("sip:alice@example.com"))?;
//!
//! let subscription = session.create_subscription("sip:bob@example.com", Arc::new(PresencePackage))?;
//! let request = subscription.create_subscribe_request(3600, None)?;
//! subscription.start(request, 2_000).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use sipevent_sip_core::{
    HeaderAccess, Method, Request, Response, SimpleResponseBuilder, StatusCode, Uri,
};

use crate::auth::{AuthRetrier, CredentialStore, DigestCredentialStore};
use crate::body::BodyRegistry;
use crate::config::UaConfig;
use crate::error::{UaError, UaResult};
use crate::exchange::{EventQueue, ExchangeEvent, PendingExchange};
use crate::notifier::Notifier;
use crate::package::{EventPackage, PresencePackage, ReferPackage};
use crate::pipeline::{MatchingPipeline, ProcessingPipeline};
use crate::subscription::Subscription;
use crate::transport::{
    DialogId, ExchangeId, RequestEvent, ResponseEvent, ServerExchangeId, SipListener, SipProvider, TimeoutEvent,
};

/// Handle to a user agent session; clones share the session
#[derive(Clone)]
pub struct SipSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    provider: Arc<dyn SipProvider>,
    config: UaConfig,
    aor: Uri,
    contact: Uri,
    credentials: Arc<dyn CredentialStore>,
    bodies: BodyRegistry,
    matching: MatchingPipeline,
    processing: ProcessingPipeline,
    exchanges: DashMap<ExchangeId, Arc<PendingExchange>>,
    backlog: Mutex<ExchangeBacklog>,
    subscriptions: Mutex<Vec<Weak<Subscription>>>,
    notifiers: Mutex<Vec<Weak<Notifier>>>,
    inbox: EventQueue<RequestEvent>,
    runtime: Handle,
}

/// Exchange events with no registered exchange to go to
#[derive(Default)]
struct ExchangeBacklog {
    /// Events that beat the registration of their exchange
    early: HashMap<ExchangeId, Vec<ExchangeEvent>>,
    /// Cleared before their transaction ended; events are dropped until
    /// the final one arrives
    retired: HashSet<ExchangeId>,
}

impl std::fmt::Debug for SipSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SipSession")
            .field("aor", &self.inner.aor.to_string())
            .field("contact", &self.inner.contact.to_string())
            .finish()
    }
}

/// Listener installed on the provider; holds the session weakly
struct SessionListener {
    session: Weak<SessionInner>,
}

impl SessionListener {
    fn session(&self) -> Option<SipSession> {
        self.session.upgrade().map(|inner| SipSession { inner })
    }
}

impl SipListener for SessionListener {
    fn on_request(&self, event: RequestEvent) {
        match self.session() {
            Some(session) => session.handle_request(event),
            None => debug!(method = %event.request.method, "Request for a dropped session"),
        }
    }

    fn on_response(&self, event: ResponseEvent) {
        if let Some(session) = self.session() {
            session.route_exchange_event(event.exchange, ExchangeEvent::Response(event));
        }
    }

    fn on_timeout(&self, event: TimeoutEvent) {
        if let Some(session) = self.session() {
            session.route_exchange_event(event.exchange, ExchangeEvent::Timeout(event));
        }
    }
}

impl SipSession {
    /// Create a session using digest credentials from `config`. Must be
    /// called within a tokio runtime.
    pub fn new(provider: Arc<dyn SipProvider>, config: UaConfig) -> UaResult<Self> {
        let store = Arc::new(DigestCredentialStore::from_config(&config));
        Self::with_credential_store(provider, config, store)
    }

    pub fn with_credential_store(
        provider: Arc<dyn SipProvider>,
        config: UaConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> UaResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| UaError::precondition(format!("session needs a tokio runtime: {}", e)))?;
        let aor = config.aor_uri()?;
        let contact = config.contact_uri(&provider.local_address())?;

        let inner = Arc::new(SessionInner {
            provider: provider.clone(),
            config,
            aor,
            contact,
            credentials,
            bodies: BodyRegistry::new(),
            matching: MatchingPipeline::new(),
            processing: ProcessingPipeline::new(),
            exchanges: DashMap::new(),
            backlog: Mutex::new(ExchangeBacklog::default()),
            subscriptions: Mutex::new(Vec::new()),
            notifiers: Mutex::new(Vec::new()),
            inbox: EventQueue::new(),
            runtime,
        });
        provider.set_listener(Arc::new(SessionListener {
            session: Arc::downgrade(&inner),
        }));
        info!(aor = %inner.aor, contact = %inner.contact, "SIP session ready");
        Ok(Self { inner })
    }

    pub fn config(&self) -> &UaConfig {
        &self.inner.config
    }

    pub fn aor(&self) -> &Uri {
        &self.inner.aor
    }

    pub fn contact(&self) -> &Uri {
        &self.inner.contact
    }

    pub fn provider(&self) -> &Arc<dyn SipProvider> {
        &self.inner.provider
    }

    pub fn matching(&self) -> &MatchingPipeline {
        &self.inner.matching
    }

    pub fn processing(&self) -> &ProcessingPipeline {
        &self.inner.processing
    }

    pub fn bodies(&self) -> &BodyRegistry {
        &self.inner.bodies
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.credentials
    }

    /// Fresh retrier bounded by `max_auth_attempts`
    pub fn auth_retrier(&self) -> AuthRetrier {
        AuthRetrier::new(self.inner.credentials.clone(), self.inner.config.max_auth_attempts)
    }

    /// Subscription towards `target` for `package`
    pub fn create_subscription(&self, target: &str, package: Arc<dyn EventPackage>) -> UaResult<Arc<Subscription>> {
        let target: Uri = target
            .parse()
            .map_err(|e| UaError::precondition(format!("invalid subscription target '{}': {}", target, e)))?;
        let subscription = Arc::new(Subscription::new(self.clone(), target, package));
        let mut subscriptions = self.inner.subscriptions.lock();
        subscriptions.retain(|s| s.strong_count() > 0);
        subscriptions.push(Arc::downgrade(&subscription));
        Ok(subscription)
    }

    pub fn create_presence_subscription(&self, target: &str) -> UaResult<Arc<Subscription>> {
        self.create_subscription(target, Arc::new(PresencePackage))
    }

    pub fn create_refer_subscription(&self, target: &str) -> UaResult<Arc<Subscription>> {
        self.create_subscription(target, Arc::new(ReferPackage))
    }

    /// Notifier answering SUBSCRIBE (or REFER) for `package`
    pub fn create_notifier(&self, package: Arc<dyn EventPackage>) -> Arc<Notifier> {
        let notifier = Arc::new(Notifier::new(self.clone(), package));
        let mut notifiers = self.inner.notifiers.lock();
        notifiers.retain(|n| n.strong_count() > 0);
        notifiers.push(Arc::downgrade(&notifier));
        notifier
    }

    /// Send a request outside any dialog and track its responses
    pub async fn send_request(&self, request: Request) -> UaResult<Arc<PendingExchange>> {
        self.send_tracked(request, None).await
    }

    /// Send a request, within `dialog` when given, and track its responses
    pub async fn send_tracked(&self, request: Request, dialog: Option<&DialogId>) -> UaResult<Arc<PendingExchange>> {
        let provider = &self.inner.provider;
        let id = match dialog {
            Some(dialog) => provider.send_in_dialog(dialog, request.clone()).await?,
            None => provider.send_request(request.clone()).await?,
        };
        debug!(
            method = %request.method,
            call_id = request.call_id().unwrap_or_default(),
            exchange = %id,
            "Request sent"
        );
        let exchange = Arc::new(PendingExchange::new(id, request));
        let mut backlog = self.inner.backlog.lock();
        self.inner.exchanges.insert(id, exchange.clone());
        for event in backlog.early.remove(&id).unwrap_or_default() {
            exchange.push(event);
        }
        Ok(exchange)
    }

    /// Stop tracking an exchange; late events for it are dropped
    pub fn clear_exchange(&self, id: ExchangeId) {
        let mut backlog = self.inner.backlog.lock();
        if let Some((_, exchange)) = self.inner.exchanges.remove(&id) {
            if !exchange.is_finished() {
                backlog.retired.insert(id);
            }
        }
    }

    /// Events held for exchanges that are not registered yet
    pub fn buffered_events(&self) -> usize {
        self.inner.backlog.lock().early.values().map(Vec::len).sum()
    }

    /// Next response on `exchange`, a timeout marker counts as a timeout
    pub async fn wait_response(&self, exchange: &PendingExchange, timeout_ms: u64) -> UaResult<ResponseEvent> {
        match exchange.wait(timeout_ms).await {
            Some(ExchangeEvent::Response(event)) => Ok(event),
            Some(ExchangeEvent::Timeout(_)) => Err(UaError::timeout(
                format!("{} transaction", exchange.request().method),
                timeout_ms,
            )),
            None => Err(UaError::timeout(format!("response to {}", exchange.request().method), timeout_ms)),
        }
    }

    /// Next request that no subscription or notifier consumed
    pub async fn wait_request(&self, timeout_ms: u64) -> UaResult<RequestEvent> {
        self.inner
            .inbox
            .wait(timeout_ms)
            .await
            .ok_or_else(|| UaError::timeout("incoming request", timeout_ms))
    }

    /// Response to `request` with To tag and, for 2xx, our Contact
    pub fn create_response(&self, request: &Request, status: StatusCode, reason: Option<&str>) -> Response {
        let mut builder = SimpleResponseBuilder::response_from_request(request, status, reason);
        if status.as_u16() > 100 {
            builder = builder.to_tag(&sipevent_sip_core::generate_tag());
        }
        if status.is_success() {
            builder = builder.contact(&self.inner.contact.to_string());
        }
        builder.build()
    }

    pub async fn send_response(&self, exchange: ServerExchangeId, response: Response) -> UaResult<()> {
        debug!(status = response.status_code(), exchange = %exchange, "Sending response");
        self.inner.provider.send_response(exchange, response).await
    }

    /// Send a response from a synchronous context
    pub(crate) fn spawn_response(&self, exchange: ServerExchangeId, response: Response) {
        let session = self.clone();
        self.inner.runtime.spawn(async move {
            if let Err(e) = session.send_response(exchange, response).await {
                warn!(error = %e, "Failed to send response");
            }
        });
    }

    fn route_exchange_event(&self, id: ExchangeId, event: ExchangeEvent) {
        let mut backlog = self.inner.backlog.lock();
        if let Some(exchange) = self.inner.exchanges.get(&id) {
            exchange.push(event);
            return;
        }
        if backlog.retired.contains(&id) {
            if event.is_final() {
                backlog.retired.remove(&id);
            }
            debug!(exchange = %id, "Event for a cleared exchange dropped");
            return;
        }
        debug!(exchange = %id, "Event for an exchange not yet registered");
        backlog.early.entry(id).or_default().push(event);
    }

    /// Entry point for every request the provider delivers
    pub fn handle_request(&self, event: RequestEvent) {
        if !self.inner.matching.is_match(&event.request, self) {
            debug!(
                method = %event.request.method,
                uri = %event.request.uri,
                "Request not addressed to this session"
            );
            return;
        }
        let outcome = self.inner.processing.process(&event, self);
        if !outcome.accepted {
            debug!(method = %event.request.method, "No processing strategy took the request");
        }
    }

    pub(crate) fn dispatch_to_subscription(&self, event: &RequestEvent) -> bool {
        let subscriptions: Vec<Arc<Subscription>> = self
            .inner
            .subscriptions
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        subscriptions.iter().any(|s| s.accept_notify(event))
    }

    pub(crate) fn dispatch_to_notifier(&self, event: &RequestEvent) -> bool {
        let notifiers: Vec<Arc<Notifier>> = self
            .inner
            .notifiers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        // in-dialog requests go to their dialog's notifier only
        if event.request.to_tag().is_some() {
            return notifiers.iter().any(|n| n.owns_dialog_of(&event.request) && n.accept_request(event));
        }
        let package = match event.request.method {
            Method::Refer => "refer".to_string(),
            _ => match event.request.event() {
                Some(e) => e.package,
                None => return false,
            },
        };
        let candidates: Vec<&Arc<Notifier>> = notifiers
            .iter()
            .filter(|n| n.package().name().eq_ignore_ascii_case(&package))
            .collect();
        candidates
            .iter()
            .find(|n| !n.has_dialog())
            .or_else(|| candidates.first())
            .is_some_and(|n| n.accept_request(event))
    }

    pub(crate) fn push_inbox(&self, event: RequestEvent) {
        self.inner.inbox.push(event);
    }

    /// Requests waiting in the inbox
    pub fn pending_requests(&self) -> usize {
        self.inner.inbox.len()
    }
}
