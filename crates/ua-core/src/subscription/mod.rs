//! Subscriber side of SUBSCRIBE/NOTIFY and REFER
//!
//! A [`Subscription`] owns one dialog towards a notifier. The test program
//! builds requests with [`Subscription::create_subscribe_request`] or
//! [`Subscription::create_refer_request`], may edit them, and then drives the
//! exchange with [`start`](Subscription::start), [`refresh`](Subscription::refresh),
//! [`end`](Subscription::end) or [`fetch`](Subscription::fetch). Each of these
//! answers 401/407 challenges with the session credentials and waits for the
//! final response within one overall deadline.
//!
//! NOTIFYs for the subscription are queued by the session and handed out by
//! [`Subscription::wait_notify`]. [`Subscription::process_notify`] validates
//! one against the subscription and returns the response to send; a NOTIFY
//! that fails validation leaves the subscription untouched.
//!
//! State only moves forward:
//!
//! ```text
//!  PENDING ──2xx / NOTIFY active──► ACTIVE
//!     │                               │
//!     └────────► TERMINATED ◄─────────┘
//! ```

mod state;

pub use state::SubscriptionState;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sipevent_sip_core::{
    EventHeader, HeaderAccess, Method, Request, Response, SimpleRequestBuilder, SimpleResponseBuilder, SipFrag,
    StatusCode, Tuple, Uri,
};

use crate::body::NotifyBody;
use crate::correlator::EventCorrelator;
use crate::error::{UaError, UaResult};
use crate::exchange::{Deadline, EventQueue, ExchangeEvent};
use crate::package::EventPackage;
use crate::session::SipSession;
use crate::transport::{DialogId, RequestEvent, ResponseEvent};

use self::state::SubscriptionInner;

/// Outcome of a NOTIFY that passed validation
struct NotifyUpdate {
    state: sipevent_sip_core::SubscriptionStateHeader,
    expires: Option<u32>,
    body: Option<NotifyBody>,
}

/// One subscription (or implicit REFER subscription) held by a session
pub struct Subscription {
    session: SipSession,
    package: Arc<dyn EventPackage>,
    target: Uri,
    inner: Mutex<SubscriptionInner>,
    notifies: EventQueue<RequestEvent>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Subscription")
            .field("package", &self.package.name())
            .field("target", &self.target.to_string())
            .field("state", &inner.state)
            .field("call_id", &inner.call_id)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(session: SipSession, target: Uri, package: Arc<dyn EventPackage>) -> Self {
        let host = session.contact().host.to_string();
        let inner = SubscriptionInner::new(
            sipevent_sip_core::generate_call_id(&host),
            sipevent_sip_core::generate_tag(),
            target.clone(),
        );
        Self {
            session,
            package,
            target,
            inner: Mutex::new(inner),
            notifies: EventQueue::new(),
        }
    }

    pub fn package(&self) -> &Arc<dyn EventPackage> {
        &self.package
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn call_id(&self) -> String {
        self.inner.lock().call_id.clone()
    }

    pub fn local_tag(&self) -> String {
        self.inner.lock().local_tag.clone()
    }

    /// SUBSCRIBE for this subscription. Outside a dialog it goes to the
    /// target; once a dialog exists it is an in-dialog refresh.
    pub fn create_subscribe_request(&self, duration: u32, event_id: Option<&str>) -> UaResult<Request> {
        let inner = self.inner.lock();
        if inner.state == SubscriptionState::Terminated {
            return Err(UaError::precondition("subscription is terminated"));
        }
        let event = match (event_id, &inner.refer_event) {
            (Some(id), _) => EventHeader::new(self.package.name()).with_id(id),
            // in a REFER dialog the subscription keeps the REFER's id
            (None, Some(refer)) => refer.clone(),
            (None, None) => EventHeader::new(self.package.name()),
        };
        let request = self
            .base_request(&inner, Method::Subscribe)
            .event_header(&event)
            .expires(duration)
            .accept(&self.package.content_type().to_string())
            .build();
        Ok(request)
    }

    /// REFER asking the far end to contact `refer_to`. `duration` bounds the
    /// implicit subscription since REFER carries no Expires.
    pub fn create_refer_request(&self, refer_to: &str, duration: u32) -> UaResult<Request> {
        if self.package.method() != Method::Refer {
            return Err(UaError::precondition(format!(
                "package '{}' is not a REFER package",
                self.package.name()
            )));
        }
        let target: Uri = refer_to
            .parse()
            .map_err(|e| UaError::precondition(format!("invalid Refer-To '{}': {}", refer_to, e)))?;
        let mut inner = self.inner.lock();
        if inner.state == SubscriptionState::Terminated {
            return Err(UaError::precondition("subscription is terminated"));
        }
        inner.refer_duration = Some(duration);
        Ok(self
            .base_request(&inner, Method::Refer)
            .refer_to(&target.to_string())
            .build())
    }

    fn base_request(&self, inner: &SubscriptionInner, method: Method) -> SimpleRequestBuilder {
        let config = self.session.config();
        let (uri, remote_tag) = match &inner.dialog {
            Some(dialog) => (inner.remote_target.clone(), Some(dialog.remote_tag.as_str())),
            None => (self.target.clone(), None),
        };
        SimpleRequestBuilder::with_uri(method, uri)
            .from(
                config.display_name.as_deref().unwrap_or(""),
                &self.session.aor().to_string(),
                Some(&inner.local_tag),
            )
            .to("", &self.target.to_string(), remote_tag)
            .call_id(&inner.call_id)
            .cseq(inner.local_cseq + 1)
            .max_forwards(70)
            .contact(&self.session.contact().to_string())
            .user_agent(&config.user_agent)
    }

    /// Send a SUBSCRIBE or REFER and start tracking its responses. Does not
    /// wait; see [`wait_subscribe_response`](Self::wait_subscribe_response).
    pub async fn send_subscribe(&self, request: Request) -> UaResult<()> {
        let result = self.send_tracked(request).await;
        self.record(result)
    }

    async fn send_tracked(&self, request: Request) -> UaResult<()> {
        if !matches!(request.method, Method::Subscribe | Method::Refer) {
            return Err(UaError::precondition(format!(
                "cannot send {} as a subscription request",
                request.method
            )));
        }
        let cseq = request
            .cseq()
            .ok_or_else(|| UaError::precondition("subscription request has no CSeq"))?;
        let (dialog, previous) = {
            let mut inner = self.inner.lock();
            (inner.dialog.clone(), inner.exchange.take())
        };
        if let Some(previous) = previous {
            self.session.clear_exchange(previous.id());
        }

        debug!(
            method = %request.method,
            cseq = cseq.seq,
            target = %request.uri,
            in_dialog = dialog.is_some(),
            "Sending subscription request"
        );
        let exchange = self.session.send_tracked(request.clone(), dialog.as_ref()).await?;

        // only a request that went out becomes the subscription's reference
        let mut inner = self.inner.lock();
        inner.local_cseq = inner.local_cseq.max(cseq.seq);
        inner.requested_expires = match request.expires() {
            Some(expires) => Some(expires),
            None if request.method == Method::Refer => Some(
                inner
                    .refer_duration
                    .unwrap_or(self.session.config().refer_expires),
            ),
            None => None,
        };
        if request.method == Method::Refer {
            inner.refer_event = EventCorrelator::expected_event(&request);
        }
        inner.last_sent_request = Some(request);
        inner.exchange = Some(exchange);
        Ok(())
    }

    /// Next response to the last request sent. A 2xx establishes the dialog
    /// and updates the remote target.
    pub async fn wait_subscribe_response(&self, timeout_ms: u64) -> UaResult<Response> {
        let result = self.next_response(timeout_ms).await;
        self.record(result)
    }

    async fn next_response(&self, timeout_ms: u64) -> UaResult<Response> {
        let exchange = self
            .inner
            .lock()
            .exchange
            .clone()
            .ok_or_else(|| UaError::precondition("no subscription request outstanding"))?;
        let method = exchange.request().method.clone();
        let event = match exchange.wait(timeout_ms).await {
            Some(ExchangeEvent::Response(event)) => event,
            Some(ExchangeEvent::Timeout(_)) => {
                return Err(UaError::timeout(format!("{} transaction", method), timeout_ms));
            }
            None => return Err(UaError::timeout(format!("response to {}", method), timeout_ms)),
        };

        let provider_dialog = if event.response.status().is_success() {
            event
                .dialog
                .clone()
                .or_else(|| self.session.provider().dialog_for(event.exchange))
        } else {
            None
        };
        let mut inner = self.inner.lock();
        inner.received_responses.push(event.response.clone());
        if event.response.status().is_success() {
            self.adopt_dialog(&mut inner, provider_dialog, &event);
        }
        debug!(
            status = event.response.status_code(),
            method = %method,
            call_id = %inner.call_id,
            "Subscription response"
        );
        Ok(event.response)
    }

    fn adopt_dialog(&self, inner: &mut SubscriptionInner, dialog: Option<DialogId>, event: &ResponseEvent) {
        if let Some(contact) = event.response.contact() {
            inner.remote_target = contact.uri;
        }
        if inner.dialog.is_some() {
            return;
        }
        let dialog = dialog.or_else(|| {
            let remote_tag = event.response.to_tag()?;
            Some(DialogId::new(inner.call_id.clone(), inner.local_tag.clone(), remote_tag))
        });
        if let Some(dialog) = dialog {
            debug!(dialog = %dialog, "Subscription dialog established");
            inner.dialog = Some(dialog);
        }
    }

    /// Wait for the final response, answering challenges on the way
    async fn drive(&self, deadline: &Deadline) -> UaResult<Response> {
        let mut retrier = self.session.auth_retrier();
        loop {
            let wait_ms = deadline.remaining_ms("subscription response")?;
            let response = self.next_response(wait_ms).await?;
            let status = response.status();
            if status.is_provisional() {
                continue;
            }
            if status.is_auth_challenge() {
                let last = self
                    .inner
                    .lock()
                    .last_sent_request
                    .clone()
                    .ok_or_else(|| UaError::precondition("no request to authenticate"))?;
                let resent = retrier.retry(&response, &last)?;
                self.send_tracked(resent).await?;
                continue;
            }
            if status.is_success() {
                return Ok(response);
            }
            return Err(UaError::far_end(response.status_code(), response.reason_phrase()));
        }
    }

    /// Wait for the final response to the last SUBSCRIBE/REFER and apply the
    /// granted duration. A terminated subscription only consumes the response.
    pub async fn process_subscribe_response(&self, timeout_ms: u64) -> UaResult<()> {
        let deadline = Deadline::after(timeout_ms);
        let result = match self.drive(&deadline).await {
            Ok(response) => self.apply_final_response(&response),
            Err(e) => Err(e),
        };
        self.record(result)
    }

    fn apply_final_response(&self, response: &Response) -> UaResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == SubscriptionState::Terminated {
            debug!(call_id = %inner.call_id, "Final response for a terminated subscription");
            return Ok(());
        }
        let is_refer = inner
            .last_sent_request
            .as_ref()
            .is_some_and(|r| r.method == Method::Refer);
        let granted = match (response.expires(), is_refer) {
            (Some(granted), _) => granted,
            (None, true) => inner.requested_expires.unwrap_or(0),
            (None, false) => {
                return Err(UaError::validation(400, "2xx to SUBSCRIBE without Expires"));
            }
        };
        if let Some(requested) = inner.requested_expires {
            if granted > requested {
                return Err(UaError::validation(
                    400,
                    format!("granted duration {} exceeds requested {}", granted, requested),
                ));
            }
        }
        inner.set_expiry(granted);
        inner.transition(SubscriptionState::Active);
        info!(call_id = %inner.call_id, expires = granted, "Subscription accepted");
        Ok(())
    }

    /// Send the initial SUBSCRIBE or REFER and wait for its outcome
    pub async fn start(&self, request: Request, timeout_ms: u64) -> UaResult<()> {
        if self.state() == SubscriptionState::Terminated {
            return self.record(Err(UaError::precondition("cannot start a terminated subscription")));
        }
        self.send_subscribe(request).await?;
        self.process_subscribe_response(timeout_ms).await
    }

    /// In-dialog refresh. A 481 means the far end lost the subscription.
    pub async fn refresh(&self, request: Request, timeout_ms: u64) -> UaResult<()> {
        let refused = {
            let inner = self.inner.lock();
            if inner.state == SubscriptionState::Terminated {
                Some("cannot refresh a terminated subscription")
            } else if inner.dialog.is_none() {
                Some("refresh needs an established dialog")
            } else {
                None
            }
        };
        if let Some(message) = refused {
            return self.record(Err(UaError::precondition(message)));
        }
        self.send_subscribe(request).await?;
        let result = self.process_subscribe_response(timeout_ms).await;
        if let Err(UaError::FarEnd { status: 481, reason }) = &result {
            let mut inner = self.inner.lock();
            inner.transition(SubscriptionState::Terminated);
            inner.termination_reason = Some(format!("481 {}", reason));
            inner.last_sent_request = None;
            inner.expiry = None;
        }
        result
    }

    /// Unsubscribe. The subscription counts as terminated from the moment
    /// the request goes out.
    pub async fn end(&self, request: Request, timeout_ms: u64) -> UaResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state == SubscriptionState::Terminated {
                drop(inner);
                return self.record(Err(UaError::precondition("subscription already terminated")));
            }
            inner.transition(SubscriptionState::Terminated);
            inner.termination_reason = Some("unsubscribed".to_string());
            inner.expiry = None;
        }
        self.send_subscribe(request).await?;
        self.process_subscribe_response(timeout_ms).await
    }

    /// One-shot state query (Expires: 0). Terminated before sending.
    pub async fn fetch(&self, request: Request, timeout_ms: u64) -> UaResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state == SubscriptionState::Terminated {
                drop(inner);
                return self.record(Err(UaError::precondition("subscription already terminated")));
            }
            inner.transition(SubscriptionState::Terminated);
            inner.termination_reason = Some("fetch".to_string());
            inner.expiry = None;
        }
        self.send_subscribe(request).await?;
        self.process_subscribe_response(timeout_ms).await
    }

    /// Called by the session for every inbound request. Returns true when
    /// the request belongs to this subscription.
    pub(crate) fn accept_notify(&self, event: &RequestEvent) -> bool {
        let mut inner = self.inner.lock();
        if !Self::correlates(&inner, &event.request) {
            return false;
        }
        inner.received_requests.push(event.request.clone());

        let seq = event.request.cseq().map(|c| c.seq);
        if let (Some(seq), Some(last)) = (seq, inner.last_notify_cseq) {
            if seq <= last {
                drop(inner);
                debug!(cseq = seq, last, "Stale NOTIFY answered and dropped");
                let response =
                    SimpleResponseBuilder::response_from_request(&event.request, StatusCode::Ok, None).build();
                self.session.spawn_response(event.server_exchange, response);
                return true;
            }
        }
        if seq.is_some() {
            inner.last_notify_cseq = seq;
        }
        drop(inner);
        self.notifies.push(event.clone());
        true
    }

    /// Does `request` correlate with the last request we sent?
    pub fn message_for_me(&self, request: &Request) -> bool {
        Self::correlates(&self.inner.lock(), request)
    }

    fn correlates(inner: &SubscriptionInner, request: &Request) -> bool {
        inner.last_sent_request.as_ref().is_some_and(|outbound| {
            EventCorrelator::correlates_with(outbound, inner.expected_event().as_ref(), request)
        })
    }

    /// Next NOTIFY for this subscription
    pub async fn wait_notify(&self, timeout_ms: u64) -> UaResult<RequestEvent> {
        let result = self
            .notifies
            .wait(timeout_ms)
            .await
            .ok_or_else(|| UaError::timeout("NOTIFY", timeout_ms));
        self.record(result)
    }

    /// NOTIFYs queued and not yet taken
    pub fn pending_notifies(&self) -> usize {
        self.notifies.len()
    }

    /// Validate a NOTIFY and apply it. Always returns the response to send:
    /// 200 on success, otherwise the failure status with the reason as
    /// phrase. Failures are also kept in [`event_errors`](Self::event_errors).
    pub fn process_notify(&self, event: &RequestEvent) -> Response {
        match self.validate_notify(&event.request) {
            Ok(update) => {
                self.apply_notify(update, event);
                SimpleResponseBuilder::response_from_request(&event.request, StatusCode::Ok, None).build()
            }
            Err(err) => {
                let status = err.status_code().unwrap_or(400);
                let reason = match &err {
                    UaError::Validation { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                warn!(status, reason = %reason, "Rejecting NOTIFY");
                self.inner.lock().event_errors.push(reason.clone());
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::Other(status));
                SimpleResponseBuilder::response_from_request(&event.request, status, Some(&reason)).build()
            }
        }
    }

    fn validate_notify(&self, request: &Request) -> UaResult<NotifyUpdate> {
        let (outbound, expected, requested, local_state) = {
            let inner = self.inner.lock();
            (
                inner.last_sent_request.clone(),
                inner.expected_event(),
                inner.requested_expires,
                inner.state,
            )
        };
        if request.method != Method::Notify {
            return Err(UaError::validation(400, format!("expected NOTIFY, got {}", request.method)));
        }
        if outbound.is_none() {
            return Err(UaError::validation(481, "no subscription for this NOTIFY"));
        }
        let event = request
            .event()
            .ok_or_else(|| UaError::validation(400, "NOTIFY without Event header"))?;
        if !event.same_package(self.package.name()) {
            return Err(UaError::validation(
                489,
                format!("unexpected event package '{}'", event.package),
            ));
        }
        if !expected.is_some_and(|expected| EventCorrelator::event_matches(&expected, &event)) {
            return Err(UaError::validation(
                400,
                format!("event id {:?} does not match the subscription", event.id),
            ));
        }
        let state = request
            .subscription_state()
            .ok_or_else(|| UaError::validation(400, "missing or malformed Subscription-State header"))?;

        let body = if request.body().is_empty() {
            None
        } else {
            let content_type = request
                .content_type()
                .ok_or_else(|| UaError::validation(400, "NOTIFY body without Content-Type"))?;
            if !content_type.same_type(&self.package.content_type()) {
                return Err(UaError::validation(
                    415,
                    format!("unsupported content type {}", content_type.essence()),
                ));
            }
            match self.session.bodies().unmarshal(&content_type, request.body()) {
                None => {
                    return Err(UaError::validation(
                        415,
                        format!("no decoder for {}", content_type.essence()),
                    ));
                }
                Some(Err(e)) => {
                    return Err(UaError::validation(400, format!("unreadable NOTIFY body: {}", e)));
                }
                Some(Ok(body)) => Some(body),
            }
        };

        let expires = state.expires.or_else(|| request.expires());
        let terminating = state.state == sipevent_sip_core::SubState::Terminated;
        if !terminating && local_state != SubscriptionState::Terminated {
            if let (Some(expires), Some(requested)) = (expires, requested) {
                if expires > requested {
                    return Err(UaError::validation(
                        400,
                        format!("NOTIFY expires {} exceeds requested {}", expires, requested),
                    ));
                }
            }
        }
        Ok(NotifyUpdate { state, expires, body })
    }

    fn apply_notify(&self, update: NotifyUpdate, event: &RequestEvent) {
        let mut inner = self.inner.lock();
        if inner.dialog.is_none() {
            let dialog = event.dialog.clone().or_else(|| {
                let remote_tag = event.request.from_tag()?;
                Some(DialogId::new(inner.call_id.clone(), inner.local_tag.clone(), remote_tag))
            });
            inner.dialog = dialog;
        }
        if let Some(contact) = event.request.contact() {
            inner.remote_target = contact.uri;
        }

        // a locally terminated subscription stays terminated whatever the NOTIFY says
        let adopted = match inner.state {
            SubscriptionState::Terminated => Some(SubscriptionState::Terminated),
            _ => SubscriptionState::from_sub_state(&update.state.state),
        };
        match adopted {
            Some(SubscriptionState::Terminated) => {
                inner.transition(SubscriptionState::Terminated);
                if update.state.reason.is_some() {
                    inner.termination_reason = update.state.reason.clone();
                }
                inner.last_sent_request = None;
                inner.expiry = None;
                info!(
                    call_id = %inner.call_id,
                    reason = inner.termination_reason.as_deref().unwrap_or("none"),
                    "Subscription closed by NOTIFY"
                );
            }
            Some(next) => {
                inner.transition(next);
                if let Some(expires) = update.expires {
                    inner.set_expiry(expires);
                }
            }
            None => {}
        }
        if let Some(body) = update.body {
            inner.fold_body(body);
        }
    }

    /// Send the response for a NOTIFY taken from [`wait_notify`](Self::wait_notify)
    pub async fn reply_to_notify(&self, event: &RequestEvent, response: Response) -> UaResult<()> {
        let result = self.session.send_response(event.server_exchange, response).await;
        self.record(result)
    }

    /// Wait for a NOTIFY, process it and send the response
    pub async fn receive_notify(&self, timeout_ms: u64) -> UaResult<(RequestEvent, Response)> {
        let event = self.wait_notify(timeout_ms).await?;
        let response = self.process_notify(&event);
        self.reply_to_notify(&event, response.clone()).await?;
        Ok((event, response))
    }

    fn record<T>(&self, result: UaResult<T>) -> UaResult<T> {
        if let Err(e) = &result {
            debug!(error = %e, "Subscription operation failed");
            self.inner.lock().last_error = Some(e.clone());
        }
        result
    }

    pub fn state(&self) -> SubscriptionState {
        self.inner.lock().state
    }

    pub fn termination_reason(&self) -> Option<String> {
        self.inner.lock().termination_reason.clone()
    }

    /// Whole seconds until expiry, 0 once passed or when none is set
    pub fn time_left(&self) -> u32 {
        self.inner.lock().time_left()
    }

    pub fn last_sent_request(&self) -> Option<Request> {
        self.inner.lock().last_sent_request.clone()
    }

    pub fn received_requests(&self) -> Vec<Request> {
        self.inner.lock().received_requests.clone()
    }

    pub fn received_responses(&self) -> Vec<Response> {
        self.inner.lock().received_responses.clone()
    }

    pub fn event_errors(&self) -> Vec<String> {
        self.inner.lock().event_errors.clone()
    }

    /// Return and clear the recorded NOTIFY failures
    pub fn take_event_errors(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().event_errors)
    }

    pub fn last_error(&self) -> Option<UaError> {
        self.inner.lock().last_error.clone()
    }

    pub fn dialog(&self) -> Option<DialogId> {
        self.inner.lock().dialog.clone()
    }

    pub fn remote_target(&self) -> Uri {
        self.inner.lock().remote_target.clone()
    }

    /// Presence tuples merged from all accepted NOTIFYs, by tuple id
    pub fn presence_tuples(&self) -> BTreeMap<String, Tuple> {
        self.inner.lock().presence.clone()
    }

    pub fn presence_notes(&self) -> Vec<String> {
        self.inner.lock().presence_notes.clone()
    }

    pub fn last_sipfrag(&self) -> Option<SipFrag> {
        self.inner.lock().last_sipfrag.clone()
    }

    pub fn last_notify_body(&self) -> Option<NotifyBody> {
        self.inner.lock().last_body.clone()
    }
}
