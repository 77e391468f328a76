//! Notifier side: answering SUBSCRIBE/REFER and sending NOTIFY
//!
//! A [`Notifier`] plays the far end of a subscription in tests. It accepts
//! one subscription dialog at a time; the session routes new SUBSCRIBEs for
//! its package (or REFERs, for the refer package) and every in-dialog
//! request of that dialog to it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sipevent_sip_core::{
    ContentType, EventHeader, HeaderAccess, HeaderName, Method, PidfDocument, Request, Response,
    SimpleRequestBuilder, SipFrag, StatusCode, SubState, SubscriptionStateHeader, Uri,
};

use crate::error::{UaError, UaResult};
use crate::exchange::{Deadline, EventQueue};
use crate::package::EventPackage;
use crate::session::SipSession;
use crate::transport::{DialogId, RequestEvent};

/// Dialog state kept by the notifier
#[derive(Debug, Clone)]
struct NotifierDialog {
    call_id: String,
    local_tag: String,
    remote_tag: String,
    /// From URI of the subscriber, used in our To header
    remote_uri: Uri,
    remote_target: Uri,
    local_cseq: u32,
    event: EventHeader,
    expiry: Option<Instant>,
    terminated: bool,
}

impl NotifierDialog {
    fn id(&self) -> DialogId {
        DialogId::new(self.call_id.clone(), self.local_tag.clone(), self.remote_tag.clone())
    }

    fn set_expiry(&mut self, seconds: u32) {
        self.expiry = (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds as u64));
    }

    fn time_left(&self) -> u32 {
        self.expiry
            .map(|at| at.saturating_duration_since(Instant::now()).as_secs() as u32)
            .unwrap_or(0)
    }
}

pub struct Notifier {
    session: SipSession,
    package: Arc<dyn EventPackage>,
    dialog: Mutex<Option<NotifierDialog>>,
    requests: EventQueue<RequestEvent>,
    last_error: Mutex<Option<UaError>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("package", &self.package.name())
            .field("dialog", &self.dialog_id())
            .finish()
    }
}

impl Notifier {
    pub(crate) fn new(session: SipSession, package: Arc<dyn EventPackage>) -> Self {
        Self {
            session,
            package,
            dialog: Mutex::new(None),
            requests: EventQueue::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn package(&self) -> &Arc<dyn EventPackage> {
        &self.package
    }

    pub fn has_dialog(&self) -> bool {
        self.dialog.lock().is_some()
    }

    pub fn dialog_id(&self) -> Option<DialogId> {
        self.dialog.lock().as_ref().map(NotifierDialog::id)
    }

    /// True once a terminating NOTIFY went out or the subscriber answered 481
    pub fn is_terminated(&self) -> bool {
        self.dialog.lock().as_ref().is_some_and(|d| d.terminated)
    }

    pub fn time_left(&self) -> u32 {
        self.dialog.lock().as_ref().map(NotifierDialog::time_left).unwrap_or(0)
    }

    pub fn last_error(&self) -> Option<UaError> {
        self.last_error.lock().clone()
    }

    pub(crate) fn owns_dialog_of(&self, request: &Request) -> bool {
        let dialog = self.dialog.lock();
        let Some(dialog) = dialog.as_ref() else {
            return false;
        };
        request.call_id() == Some(dialog.call_id.as_str())
            && request.to_tag().as_deref() == Some(dialog.local_tag.as_str())
            && request.from_tag().as_deref() == Some(dialog.remote_tag.as_str())
    }

    pub(crate) fn accept_request(&self, event: &RequestEvent) -> bool {
        debug!(method = %event.request.method, package = self.package.name(), "Request queued for notifier");
        self.requests.push(event.clone());
        true
    }

    /// Next request routed to this notifier, unprocessed
    pub async fn wait_request(&self, timeout_ms: u64) -> UaResult<RequestEvent> {
        let result = self
            .requests
            .wait(timeout_ms)
            .await
            .ok_or_else(|| UaError::timeout(format!("request for {} notifier", self.package.name()), timeout_ms));
        self.record(result)
    }

    /// Wait for a SUBSCRIBE and answer it with `status`. A 2xx creates the
    /// dialog (or refreshes it) with `expires` seconds, or the package's
    /// clamp of the requested duration when `expires` is `None`.
    pub async fn process_subscribe(
        &self,
        timeout_ms: u64,
        status: StatusCode,
        reason: Option<&str>,
        expires: Option<u32>,
    ) -> UaResult<RequestEvent> {
        let result = self.answer(Method::Subscribe, timeout_ms, status, reason, expires).await;
        self.record(result)
    }

    /// Wait for a REFER and answer it. A 2xx creates the implicit `refer`
    /// subscription lasting the configured refer duration.
    pub async fn process_refer(
        &self,
        timeout_ms: u64,
        status: StatusCode,
        reason: Option<&str>,
    ) -> UaResult<RequestEvent> {
        let result = self.answer(Method::Refer, timeout_ms, status, reason, None).await;
        self.record(result)
    }

    async fn answer(
        &self,
        method: Method,
        timeout_ms: u64,
        status: StatusCode,
        reason: Option<&str>,
        expires: Option<u32>,
    ) -> UaResult<RequestEvent> {
        let event = self
            .requests
            .wait(timeout_ms)
            .await
            .ok_or_else(|| UaError::timeout(format!("incoming {}", method), timeout_ms))?;
        let request = &event.request;
        if request.method != method {
            return Err(UaError::precondition(format!(
                "expected {}, received {}",
                method, request.method
            )));
        }

        let mut response = self.session.create_response(request, status, reason);
        if status.is_success() {
            let granted = match method {
                Method::Refer => self.session.config().refer_expires,
                _ => expires.unwrap_or_else(|| {
                    let requested = request
                        .expires()
                        .unwrap_or(self.package.default_expires().as_secs() as u32);
                    self.package.clamp_expires(requested)
                }),
            };
            if method != Method::Refer {
                response.set_header(HeaderName::Expires, granted.to_string());
            }
            self.adopt_dialog(request, &response, granted)?;
        }
        self.session.send_response(event.server_exchange, response).await?;
        Ok(event)
    }

    fn adopt_dialog(&self, request: &Request, response: &Response, granted: u32) -> UaResult<()> {
        let mut guard = self.dialog.lock();
        if let Some(dialog) = guard.as_mut() {
            if request.to_tag().as_deref() == Some(dialog.local_tag.as_str()) {
                dialog.set_expiry(granted);
                if let Some(contact) = request.contact() {
                    dialog.remote_target = contact.uri;
                }
                debug!(dialog = %dialog.id(), expires = granted, "Subscription refreshed");
                return Ok(());
            }
        }

        let missing = |what: &str| UaError::precondition(format!("cannot create dialog: request has no {}", what));
        let call_id = request.call_id().ok_or_else(|| missing("Call-ID"))?.to_string();
        let remote = request.from_address().ok_or_else(|| missing("From"))?;
        let remote_tag = remote.tag().map(str::to_string).ok_or_else(|| missing("From tag"))?;
        let local_tag = response.to_tag().ok_or_else(|| missing("To tag"))?;
        let event = match request.method {
            Method::Refer => {
                let cseq = request.cseq().ok_or_else(|| missing("CSeq"))?;
                EventHeader::new("refer").with_id(cseq.seq.to_string())
            }
            _ => request.event().ok_or_else(|| missing("Event"))?,
        };
        let remote_target = request.contact().map(|c| c.uri).unwrap_or_else(|| remote.uri.clone());

        let mut dialog = NotifierDialog {
            call_id,
            local_tag,
            remote_tag,
            remote_uri: remote.uri,
            remote_target,
            local_cseq: 0,
            event,
            expiry: None,
            terminated: false,
        };
        dialog.set_expiry(granted);
        info!(dialog = %dialog.id(), event = %dialog.event, expires = granted, "Notifier dialog created");
        *guard = Some(dialog);
        Ok(())
    }

    /// NOTIFY in the dialog. A non-terminated state without expires gets the
    /// remaining duration filled in.
    pub fn create_notify(
        &self,
        state: SubscriptionStateHeader,
        body: Option<(ContentType, Vec<u8>)>,
    ) -> UaResult<Request> {
        let mut guard = self.dialog.lock();
        let dialog = guard
            .as_mut()
            .ok_or_else(|| UaError::precondition("notifier has no dialog"))?;
        if dialog.terminated {
            return Err(UaError::precondition("notifier dialog is terminated"));
        }
        dialog.local_cseq += 1;
        let state = match (&state.state, state.expires) {
            (SubState::Terminated, _) | (_, Some(_)) => state,
            _ => {
                let left = dialog.time_left();
                state.with_expires(left)
            }
        };

        let config = self.session.config();
        let mut builder = SimpleRequestBuilder::with_uri(Method::Notify, dialog.remote_target.clone())
            .from(
                config.display_name.as_deref().unwrap_or(""),
                &self.session.aor().to_string(),
                Some(&dialog.local_tag),
            )
            .to("", &dialog.remote_uri.to_string(), Some(&dialog.remote_tag))
            .call_id(&dialog.call_id)
            .cseq(dialog.local_cseq)
            .max_forwards(70)
            .contact(&self.session.contact().to_string())
            .event_header(&dialog.event)
            .subscription_state(&state)
            .user_agent(&config.user_agent);
        if let Some((content_type, bytes)) = body {
            builder = builder.body(&content_type, bytes);
        }
        Ok(builder.build())
    }

    /// Send a NOTIFY and wait for its final response. Challenges are
    /// answered, a 481 or a terminating NOTIFY ends the dialog.
    pub async fn send_notify(&self, request: Request, timeout_ms: u64) -> UaResult<Response> {
        let result = self.deliver(request, timeout_ms).await;
        self.record(result)
    }

    async fn deliver(&self, mut request: Request, timeout_ms: u64) -> UaResult<Response> {
        let dialog_id = self
            .dialog_id()
            .ok_or_else(|| UaError::precondition("notifier has no dialog"))?;
        let terminating = request
            .subscription_state()
            .is_some_and(|s| s.state == SubState::Terminated);
        let deadline = Deadline::after(timeout_ms);
        let mut retrier = self.session.auth_retrier();
        let mut exchange = self.session.send_tracked(request.clone(), Some(&dialog_id)).await?;

        loop {
            let wait_ms = deadline.remaining_ms("NOTIFY response");
            let event = match wait_ms {
                Ok(wait_ms) => self.session.wait_response(&exchange, wait_ms).await,
                Err(e) => Err(e),
            };
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    self.session.clear_exchange(exchange.id());
                    return Err(e);
                }
            };
            let response = event.response;
            let status = response.status();
            if status.is_provisional() {
                continue;
            }
            self.session.clear_exchange(exchange.id());

            if status.is_auth_challenge() {
                request = retrier.retry(&response, &request)?;
                if let Some(cseq) = request.cseq() {
                    let mut guard = self.dialog.lock();
                    if let Some(dialog) = guard.as_mut() {
                        dialog.local_cseq = dialog.local_cseq.max(cseq.seq);
                    }
                }
                exchange = self.session.send_tracked(request.clone(), Some(&dialog_id)).await?;
                continue;
            }
            if status.is_success() {
                if terminating {
                    self.mark_terminated("terminating NOTIFY accepted");
                }
                return Ok(response);
            }
            if status.as_u16() == 481 {
                self.mark_terminated("subscriber answered 481");
            }
            return Err(UaError::far_end(response.status_code(), response.reason_phrase()));
        }
    }

    fn mark_terminated(&self, why: &str) {
        if let Some(dialog) = self.dialog.lock().as_mut() {
            dialog.terminated = true;
            dialog.expiry = None;
            info!(dialog = %dialog.id(), why, "Notifier dialog terminated");
        }
    }

    /// Send presence state as a PIDF NOTIFY
    pub async fn notify_presence(
        &self,
        state: SubscriptionStateHeader,
        document: &PidfDocument,
        timeout_ms: u64,
    ) -> UaResult<Response> {
        let xml = self.record(document.to_xml().map_err(UaError::from))?;
        let body = (ContentType::pidf(), xml.into_bytes());
        let request = self.record(self.create_notify(state, Some(body)))?;
        self.send_notify(request, timeout_ms).await
    }

    /// Report REFER progress as a message/sipfrag NOTIFY
    pub async fn notify_refer_progress(
        &self,
        state: SubscriptionStateHeader,
        status: StatusCode,
        reason: Option<&str>,
        timeout_ms: u64,
    ) -> UaResult<Response> {
        let frag = SipFrag::status(status, reason);
        let body = (ContentType::sipfrag(), frag.to_string().into_bytes());
        let request = self.record(self.create_notify(state, Some(body)))?;
        self.send_notify(request, timeout_ms).await
    }

    /// Answer a request taken from [`wait_request`](Self::wait_request)
    pub async fn reply(&self, event: &RequestEvent, status: StatusCode, reason: Option<&str>) -> UaResult<()> {
        let response = self.session.create_response(&event.request, status, reason);
        let result = self.session.send_response(event.server_exchange, response).await;
        self.record(result)
    }

    fn record<T>(&self, result: UaResult<T>) -> UaResult<T> {
        if let Err(e) = &result {
            warn!(package = self.package.name(), error = %e, "Notifier operation failed");
            *self.last_error.lock() = Some(e.clone());
        }
        result
    }
}
