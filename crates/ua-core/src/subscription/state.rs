//! Mutable per-subscription state, always accessed under the subscription's lock

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use sipevent_sip_core::{EventHeader, Request, Response, SipFrag, SubState, Tuple, Uri};

use crate::body::NotifyBody;
use crate::correlator::EventCorrelator;
use crate::error::UaError;
use crate::exchange::PendingExchange;
use crate::transport::DialogId;

/// Lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Request sent, no confirmed subscription yet
    Pending,
    Active,
    /// Terminal
    Terminated,
}

impl SubscriptionState {
    /// Allowed moves: PENDING to ACTIVE or TERMINATED, ACTIVE to TERMINATED
    pub fn can_move_to(self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Terminated) | (Active, Terminated)
        )
    }

    /// Local state for a Subscription-State value; extension values map to none
    pub fn from_sub_state(state: &SubState) -> Option<Self> {
        match state {
            SubState::Active => Some(SubscriptionState::Active),
            SubState::Pending => Some(SubscriptionState::Pending),
            SubState::Terminated => Some(SubscriptionState::Terminated),
            SubState::Extension(_) => None,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Pending => "PENDING",
            SubscriptionState::Active => "ACTIVE",
            SubscriptionState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

pub(crate) struct SubscriptionInner {
    pub state: SubscriptionState,
    pub termination_reason: Option<String>,
    /// `None` means no time left
    pub expiry: Option<Instant>,
    pub call_id: String,
    pub local_tag: String,
    pub remote_target: Uri,
    pub dialog: Option<DialogId>,
    /// Highest CSeq used for SUBSCRIBE/REFER
    pub local_cseq: u32,
    /// CSeq of the last NOTIFY handed to the test program
    pub last_notify_cseq: Option<u32>,
    pub last_sent_request: Option<Request>,
    /// Upper bound for durations granted by the far end
    pub requested_expires: Option<u32>,
    pub refer_duration: Option<u32>,
    /// `refer;id=<CSeq>` of the REFER that created the dialog; later
    /// SUBSCRIBEs in the dialog keep it
    pub refer_event: Option<EventHeader>,
    pub exchange: Option<Arc<PendingExchange>>,
    pub received_requests: Vec<Request>,
    pub received_responses: Vec<Response>,
    pub event_errors: Vec<String>,
    pub last_error: Option<UaError>,
    pub presence: BTreeMap<String, Tuple>,
    pub presence_notes: Vec<String>,
    pub last_sipfrag: Option<SipFrag>,
    pub last_body: Option<NotifyBody>,
}

impl SubscriptionInner {
    pub fn new(call_id: String, local_tag: String, remote_target: Uri) -> Self {
        Self {
            state: SubscriptionState::Pending,
            termination_reason: None,
            expiry: None,
            call_id,
            local_tag,
            remote_target,
            dialog: None,
            local_cseq: 0,
            last_notify_cseq: None,
            last_sent_request: None,
            requested_expires: None,
            refer_duration: None,
            refer_event: None,
            exchange: None,
            received_requests: Vec::new(),
            received_responses: Vec::new(),
            event_errors: Vec::new(),
            last_error: None,
            presence: BTreeMap::new(),
            presence_notes: Vec::new(),
            last_sipfrag: None,
            last_body: None,
        }
    }

    /// Event header NOTIFYs of this subscription carry
    pub fn expected_event(&self) -> Option<EventHeader> {
        self.refer_event
            .clone()
            .or_else(|| self.last_sent_request.as_ref().and_then(EventCorrelator::expected_event))
    }

    /// Move to `next` if allowed; returns whether the state changed
    pub fn transition(&mut self, next: SubscriptionState) -> bool {
        if !self.state.can_move_to(next) {
            return false;
        }
        info!(call_id = %self.call_id, from = %self.state, to = %next, "Subscription state change");
        self.state = next;
        true
    }

    pub fn set_expiry(&mut self, seconds: u32) {
        self.expiry = (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds as u64));
    }

    pub fn time_left(&self) -> u32 {
        self.expiry
            .map(|at| at.saturating_duration_since(Instant::now()).as_secs() as u32)
            .unwrap_or(0)
    }

    pub fn fold_body(&mut self, body: NotifyBody) {
        match &body {
            NotifyBody::Presence(doc) => {
                for tuple in &doc.tuples {
                    self.presence.insert(tuple.id.clone(), tuple.clone());
                }
                self.presence_notes = doc.notes.clone();
            }
            NotifyBody::SipFrag(frag) => self.last_sipfrag = Some(frag.clone()),
            NotifyBody::Text { .. } => {}
        }
        self.last_body = Some(body);
    }
}
