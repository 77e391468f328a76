//! Answering 401/407 challenges
//!
//! A [`CredentialStore`] turns a challenged request into an authorized copy.
//! [`AuthRetrier`] wraps one per operation: it bounds the number of attempts
//! and bumps the CSeq so the resend is a new transaction.

mod digest;

pub use digest::{digest_response, DigestCredentialStore};

use std::sync::Arc;

use tracing::info;

use sipevent_sip_core::{HeaderAccess, HeaderName, Request, Response};

use crate::error::{UaError, UaResult};

/// Source of credentials for challenged requests
pub trait CredentialStore: Send + Sync {
    /// Return `request` with Authorization / Proxy-Authorization filled in
    /// for `challenge`, or [`UaError::NoCredentials`]
    fn authorize(&self, challenge: &Response, request: &Request) -> UaResult<Request>;
}

/// Per-operation challenge handling
pub struct AuthRetrier {
    store: Arc<dyn CredentialStore>,
    max_attempts: u32,
    attempts: u32,
}

impl AuthRetrier {
    pub fn new(store: Arc<dyn CredentialStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Build the resend of `request` answering `challenge`. The CSeq number
    /// goes up by exactly one and the Via is dropped so the provider opens a
    /// new transaction.
    pub fn retry(&mut self, challenge: &Response, request: &Request) -> UaResult<Request> {
        if !challenge.status().is_auth_challenge() {
            return Err(UaError::precondition(format!(
                "{} is not an authentication challenge",
                challenge.status_code()
            )));
        }
        if self.attempts >= self.max_attempts {
            return Err(UaError::far_end(challenge.status_code(), challenge.reason_phrase()));
        }
        let cseq = request
            .cseq()
            .ok_or_else(|| UaError::precondition("challenged request has no CSeq"))?;

        let mut resent = self.store.authorize(challenge, request)?;
        resent.set_header(HeaderName::CSeq, cseq.next().to_string());
        resent.remove_header(&HeaderName::Via);
        self.attempts += 1;

        info!(
            method = %request.method,
            status = challenge.status_code(),
            attempt = self.attempts,
            cseq = cseq.seq + 1,
            "Answering authentication challenge"
        );
        Ok(resent)
    }
}
