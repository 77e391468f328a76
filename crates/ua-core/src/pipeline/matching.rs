use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use sipevent_sip_core::{HeaderAccess, Request, Uri};

use crate::session::SipSession;

/// Decides whether a request is addressed to a session
pub trait MatchingStrategy: Send + Sync {
    fn tag(&self) -> &str;
    fn is_match(&self, request: &Request, session: &SipSession) -> bool;
}

/// SIP URI equality for request targeting (RFC 3261 §19.1.4, reduced)
///
/// - schemes compare case-insensitively
/// - a user part on either side requires equal user parts on both, and the
///   same for passwords
/// - hosts compare case-insensitively
/// - ports compare only when either URI shows one, and then both must show
///   the same port
///
/// URI parameters and headers are not compared.
pub fn uri_matches(a: &Uri, b: &Uri) -> bool {
    if !a.scheme.as_str().eq_ignore_ascii_case(b.scheme.as_str()) {
        return false;
    }
    if a.user != b.user || a.password != b.password {
        return false;
    }
    if !a.host.eq_ignore_case(&b.host) {
        return false;
    }
    match (a.port, b.port) {
        (None, None) => true,
        (Some(pa), Some(pb)) => pa == pb,
        _ => false,
    }
}

/// Request-URI against the session's Contact. Installed by default.
#[derive(Debug, Default)]
pub struct ContactUriMatching;

impl ContactUriMatching {
    pub const TAG: &'static str = "contact-uri";
}

impl MatchingStrategy for ContactUriMatching {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn is_match(&self, request: &Request, session: &SipSession) -> bool {
        uri_matches(&request.uri, session.contact())
    }
}

/// To URI against the session's address of record
#[derive(Debug, Default)]
pub struct ToUriMatching;

impl ToUriMatching {
    pub const TAG: &'static str = "to-uri";
}

impl MatchingStrategy for ToUriMatching {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn is_match(&self, request: &Request, session: &SipSession) -> bool {
        request
            .to_address()
            .is_some_and(|to| uri_matches(&to.uri.without_parameters(), session.aor()))
    }
}

struct FnMatching<F> {
    tag: String,
    f: F,
}

impl<F> MatchingStrategy for FnMatching<F>
where
    F: Fn(&Request, &SipSession) -> bool + Send + Sync,
{
    fn tag(&self) -> &str {
        &self.tag
    }

    fn is_match(&self, request: &Request, session: &SipSession) -> bool {
        (self.f)(request, session)
    }
}

/// Wrap a closure as a tagged matching strategy
pub fn matching_fn<F>(tag: impl Into<String>, f: F) -> Arc<dyn MatchingStrategy>
where
    F: Fn(&Request, &SipSession) -> bool + Send + Sync + 'static,
{
    Arc::new(FnMatching { tag: tag.into(), f })
}

/// Ordered matching strategies; never empty
pub struct MatchingPipeline {
    strategies: Mutex<Vec<Arc<dyn MatchingStrategy>>>,
}

impl Default for MatchingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MatchingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchingPipeline").field("tags", &self.tags()).finish()
    }
}

impl MatchingPipeline {
    pub fn new() -> Self {
        Self {
            strategies: Mutex::new(vec![Self::default_strategy()]),
        }
    }

    fn default_strategy() -> Arc<dyn MatchingStrategy> {
        Arc::new(ContactUriMatching)
    }

    /// Append a strategy
    pub fn add(&self, strategy: Arc<dyn MatchingStrategy>) {
        self.strategies.lock().push(strategy);
    }

    /// Remove one instance; the default comes back if the list empties
    pub fn remove(&self, strategy: &Arc<dyn MatchingStrategy>) -> bool {
        let mut strategies = self.strategies.lock();
        let before = strategies.len();
        strategies.retain(|s| !Arc::ptr_eq(s, strategy));
        let removed = strategies.len() != before;
        Self::heal(&mut strategies);
        removed
    }

    /// Remove every strategy with `tag`; returns how many went
    pub fn remove_by_tag(&self, tag: &str) -> usize {
        let mut strategies = self.strategies.lock();
        let before = strategies.len();
        strategies.retain(|s| s.tag() != tag);
        let removed = before - strategies.len();
        Self::heal(&mut strategies);
        removed
    }

    fn heal(strategies: &mut Vec<Arc<dyn MatchingStrategy>>) {
        if strategies.is_empty() {
            debug!("Matching pipeline emptied, reinstalling {}", ContactUriMatching::TAG);
            strategies.push(Self::default_strategy());
        }
    }

    pub fn strategies(&self) -> Vec<Arc<dyn MatchingStrategy>> {
        self.strategies.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.strategies.lock().iter().map(|s| s.tag().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.lock().len()
    }

    /// True when any strategy matches
    pub fn is_match(&self, request: &Request, session: &SipSession) -> bool {
        // evaluate on a snapshot so strategies may edit the pipeline
        self.strategies().iter().any(|s| s.is_match(request, session))
    }
}
