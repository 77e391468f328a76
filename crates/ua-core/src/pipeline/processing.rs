use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use sipevent_sip_core::Method;

use crate::error::{UaError, UaResult};
use crate::session::SipSession;
use crate::transport::RequestEvent;

/// Result of offering a request to a processing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingOutcome {
    /// The strategy took the request; later strategies are skipped
    pub accepted: bool,
    /// Handling went through
    pub succeeded: bool,
}

impl ProcessingOutcome {
    pub const DECLINED: Self = Self {
        accepted: false,
        succeeded: false,
    };

    pub const HANDLED: Self = Self {
        accepted: true,
        succeeded: true,
    };
}

/// Consumes classified requests
pub trait ProcessingStrategy: Send + Sync {
    fn tag(&self) -> &str;

    /// Whether several strategies with this tag may sit in one pipeline
    fn allows_multiple(&self) -> bool {
        false
    }

    /// `None` is treated as declined and logged
    fn process(&self, event: &RequestEvent, session: &SipSession) -> Option<ProcessingOutcome>;
}

/// NOTIFY to the subscription it correlates with
#[derive(Debug, Default)]
pub struct SubscriptionDispatch;

impl SubscriptionDispatch {
    pub const TAG: &'static str = "subscription-dispatch";
}

impl ProcessingStrategy for SubscriptionDispatch {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn process(&self, event: &RequestEvent, session: &SipSession) -> Option<ProcessingOutcome> {
        if event.request.method != Method::Notify {
            return Some(ProcessingOutcome::DECLINED);
        }
        let accepted = session.dispatch_to_subscription(event);
        Some(ProcessingOutcome {
            accepted,
            succeeded: accepted,
        })
    }
}

/// SUBSCRIBE / REFER to a notifier
#[derive(Debug, Default)]
pub struct NotifierDispatch;

impl NotifierDispatch {
    pub const TAG: &'static str = "notifier-dispatch";
}

impl ProcessingStrategy for NotifierDispatch {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn process(&self, event: &RequestEvent, session: &SipSession) -> Option<ProcessingOutcome> {
        if !matches!(event.request.method, Method::Subscribe | Method::Refer) {
            return Some(ProcessingOutcome::DECLINED);
        }
        let accepted = session.dispatch_to_notifier(event);
        Some(ProcessingOutcome {
            accepted,
            succeeded: accepted,
        })
    }
}

/// Everything else, for [`SipSession::wait_request`]
#[derive(Debug, Default)]
pub struct Inbox;

impl Inbox {
    pub const TAG: &'static str = "inbox";
}

impl ProcessingStrategy for Inbox {
    fn tag(&self) -> &str {
        Self::TAG
    }

    fn process(&self, event: &RequestEvent, session: &SipSession) -> Option<ProcessingOutcome> {
        session.push_inbox(event.clone());
        Some(ProcessingOutcome::HANDLED)
    }
}

struct FnProcessing<F> {
    tag: String,
    allows_multiple: bool,
    f: F,
}

impl<F> ProcessingStrategy for FnProcessing<F>
where
    F: Fn(&RequestEvent, &SipSession) -> Option<ProcessingOutcome> + Send + Sync,
{
    fn tag(&self) -> &str {
        &self.tag
    }

    fn allows_multiple(&self) -> bool {
        self.allows_multiple
    }

    fn process(&self, event: &RequestEvent, session: &SipSession) -> Option<ProcessingOutcome> {
        (self.f)(event, session)
    }
}

/// Wrap a closure as a tagged processing strategy
pub fn processing_fn<F>(tag: impl Into<String>, allows_multiple: bool, f: F) -> Arc<dyn ProcessingStrategy>
where
    F: Fn(&RequestEvent, &SipSession) -> Option<ProcessingOutcome> + Send + Sync + 'static,
{
    Arc::new(FnProcessing {
        tag: tag.into(),
        allows_multiple,
        f,
    })
}

/// Ordered processing strategies; never empty
pub struct ProcessingPipeline {
    strategies: Mutex<Vec<Arc<dyn ProcessingStrategy>>>,
}

impl Default for ProcessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingPipeline").field("tags", &self.tags()).finish()
    }
}

impl ProcessingPipeline {
    /// Subscription dispatch, notifier dispatch, inbox
    pub fn new() -> Self {
        Self {
            strategies: Mutex::new(vec![
                Arc::new(SubscriptionDispatch),
                Arc::new(NotifierDispatch),
                Arc::new(Inbox),
            ]),
        }
    }

    /// Pipeline holding a single strategy
    pub fn with_strategy(strategy: Arc<dyn ProcessingStrategy>) -> Self {
        Self {
            strategies: Mutex::new(vec![strategy]),
        }
    }

    /// Append a strategy. Refused (false) when the tag is present and either
    /// side does not allow duplicates.
    pub fn add(&self, strategy: Arc<dyn ProcessingStrategy>) -> bool {
        self.insert_at(None, strategy)
    }

    /// Insert before position `index` (clamped to the end)
    pub fn insert(&self, index: usize, strategy: Arc<dyn ProcessingStrategy>) -> bool {
        self.insert_at(Some(index), strategy)
    }

    fn insert_at(&self, index: Option<usize>, strategy: Arc<dyn ProcessingStrategy>) -> bool {
        let mut strategies = self.strategies.lock();
        let clash = strategies
            .iter()
            .any(|s| s.tag() == strategy.tag() && !(s.allows_multiple() && strategy.allows_multiple()));
        if clash {
            debug!(tag = strategy.tag(), "Refusing duplicate processing strategy");
            return false;
        }
        match index {
            Some(idx) => {
                let idx = idx.min(strategies.len());
                strategies.insert(idx, strategy);
            }
            None => strategies.push(strategy),
        }
        true
    }

    /// Remove one instance. Fails, leaving the list untouched, if it is the
    /// only strategy left.
    pub fn remove(&self, strategy: &Arc<dyn ProcessingStrategy>) -> UaResult<bool> {
        let mut strategies = self.strategies.lock();
        let Some(idx) = strategies.iter().position(|s| Arc::ptr_eq(s, strategy)) else {
            return Ok(false);
        };
        if strategies.len() == 1 {
            return Err(UaError::pipeline("cannot remove the last processing strategy"));
        }
        strategies.remove(idx);
        Ok(true)
    }

    /// Remove every strategy with `tag`. Fails, leaving the list untouched,
    /// if nothing would remain.
    pub fn remove_by_tag(&self, tag: &str) -> UaResult<usize> {
        let mut strategies = self.strategies.lock();
        let remaining = strategies.iter().filter(|s| s.tag() != tag).count();
        if remaining == 0 {
            return Err(UaError::pipeline(format!(
                "removing '{}' would leave no processing strategy",
                tag
            )));
        }
        let removed = strategies.len() - remaining;
        strategies.retain(|s| s.tag() != tag);
        Ok(removed)
    }

    pub fn strategies(&self) -> Vec<Arc<dyn ProcessingStrategy>> {
        self.strategies.lock().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.strategies.lock().iter().map(|s| s.tag().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.lock().len()
    }

    /// Offer the request to each strategy until one accepts
    pub fn process(&self, event: &RequestEvent, session: &SipSession) -> ProcessingOutcome {
        for strategy in self.strategies() {
            match strategy.process(event, session) {
                Some(outcome) if outcome.accepted => {
                    debug!(tag = strategy.tag(), method = %event.request.method, "Request consumed");
                    return outcome;
                }
                Some(_) => {}
                None => warn!(tag = strategy.tag(), "Processing strategy returned no result"),
            }
        }
        ProcessingOutcome::DECLINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(tag: &str, multiple: bool) -> Arc<dyn ProcessingStrategy> {
        processing_fn(tag.to_string(), multiple, |_, _| Some(ProcessingOutcome::DECLINED))
    }

    #[test]
    fn test_duplicate_tags() {
        let pipeline = ProcessingPipeline::new();
        assert!(!pipeline.add(Arc::new(Inbox)));
        assert!(pipeline.add(noop("audit", true)));
        assert!(pipeline.add(noop("audit", true)));
        assert!(!pipeline.add(noop("audit", false)));
        assert_eq!(pipeline.len(), 5);
    }

    #[test]
    fn test_last_entry_is_kept() {
        let pipeline = ProcessingPipeline::new();
        assert_eq!(pipeline.remove_by_tag(SubscriptionDispatch::TAG).unwrap(), 1);
        assert_eq!(pipeline.remove_by_tag(NotifierDispatch::TAG).unwrap(), 1);
        let last = pipeline.strategies().remove(0);
        assert!(pipeline.remove(&last).is_err());
        assert!(pipeline.remove_by_tag(Inbox::TAG).is_err());
        assert_eq!(pipeline.tags(), vec![Inbox::TAG.to_string()]);
    }

    #[test]
    fn test_insert_position() {
        let pipeline = ProcessingPipeline::new();
        assert!(pipeline.insert(0, noop("first", false)));
        assert!(pipeline.insert(99, noop("last", false)));
        let tags = pipeline.tags();
        assert_eq!(tags.first().map(String::as_str), Some("first"));
        assert_eq!(tags.last().map(String::as_str), Some("last"));
    }
}
