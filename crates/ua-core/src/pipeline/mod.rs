//! Classification of incoming requests
//!
//! Two independent, ordered strategy lists decide what happens to a request
//! delivered to a [`SipSession`](crate::session::SipSession):
//!
//! 1. [`MatchingPipeline`]: is the request for this session at all? Any
//!    strategy answering yes is enough. The list never runs empty; removing
//!    the last strategy reinstalls [`ContactUriMatching`].
//! 2. [`ProcessingPipeline`]: who consumes it? Strategies run in order until
//!    one reports `accepted`. Removing the last strategy is refused.
//!
//! Strategies are identified by an explicit string tag, used for duplicate
//! checks and removal by tag.
//!
//! ```rust
//! use sipevent_ua_core::pipeline::{matching_fn, MatchingPipeline, ContactUriMatching};
//!
//! let pipeline = MatchingPipeline::new();
//! pipeline.add(matching_fn("accept-all", |_request, _session| true));
//! assert_eq!(pipeline.tags(), vec!["contact-uri", "accept-all"]);
//!
//! pipeline.remove_by_tag("contact-uri");
//! pipeline.remove_by_tag("accept-all");
//! assert_eq!(pipeline.tags(), vec![ContactUriMatching::TAG]);
//! ```

mod matching;
mod processing;

pub use matching::{
    matching_fn, uri_matches, ContactUriMatching, MatchingPipeline, MatchingStrategy, ToUriMatching,
};
pub use processing::{
    processing_fn, Inbox, NotifierDispatch, ProcessingOutcome, ProcessingPipeline, ProcessingStrategy,
    SubscriptionDispatch,
};
