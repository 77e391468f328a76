//! Request classification on a live session

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use sipevent_ua_core::pipeline::{
    matching_fn, processing_fn, ContactUriMatching, Inbox, NotifierDispatch, ProcessingOutcome, SubscriptionDispatch,
    ToUriMatching,
};
use sipevent_ua_core::prelude::*;
use sipevent_ua_core::ErrorKind;

use common::{TestPair, ALICE, BOB, WAIT_MS};

fn options(to: &Uri, call_id: &str) -> Request {
    SimpleRequestBuilder::with_uri(Method::Options, to.clone())
        .from("", ALICE, Some("opt-tag"))
        .to("", BOB, None)
        .call_id(call_id)
        .cseq(1)
        .max_forwards(70)
        .build()
}

#[tokio::test]
async fn test_custom_processor_takes_options() {
    let pair = TestPair::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let taken = pair.bob.processing().insert(
        0,
        processing_fn("options-sink", false, move |event, _session| {
            if event.request.method != Method::Options {
                return Some(ProcessingOutcome::DECLINED);
            }
            let _ = tx.send(event.request.clone());
            Some(ProcessingOutcome::HANDLED)
        }),
    );
    assert!(taken);
    assert_eq!(pair.bob.processing().tags()[0], "options-sink");

    pair.alice.send_request(options(pair.bob.contact(), "opt-1")).await.unwrap();
    let seen = tokio::time::timeout(std::time::Duration::from_millis(WAIT_MS), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.call_id(), Some("opt-1"));
    assert_eq!(pair.bob.pending_requests(), 0);
}

#[tokio::test]
async fn test_strategy_without_result_is_skipped() {
    let pair = TestPair::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    pair.bob.processing().insert(
        0,
        processing_fn("silent", false, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        }),
    );

    pair.alice.send_request(options(pair.bob.contact(), "opt-2")).await.unwrap();
    let event = pair.bob.wait_request(WAIT_MS).await.unwrap();
    assert_eq!(event.request.call_id(), Some("opt-2"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unmatched_requests_are_dropped() {
    let pair = TestPair::new();
    let matching = pair.bob.matching();
    matching.add(matching_fn("nobody", |_, _| false));
    assert_eq!(matching.remove_by_tag(ContactUriMatching::TAG), 1);
    assert_eq!(matching.tags(), vec!["nobody"]);

    let exchange = pair.alice.send_request(options(pair.bob.contact(), "opt-3")).await.unwrap();
    assert!(pair.bob.wait_request(300).await.unwrap_err().is_timeout());
    assert!(pair.alice.wait_response(&exchange, WAIT_MS).await.unwrap_err().is_timeout());

    matching.add(Arc::new(ToUriMatching));
    pair.alice.send_request(options(pair.bob.contact(), "opt-4")).await.unwrap();
    let event = pair.bob.wait_request(WAIT_MS).await.unwrap();
    assert_eq!(event.request.call_id(), Some("opt-4"));

    assert_eq!(matching.remove_by_tag("nobody"), 1);
    assert_eq!(matching.remove_by_tag(ToUriMatching::TAG), 1);
    assert_eq!(matching.tags(), vec![ContactUriMatching::TAG]);
}

#[tokio::test]
async fn test_to_uri_matching_ignores_request_uri() {
    let pair = TestPair::new();
    let matching = pair.bob.matching();
    matching.add(Arc::new(ToUriMatching));
    matching.remove_by_tag(ContactUriMatching::TAG);

    let contact = pair.bob.contact().clone();
    let elsewhere: Uri = "sip:someone-else@10.0.0.2:5060".parse().unwrap();
    let request = SimpleRequestBuilder::with_uri(Method::Options, elsewhere)
        .from("", ALICE, Some("t"))
        .to("", BOB, None)
        .call_id("opt-5")
        .cseq(1)
        .max_forwards(70)
        .build();
    pair.alice.send_request(request).await.unwrap();
    let event = pair.bob.wait_request(WAIT_MS).await.unwrap();
    assert_eq!(event.request.call_id(), Some("opt-5"));
    assert_ne!(event.request.uri, contact);
}

#[tokio::test]
async fn test_processing_pipeline_keeps_last_strategy() {
    let pair = TestPair::new();
    let processing = pair.bob.processing();
    assert_eq!(
        processing.tags(),
        vec![SubscriptionDispatch::TAG, NotifierDispatch::TAG, Inbox::TAG]
    );
    assert!(!processing.add(Arc::new(Inbox)));

    assert_eq!(processing.remove_by_tag(SubscriptionDispatch::TAG).unwrap(), 1);
    assert_eq!(processing.remove_by_tag(NotifierDispatch::TAG).unwrap(), 1);
    let err = processing.remove_by_tag(Inbox::TAG).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pipeline);
    assert_eq!(processing.tags(), vec![Inbox::TAG]);

    pair.alice.send_request(options(pair.bob.contact(), "opt-6")).await.unwrap();
    assert_eq!(pair.bob.wait_request(WAIT_MS).await.unwrap().request.method, Method::Options);
}
