//! REFER and its implicit `refer` subscription
//!
//! Alice asks Bob to contact Carol. Bob accepts with 202 and reports the
//! progress of his call to Carol in message/sipfrag NOTIFYs.

mod common;

use std::sync::Arc;

use sipevent_ua_core::prelude::*;
use sipevent_ua_core::transport::ServerExchangeId;
use sipevent_ua_core::ErrorKind;

use common::{notify_for, TestPair, WAIT_MS, BOB};

const CAROL: &str = "sip:carol@example.com";

async fn accepted_refer(pair: &TestPair, duration: u32) -> (Arc<Subscription>, Arc<Notifier>) {
    let notifier = pair.bob.create_notifier(Arc::new(ReferPackage));
    let subscription = pair.alice.create_refer_subscription(BOB).unwrap();
    let refer = subscription.create_refer_request(CAROL, duration).unwrap();

    let (started, answered) = tokio::join!(
        subscription.start(refer, WAIT_MS),
        notifier.process_refer(WAIT_MS, StatusCode::Accepted, None),
    );
    started.unwrap();
    let received = answered.unwrap();
    assert_eq!(received.request.method, Method::Refer);
    (subscription, notifier)
}

#[tokio::test]
async fn test_refer_request_shape() {
    let pair = TestPair::new();
    let subscription = pair.alice.create_refer_subscription(BOB).unwrap();
    let refer = subscription.create_refer_request(CAROL, 120).unwrap();

    assert_eq!(refer.method, Method::Refer);
    assert!(refer.header(&HeaderName::ReferTo).unwrap().contains(CAROL));
    assert!(refer.expires().is_none());
    assert!(refer.event().is_none());
    assert_eq!(refer.from_tag().unwrap(), subscription.local_tag());
    assert!(refer.to_tag().is_none());

    let err = subscription.create_refer_request("not a uri", 120).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let presence = pair.alice.create_presence_subscription(BOB).unwrap();
    let err = presence.create_refer_request(CAROL, 120).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[tokio::test]
async fn test_refer_progress_until_final() {
    let pair = TestPair::new();
    let (subscription, notifier) = accepted_refer(&pair, 120).await;

    assert_eq!(subscription.state(), SubscriptionState::Active);
    assert!((119..=120).contains(&subscription.time_left()));
    let accepted = subscription.received_responses().pop().unwrap();
    assert_eq!(accepted.status_code(), 202);
    assert!(accepted.expires().is_none());

    let (sent, received) = tokio::join!(
        notifier.notify_refer_progress(SubscriptionStateHeader::active(60), StatusCode::Trying, None, WAIT_MS),
        subscription.receive_notify(WAIT_MS),
    );
    sent.unwrap();
    let (event, response) = received.unwrap();
    assert_eq!(response.status_code(), 200);
    let refer_cseq = subscription.last_sent_request().unwrap().cseq().unwrap().seq;
    assert_eq!(event.request.event().unwrap().id, Some(refer_cseq.to_string()));
    assert_eq!(
        subscription.last_sipfrag().unwrap().status_code(),
        Some(StatusCode::Trying)
    );
    assert!((59..=60).contains(&subscription.time_left()));

    let (sent, received) = tokio::join!(
        notifier.notify_refer_progress(
            SubscriptionStateHeader::terminated("noresource"),
            StatusCode::Ok,
            None,
            WAIT_MS
        ),
        subscription.receive_notify(WAIT_MS),
    );
    sent.unwrap();
    assert_eq!(received.unwrap().1.status_code(), 200);

    assert_eq!(subscription.state(), SubscriptionState::Terminated);
    assert_eq!(subscription.termination_reason().as_deref(), Some("noresource"));
    let frag = subscription.last_sipfrag().unwrap();
    assert_eq!(frag.status_code(), Some(StatusCode::Ok));
    assert!(frag.is_final());
    assert!(notifier.is_terminated());
    assert!(subscription.last_sent_request().is_none());
}

#[tokio::test]
async fn test_refer_notify_above_duration_is_rejected() {
    let pair = TestPair::new();
    let (subscription, notifier) = accepted_refer(&pair, 120).await;

    // without an explicit expires the notifier fills in its own 600 s
    let (sent, received) = tokio::join!(
        notifier.notify_refer_progress(SubscriptionStateHeader::new(SubState::Active), StatusCode::Trying, None, WAIT_MS),
        subscription.receive_notify(WAIT_MS),
    );
    assert_eq!(received.unwrap().1.status_code(), 400);
    assert_eq!(sent.unwrap_err().status_code(), Some(400));
    assert_eq!(subscription.state(), SubscriptionState::Active);
    assert!(subscription.last_sipfrag().is_none());
    assert_eq!(subscription.event_errors().len(), 1);
}

#[tokio::test]
async fn test_refer_notify_without_id_is_accepted() {
    let pair = TestPair::with_configs(
        UaConfig::new(common::ALICE),
        UaConfig::new(BOB).with_refer_expires(90),
    );
    let (subscription, notifier) = accepted_refer(&pair, 120).await;
    assert!(notifier.has_dialog());
    let refer = subscription.last_sent_request().unwrap();
    let remote_tag = subscription.dialog().unwrap().remote_tag;
    let offline = |request| RequestEvent {
        request,
        server_exchange: ServerExchangeId(0),
        dialog: None,
    };

    let without_id = notify_for(&refer, &remote_tag, 1, SubscriptionStateHeader::active(30), "refer");
    assert!(subscription.message_for_me(&without_id));
    assert_eq!(subscription.process_notify(&offline(without_id)).status_code(), 200);

    let wrong_id = notify_for(&refer, &remote_tag, 2, SubscriptionStateHeader::active(30), "refer;id=99");
    assert!(!subscription.message_for_me(&wrong_id));
    assert_eq!(subscription.process_notify(&offline(wrong_id)).status_code(), 400);

    let presence = notify_for(&refer, &remote_tag, 3, SubscriptionStateHeader::active(30), "presence");
    assert_eq!(subscription.process_notify(&offline(presence)).status_code(), 489);
    assert_eq!(subscription.state(), SubscriptionState::Active);
}

#[tokio::test]
async fn test_declined_refer() {
    let pair = TestPair::new();
    let notifier = pair.bob.create_notifier(Arc::new(ReferPackage));
    let subscription = pair.alice.create_refer_subscription(BOB).unwrap();
    let refer = subscription.create_refer_request(CAROL, 120).unwrap();

    let (started, answered) = tokio::join!(
        subscription.start(refer, WAIT_MS),
        notifier.process_refer(WAIT_MS, StatusCode::Forbidden, None),
    );
    answered.unwrap();
    assert_eq!(started.unwrap_err().status_code(), Some(403));
    assert_eq!(subscription.state(), SubscriptionState::Pending);
    assert!(!notifier.has_dialog());
    assert_eq!(
        notifier
            .create_notify(SubscriptionStateHeader::active(10), None)
            .unwrap_err()
            .kind(),
        ErrorKind::Precondition
    );
}

#[tokio::test]
async fn test_refer_subscription_refresh_keeps_notifies_flowing() {
    let pair = TestPair::new();
    let (subscription, notifier) = accepted_refer(&pair, 120).await;
    let refer_cseq = subscription.last_sent_request().unwrap().cseq().unwrap().seq;

    let refresh = subscription.create_subscribe_request(60, None).unwrap();
    assert_eq!(refresh.method, Method::Subscribe);
    assert!(refresh.to_tag().is_some());
    assert_eq!(refresh.cseq().unwrap().seq, refer_cseq + 1);
    let event = refresh.event().unwrap();
    assert_eq!(event.package, "refer");
    assert_eq!(event.id, Some(refer_cseq.to_string()));

    let (refreshed, answered) = tokio::join!(
        subscription.refresh(refresh, WAIT_MS),
        notifier.process_subscribe(WAIT_MS, StatusCode::Ok, None, Some(60)),
    );
    refreshed.unwrap();
    assert_eq!(answered.unwrap().request.method, Method::Subscribe);
    assert_eq!(subscription.state(), SubscriptionState::Active);
    assert!((59..=60).contains(&subscription.time_left()));
    assert!((59..=60).contains(&notifier.time_left()));

    let (sent, received) = tokio::join!(
        notifier.notify_refer_progress(SubscriptionStateHeader::active(30), StatusCode::Ringing, None, WAIT_MS),
        subscription.receive_notify(WAIT_MS),
    );
    assert_eq!(sent.unwrap().status_code(), 200);
    let (event, response) = received.unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(event.request.event().unwrap().id, Some(refer_cseq.to_string()));
    assert_eq!(subscription.last_sipfrag().unwrap().status_code(), Some(StatusCode::Ringing));
    assert!((29..=30).contains(&subscription.time_left()));
    assert_eq!(pair.alice.pending_requests(), 0);
}

#[tokio::test]
async fn test_refer_subscription_unsubscribe() {
    let pair = TestPair::new();
    let (subscription, notifier) = accepted_refer(&pair, 120).await;
    let refer_cseq = subscription.last_sent_request().unwrap().cseq().unwrap().seq;

    let request = subscription.create_subscribe_request(0, None).unwrap();
    assert_eq!(request.expires(), Some(0));
    assert_eq!(request.event().unwrap().id, Some(refer_cseq.to_string()));

    let (ended, answered) = tokio::join!(
        subscription.end(request, WAIT_MS),
        notifier.process_subscribe(WAIT_MS, StatusCode::Ok, None, Some(0)),
    );
    ended.unwrap();
    answered.unwrap();
    assert_eq!(subscription.state(), SubscriptionState::Terminated);
    assert_eq!(subscription.termination_reason().as_deref(), Some("unsubscribed"));
    assert_eq!(notifier.time_left(), 0);

    // the closing NOTIFY still belongs to the dialog
    let (sent, received) = tokio::join!(
        notifier.notify_refer_progress(
            SubscriptionStateHeader::terminated("timeout"),
            StatusCode::Ok,
            None,
            WAIT_MS
        ),
        subscription.receive_notify(WAIT_MS),
    );
    sent.unwrap();
    let (event, response) = received.unwrap();
    assert_eq!(response.status_code(), 200);
    assert_eq!(event.request.event().unwrap().id, Some(refer_cseq.to_string()));
    assert!(notifier.is_terminated());
    assert_eq!(subscription.state(), SubscriptionState::Terminated);
    assert_eq!(pair.alice.pending_requests(), 0);
}
