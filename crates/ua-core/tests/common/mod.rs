#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sipevent_ua_core::prelude::*;
use sipevent_ua_core::transport::LoopbackProvider;

pub const WAIT_MS: u64 = 2_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Two user agents on one loopback network. Alice subscribes, Bob is the
/// far end; each AOR is registered so `sip:name@example.com` reaches the
/// endpoint.
pub struct TestPair {
    pub network: LoopbackNetwork,
    pub alice: SipSession,
    pub bob: SipSession,
    pub alice_provider: Arc<LoopbackProvider>,
    pub bob_provider: Arc<LoopbackProvider>,
}

pub const ALICE: &str = "sip:alice@example.com";
pub const BOB: &str = "sip:bob@example.com";

impl TestPair {
    pub fn new() -> Self {
        Self::with_configs(UaConfig::new(ALICE), UaConfig::new(BOB))
    }

    pub fn with_configs(alice: UaConfig, bob: UaConfig) -> Self {
        init_tracing();
        let network = LoopbackNetwork::new();
        network.set_transaction_timeout(Duration::from_millis(1_500));
        let alice_provider = network.endpoint("10.0.0.1:5060").unwrap();
        let bob_provider = network.endpoint("10.0.0.2:5060").unwrap();
        let alice = SipSession::new(alice_provider.clone(), alice).unwrap();
        let bob = SipSession::new(bob_provider.clone(), bob).unwrap();
        network.register(alice.aor(), alice.contact());
        network.register(bob.aor(), bob.contact());
        Self {
            network,
            alice,
            bob,
            alice_provider,
            bob_provider,
        }
    }
}

/// Build a NOTIFY from the far end of `subscribe` by hand, for scripting
/// malformed or out-of-order traffic
pub fn notify_for(
    subscribe: &Request,
    remote_tag: &str,
    cseq: u32,
    state: SubscriptionStateHeader,
    event: &str,
) -> Request {
    let contact = subscribe.contact().unwrap().uri;
    SimpleRequestBuilder::with_uri(Method::Notify, contact)
        .from("", BOB, Some(remote_tag))
        .to("", ALICE, subscribe.from_tag().as_deref())
        .call_id(subscribe.call_id().unwrap())
        .cseq(cseq)
        .max_forwards(70)
        .contact("sip:bob@10.0.0.2:5060")
        .header(HeaderName::Event, event)
        .subscription_state(&state)
        .build()
}
