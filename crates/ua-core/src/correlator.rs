//! Associating inbound requests with the subscription that caused them
//!
//! RFC 3265 §3.3.4: a NOTIFY belongs to a SUBSCRIBE when the Call-ID is the
//! same, the NOTIFY's To tag equals the SUBSCRIBE's From tag and the Event
//! headers are equal. A REFER creates an implicit `refer` subscription whose
//! NOTIFYs carry `Event: refer` with either no id or the REFER's CSeq number
//! as id (RFC 3515 §2.4.6).

use sipevent_sip_core::{EventHeader, HeaderAccess, Method, Request};

/// Stateless correlation rules
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCorrelator;

impl EventCorrelator {
    /// Does `inbound` belong to the subscription created by `outbound`?
    /// Any missing header is a non-match.
    pub fn correlates(outbound: &Request, inbound: &Request) -> bool {
        Self::correlates_with(outbound, Self::expected_event(outbound).as_ref(), inbound)
    }

    /// [`correlates`](Self::correlates) against an Event header remembered
    /// for the dialog instead of the one `outbound` implies. A SUBSCRIBE
    /// refreshing a REFER subscription still expects `refer;id=<REFER CSeq>`.
    pub fn correlates_with(outbound: &Request, expected: Option<&EventHeader>, inbound: &Request) -> bool {
        let (Some(out_call_id), Some(in_call_id)) = (outbound.call_id(), inbound.call_id()) else {
            return false;
        };
        if out_call_id != in_call_id {
            return false;
        }

        let (Some(from_tag), Some(to_tag)) = (outbound.from_tag(), inbound.to_tag()) else {
            return false;
        };
        if from_tag != to_tag {
            return false;
        }

        let Some(inbound_event) = inbound.event() else {
            return false;
        };
        expected.is_some_and(|expected| Self::event_matches(expected, &inbound_event))
    }

    /// Event header comparison; the `refer` package tolerates a missing id
    pub fn event_matches(expected: &EventHeader, inbound: &EventHeader) -> bool {
        if expected.same_package("refer") {
            Self::refer_event_matches(expected, inbound)
        } else {
            expected.matches(inbound)
        }
    }

    /// Event header a NOTIFY for `outbound` has to carry. For a REFER this is
    /// `refer;id=<CSeq>`.
    pub fn expected_event(outbound: &Request) -> Option<EventHeader> {
        if outbound.method == Method::Refer {
            let cseq = outbound.cseq()?;
            return Some(EventHeader::new("refer").with_id(cseq.seq.to_string()));
        }
        outbound.event()
    }

    /// REFER NOTIFYs may leave the id out
    pub fn refer_event_matches(expected: &EventHeader, inbound: &EventHeader) -> bool {
        inbound.same_package(&expected.package) && (inbound.id.is_none() || inbound.id == expected.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipevent_sip_core::SimpleRequestBuilder;

    fn subscribe(event: &str) -> Request {
        SimpleRequestBuilder::new(Method::Subscribe, "sip:bob@example.com")
            .unwrap()
            .from("", "sip:alice@example.com", Some("alice-tag"))
            .to("", "sip:bob@example.com", None)
            .call_id("call-1")
            .cseq(1)
            .event(event)
            .build()
    }

    fn notify(call_id: &str, to_tag: &str, event: &str) -> Request {
        SimpleRequestBuilder::new(Method::Notify, "sip:alice@10.0.0.1")
            .unwrap()
            .from("", "sip:bob@example.com", Some("bob-tag"))
            .to("", "sip:alice@example.com", Some(to_tag))
            .call_id(call_id)
            .cseq(1)
            .event(event)
            .build()
    }

    #[test]
    fn test_all_conditions_required() {
        let sub = subscribe("presence");
        assert!(EventCorrelator::correlates(&sub, &notify("call-1", "alice-tag", "presence")));
        assert!(!EventCorrelator::correlates(&sub, &notify("call-2", "alice-tag", "presence")));
        assert!(!EventCorrelator::correlates(&sub, &notify("call-1", "other", "presence")));
        assert!(!EventCorrelator::correlates(&sub, &notify("call-1", "alice-tag", "dialog")));
        assert!(!EventCorrelator::correlates(&sub, &notify("call-1", "alice-tag", "presence;id=4")));
    }

    #[test]
    fn test_missing_event_is_no_match() {
        let sub = subscribe("presence");
        let mut inbound = notify("call-1", "alice-tag", "presence");
        inbound.remove_header(&sipevent_sip_core::HeaderName::Event);
        assert!(!EventCorrelator::correlates(&sub, &inbound));
    }

    #[test]
    fn test_refer_ids() {
        let refer = SimpleRequestBuilder::new(Method::Refer, "sip:bob@example.com")
            .unwrap()
            .from("", "sip:alice@example.com", Some("alice-tag"))
            .to("", "sip:bob@example.com", None)
            .call_id("call-1")
            .cseq(7)
            .refer_to("sip:carol@example.com")
            .build();
        assert!(EventCorrelator::correlates(&refer, &notify("call-1", "alice-tag", "refer")));
        assert!(EventCorrelator::correlates(&refer, &notify("call-1", "alice-tag", "refer;id=7")));
        assert!(!EventCorrelator::correlates(&refer, &notify("call-1", "alice-tag", "refer;id=8")));
        assert!(!EventCorrelator::correlates(&refer, &notify("call-1", "alice-tag", "presence")));
    }

    #[test]
    fn test_refer_dialog_refresh_keeps_refer_id() {
        let refresh = SimpleRequestBuilder::new(Method::Subscribe, "sip:bob@10.0.0.2")
            .unwrap()
            .from("", "sip:alice@example.com", Some("alice-tag"))
            .to("", "sip:bob@example.com", Some("bob-tag"))
            .call_id("call-1")
            .cseq(8)
            .event("refer")
            .build();
        let remembered = EventHeader::new("refer").with_id("7");
        let inbound = notify("call-1", "alice-tag", "refer;id=7");
        assert!(!EventCorrelator::correlates(&refresh, &inbound));
        assert!(EventCorrelator::correlates_with(&refresh, Some(&remembered), &inbound));
        assert!(EventCorrelator::correlates_with(&refresh, Some(&remembered), &notify("call-1", "alice-tag", "refer")));
        assert!(!EventCorrelator::correlates_with(&refresh, Some(&remembered), &notify("call-1", "alice-tag", "refer;id=8")));
        assert!(!EventCorrelator::correlates_with(&refresh, None, &inbound));
    }
}
