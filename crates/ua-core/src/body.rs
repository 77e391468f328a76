//! NOTIFY body decoding
//!
//! The engine only gates on Content-Type; turning bytes into a document is
//! delegated to a [`BodyUnmarshaller`] registered for that type.

use std::sync::Arc;

use parking_lot::RwLock;

use sipevent_sip_core::{ContentType, Error, PidfDocument, Result, SipFrag};

/// A decoded NOTIFY body
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyBody {
    Presence(PidfDocument),
    SipFrag(SipFrag),
    /// Produced by custom unmarshallers that keep the text as is
    Text { content_type: ContentType, text: String },
}

/// Decoder for one content type
pub trait BodyUnmarshaller: Send + Sync {
    fn content_type(&self) -> ContentType;

    /// Decode a body; the error ends up in the subscription's error list
    fn unmarshal(&self, body: &[u8]) -> Result<NotifyBody>;
}

/// `application/pidf+xml`
#[derive(Debug, Default)]
pub struct PidfUnmarshaller;

impl BodyUnmarshaller for PidfUnmarshaller {
    fn content_type(&self) -> ContentType {
        ContentType::pidf()
    }

    fn unmarshal(&self, body: &[u8]) -> Result<NotifyBody> {
        let text = std::str::from_utf8(body).map_err(|e| Error::ParseError(format!("PIDF body is not UTF-8: {}", e)))?;
        PidfDocument::from_xml(text).map(NotifyBody::Presence)
    }
}

/// `message/sipfrag`
#[derive(Debug, Default)]
pub struct SipfragUnmarshaller;

impl BodyUnmarshaller for SipfragUnmarshaller {
    fn content_type(&self) -> ContentType {
        ContentType::sipfrag()
    }

    fn unmarshal(&self, body: &[u8]) -> Result<NotifyBody> {
        let text =
            std::str::from_utf8(body).map_err(|e| Error::ParseError(format!("sipfrag body is not UTF-8: {}", e)))?;
        text.parse::<SipFrag>().map(NotifyBody::SipFrag)
    }
}

/// Unmarshallers by content type
pub struct BodyRegistry {
    unmarshallers: RwLock<Vec<Arc<dyn BodyUnmarshaller>>>,
}

impl Default for BodyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyRegistry {
    /// Registry with the PIDF and sipfrag decoders installed
    pub fn new() -> Self {
        Self {
            unmarshallers: RwLock::new(vec![Arc::new(PidfUnmarshaller), Arc::new(SipfragUnmarshaller)]),
        }
    }

    pub fn empty() -> Self {
        Self {
            unmarshallers: RwLock::new(Vec::new()),
        }
    }

    /// Install a decoder, replacing any for the same type
    pub fn register(&self, unmarshaller: Arc<dyn BodyUnmarshaller>) {
        let content_type = unmarshaller.content_type();
        let mut list = self.unmarshallers.write();
        list.retain(|u| !u.content_type().same_type(&content_type));
        list.push(unmarshaller);
    }

    pub fn supports(&self, content_type: &ContentType) -> bool {
        self.find(content_type).is_some()
    }

    /// `None` when nothing is registered for the type
    pub fn unmarshal(&self, content_type: &ContentType, body: &[u8]) -> Option<Result<NotifyBody>> {
        self.find(content_type).map(|u| u.unmarshal(body))
    }

    fn find(&self, content_type: &ContentType) -> Option<Arc<dyn BodyUnmarshaller>> {
        self.unmarshallers
            .read()
            .iter()
            .find(|u| u.content_type().same_type(content_type))
            .cloned()
    }
}
