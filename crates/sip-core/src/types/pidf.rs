//! # PIDF presence documents
//!
//! The subset of RFC 3863 that presence NOTIFY bodies carry in practice:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <presence xmlns="urn:ietf:params:xml:ns:pidf" entity="sip:alice@example.com">
//!   <tuple id="pc">
//!     <status><basic>open</basic></status>
//!     <contact>sip:alice@10.0.0.1</contact>
//!     <note>At my desk</note>
//!   </tuple>
//!   <note>Back at 3pm</note>
//! </presence>
//! ```
//!
//! Element names may carry a namespace prefix (`<pidf:tuple>`); CDATA
//! sections and comments are accepted anywhere text is.
//!
//! ```rust
//! use sipevent_sip_core::{BasicStatus, PidfDocument, Tuple};
//!
//! let doc = PidfDocument::new("sip:alice@example.com")
//!     .with_tuple(Tuple::new("pc", BasicStatus::Open).with_note("At my desk"));
//! let parsed = PidfDocument::from_xml(&doc.to_xml().unwrap()).unwrap();
//! assert_eq!(parsed.tuples[0].status, BasicStatus::Open);
//! assert_eq!(parsed.tuples[0].note.as_deref(), Some("At my desk"));
//! ```

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `<basic>` value of a tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicStatus {
    Open,
    Closed,
}

impl fmt::Display for BasicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicStatus::Open => f.write_str("open"),
            BasicStatus::Closed => f.write_str("closed"),
        }
    }
}

impl FromStr for BasicStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(BasicStatus::Open),
            "closed" => Ok(BasicStatus::Closed),
            _ => Err(Error::ParseError(format!("Invalid basic status: {}", s))),
        }
    }
}

/// One presence tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub id: String,
    pub status: BasicStatus,
    pub contact: Option<String>,
    pub note: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Tuple {
    pub fn new(id: impl Into<String>, status: BasicStatus) -> Self {
        Self {
            id: id.into(),
            status,
            contact: None,
            note: None,
            timestamp: None,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A presence document: entity, tuples and presence-level notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidfDocument {
    pub entity: String,
    pub tuples: Vec<Tuple>,
    pub notes: Vec<String>,
}

impl PidfDocument {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            tuples: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_tuple(mut self, tuple: Tuple) -> Self {
        self.tuples.push(tuple);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Single-tuple document with the given basic status
    pub fn basic(entity: impl Into<String>, status: BasicStatus) -> Self {
        Self::new(entity).with_tuple(Tuple::new("t1", status).with_timestamp(Utc::now()))
    }

    /// Tuple by id
    pub fn tuple(&self, id: &str) -> Option<&Tuple> {
        self.tuples.iter().find(|t| t.id == id)
    }

    /// Render the document as `application/pidf+xml`
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;

        let mut presence = BytesStart::new("presence");
        presence.push_attribute(("xmlns", PIDF_NAMESPACE));
        presence.push_attribute(("entity", self.entity.as_str()));
        writer.write_event(Event::Start(presence)).map_err(xml_error)?;

        for tuple in &self.tuples {
            let mut start = BytesStart::new("tuple");
            start.push_attribute(("id", tuple.id.as_str()));
            writer.write_event(Event::Start(start)).map_err(xml_error)?;

            writer
                .write_event(Event::Start(BytesStart::new("status")))
                .map_err(xml_error)?;
            write_text_element(&mut writer, "basic", &tuple.status.to_string())?;
            writer
                .write_event(Event::End(BytesStart::new("status").to_end()))
                .map_err(xml_error)?;

            if let Some(contact) = &tuple.contact {
                write_text_element(&mut writer, "contact", contact)?;
            }
            if let Some(note) = &tuple.note {
                write_text_element(&mut writer, "note", note)?;
            }
            if let Some(timestamp) = &tuple.timestamp {
                write_text_element(&mut writer, "timestamp", &timestamp.to_rfc3339())?;
            }

            writer
                .write_event(Event::End(BytesStart::new("tuple").to_end()))
                .map_err(xml_error)?;
        }

        for note in &self.notes {
            write_text_element(&mut writer, "note", note)?;
        }

        writer
            .write_event(Event::End(BytesStart::new("presence").to_end()))
            .map_err(xml_error)?;

        let xml = writer.into_inner().into_inner();
        String::from_utf8(xml).map_err(|e| Error::ParseError(e.to_string()))
    }

    /// Parse a PIDF document; element names are matched on their local
    /// part so any namespace prefix is accepted
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut doc: Option<PidfDocument> = None;
        let mut tuple: Option<TupleBuilder> = None;
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(ref e) => {
                    let name = local_name(e);
                    open_element(&name, e, &mut doc, &mut tuple)?;
                    path.push(name);
                    text.clear();
                }
                Event::Empty(ref e) => {
                    let name = local_name(e);
                    open_element(&name, e, &mut doc, &mut tuple)?;
                    if name == "tuple" {
                        close_tuple(&mut doc, &mut tuple)?;
                    }
                }
                Event::Text(ref e) => {
                    text.push_str(&e.unescape().map_err(xml_error)?);
                }
                Event::CData(e) => {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::End(_) => {
                    let name = path.pop().unwrap_or_default();
                    let value = std::mem::take(&mut text);
                    let value = value.trim();
                    if name == "tuple" {
                        close_tuple(&mut doc, &mut tuple)?;
                        continue;
                    }
                    match (name.as_str(), tuple.as_mut()) {
                        ("basic", Some(t)) => t.status = Some(value.parse()?),
                        ("contact", Some(t)) => t.contact = Some(value.to_string()),
                        ("note", Some(t)) => t.note = Some(value.to_string()),
                        ("timestamp", Some(t)) => {
                            t.timestamp = DateTime::parse_from_rfc3339(value)
                                .ok()
                                .map(|ts| ts.with_timezone(&Utc));
                        }
                        ("note", None) if path.last().map(String::as_str) == Some("presence") => {
                            if let Some(doc) = doc.as_mut() {
                                doc.notes.push(value.to_string());
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                // declarations, comments and processing instructions carry nothing
                _ => {}
            }
        }

        doc.ok_or_else(|| Error::ParseError("no <presence> element".to_string()))
    }
}

impl FromStr for PidfDocument {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_xml(s)
    }
}

const PIDF_NAMESPACE: &str = "urn:ietf:params:xml:ns:pidf";

/// A tuple while its children are being read
struct TupleBuilder {
    id: String,
    status: Option<BasicStatus>,
    contact: Option<String>,
    note: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

fn xml_error(e: impl fmt::Display) -> Error {
    Error::ParseError(format!("PIDF: {}", e))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

fn open_element(
    name: &str,
    e: &BytesStart<'_>,
    doc: &mut Option<PidfDocument>,
    tuple: &mut Option<TupleBuilder>,
) -> Result<()> {
    match name {
        "presence" => {
            let entity = attribute(e, "entity")?
                .ok_or_else(|| Error::ParseError("presence without entity".to_string()))?;
            *doc = Some(PidfDocument::new(entity));
        }
        "tuple" if doc.is_some() => {
            let id = attribute(e, "id")?.ok_or_else(|| Error::ParseError("tuple without id".to_string()))?;
            *tuple = Some(TupleBuilder {
                id,
                status: None,
                contact: None,
                note: None,
                timestamp: None,
            });
        }
        _ => {}
    }
    Ok(())
}

fn close_tuple(doc: &mut Option<PidfDocument>, tuple: &mut Option<TupleBuilder>) -> Result<()> {
    let Some(t) = tuple.take() else {
        return Ok(());
    };
    let status = t
        .status
        .ok_or_else(|| Error::ParseError(format!("tuple {} has no <basic>", t.id)))?;
    if let Some(doc) = doc.as_mut() {
        doc.tuples.push(Tuple {
            id: t.id,
            status,
            contact: t.contact,
            note: t.note,
            timestamp: t.timestamp,
        });
    }
    Ok(())
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesStart::new(name).to_end()))
        .map_err(xml_error)?;
    Ok(())
}
