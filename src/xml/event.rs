//! Owned XML events shared by the pull cursors and the push engine.

use std::fmt;

/// Kind of an [`XmlEvent`], for cursor-style dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EventType {
    StartDocument,
    EndDocument,
    StartElement,
    EndElement,
    Characters,
    CData,
    Comment,
    ProcessingInstruction,
    Dtd,
    EntityReference,
}

/// A resolved attribute: name as written, value with references expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name.
    pub name: String,
    /// Normalized value.
    pub value: String,
}

impl Attribute {
    /// Create an attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }
}

/// A `<!NOTATION>` declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Notation {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

/// An external entity declared with `NDATA`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct UnparsedEntity {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: String,
    pub notation: String,
}

/// A DOCTYPE declaration and what the engine learned from processing it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocType {
    /// Declared root element name.
    pub name: String,
    /// Public identifier of the external subset.
    pub public_id: Option<String>,
    /// System identifier of the external subset.
    pub system_id: Option<String>,
    /// Internal subset text between `[` and `]`, unprocessed.
    pub internal_subset: Option<String>,
    /// Notations declared in the internal and (if loaded) external subset.
    pub notations: Vec<Notation>,
    /// Unparsed entities declared in the internal and external subset.
    pub unparsed_entities: Vec<UnparsedEntity>,
}

impl DocType {
    /// Declaration body as written after `<!DOCTYPE `.
    pub fn declaration(&self) -> String {
        let mut out = self.name.clone();
        match (&self.public_id, &self.system_id) {
            (Some(public_id), Some(system_id)) => {
                out.push_str(&format!(" PUBLIC {} {}", quote(public_id), quote(system_id)));
            }
            (None, Some(system_id)) => {
                out.push_str(&format!(" SYSTEM {}", quote(system_id)));
            }
            _ => {}
        }
        if let Some(subset) = &self.internal_subset {
            out.push_str(" [");
            out.push_str(subset);
            out.push(']');
        }
        out
    }
}

fn quote(literal: &str) -> String {
    if literal.contains('"') {
        format!("'{}'", literal)
    } else {
        format!("\"{}\"", literal)
    }
}

/// One step of an XML document.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum XmlEvent {
    /// Always the first event; carries the XML declaration if there was one.
    StartDocument {
        version: String,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    /// Always the last event.
    EndDocument,
    StartElement {
        name: String,
        attributes: Vec<Attribute>,
    },
    EndElement {
        name: String,
    },
    /// Character data with entity and character references expanded.
    /// Adjacent runs are delivered as one event.
    Characters(String),
    CData(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    Dtd(DocType),
    /// Reference to an external entity that was not expanded.
    EntityReference(String),
}

impl XmlEvent {
    /// Start element without attributes.
    pub fn start_element(name: impl Into<String>) -> Self {
        XmlEvent::StartElement {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// End element event.
    pub fn end_element(name: impl Into<String>) -> Self {
        XmlEvent::EndElement { name: name.into() }
    }

    /// Character data event.
    pub fn characters(text: impl Into<String>) -> Self {
        XmlEvent::Characters(text.into())
    }

    /// `StartDocument` for XML 1.0 without encoding or standalone.
    pub fn start_document() -> Self {
        XmlEvent::StartDocument {
            version: "1.0".to_string(),
            encoding: None,
            standalone: None,
        }
    }

    /// Kind of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            XmlEvent::StartDocument { .. } => EventType::StartDocument,
            XmlEvent::EndDocument => EventType::EndDocument,
            XmlEvent::StartElement { .. } => EventType::StartElement,
            XmlEvent::EndElement { .. } => EventType::EndElement,
            XmlEvent::Characters(_) => EventType::Characters,
            XmlEvent::CData(_) => EventType::CData,
            XmlEvent::Comment(_) => EventType::Comment,
            XmlEvent::ProcessingInstruction { .. } => EventType::ProcessingInstruction,
            XmlEvent::Dtd(_) => EventType::Dtd,
            XmlEvent::EntityReference(_) => EventType::EntityReference,
        }
    }

    /// Element name of start and end events.
    pub fn name(&self) -> Option<&str> {
        match self {
            XmlEvent::StartElement { name, .. } | XmlEvent::EndElement { name } => Some(name),
            _ => None,
        }
    }

    /// Text of character, CDATA and comment events.
    pub fn text(&self) -> Option<&str> {
        match self {
            XmlEvent::Characters(text) | XmlEvent::CData(text) | XmlEvent::Comment(text) => {
                Some(text)
            }
            _ => None,
        }
    }

    /// Character data consisting only of XML whitespace.
    pub fn is_whitespace(&self) -> bool {
        match self {
            XmlEvent::Characters(text) => text.chars().all(is_xml_whitespace),
            _ => false,
        }
    }

    /// True for `StartElement`.
    pub fn is_start_element(&self) -> bool {
        matches!(self, XmlEvent::StartElement { .. })
    }

    /// True for `EndElement`.
    pub fn is_end_element(&self) -> bool {
        matches!(self, XmlEvent::EndElement { .. })
    }
}

impl fmt::Display for XmlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlEvent::StartDocument { .. } => f.write_str("start of document"),
            XmlEvent::EndDocument => f.write_str("end of document"),
            XmlEvent::StartElement { name, .. } => write!(f, "<{}>", name),
            XmlEvent::EndElement { name } => write!(f, "</{}>", name),
            XmlEvent::Characters(_) => f.write_str("character data"),
            XmlEvent::CData(_) => f.write_str("CDATA section"),
            XmlEvent::Comment(_) => f.write_str("comment"),
            XmlEvent::ProcessingInstruction { target, .. } => write!(f, "<?{}?>", target),
            XmlEvent::Dtd(doctype) => write!(f, "<!DOCTYPE {}>", doctype.name),
            XmlEvent::EntityReference(name) => write!(f, "&{};", name),
        }
    }
}

/// Name without its namespace prefix.
pub fn local_name(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

pub(crate) fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}
