//! XML engine layer over quick-xml.
//!
//! quick-xml does the tokenizing. This layer adds what the parser and
//! formatter backends expect from an XML engine: an owned event model, StAX
//! style cursors for reading and writing, a SAX style push engine, DOCTYPE
//! and entity processing, and switchable features for external content.
//!
//! Failures here are [`EngineError`]s. They are translated into
//! [`crate::Error`] at the backend boundary and never reach callers of
//! `Parser`/`Formatter` directly.

mod dtd;
pub mod entity;
pub mod event;
pub mod reader;
pub mod sax;
pub mod writer;

use std::fmt;

pub use entity::{EntityLoader, EntityResolver, FileEntityLoader};
pub use event::{Attribute, DocType, EventType, Notation, UnparsedEntity, XmlEvent};
pub use reader::{XmlEventReader, XmlInputFactory, XmlStreamReader};
pub use sax::{
    ContentHandler, DtdHandler, ErrorHandler, HandlerRoles, InputSource, SaxEngine,
    SaxEngineFactory, SaxError,
};
pub use writer::{XmlEventWriter, XmlOutputFactory, XmlStreamWriter};

/// Engine switches that govern DTD and external entity processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Process DOCTYPE declarations at all.
    SupportDtd,
    /// Fetch the external DTD subset named by the DOCTYPE.
    LoadExternalDtd,
    /// Fetch and expand external general entities (`&name;`).
    ExternalGeneralEntities,
    /// Fetch and expand external parameter entities (`%name;`).
    ExternalParameterEntities,
}

impl Feature {
    /// Conventional feature URI, for diagnostics.
    pub fn uri(&self) -> &'static str {
        match self {
            Feature::SupportDtd => "http://xml.org/sax/features/validation/support-dtd",
            Feature::LoadExternalDtd => {
                "http://apache.org/xml/features/nonvalidating/load-external-dtd"
            }
            Feature::ExternalGeneralEntities => {
                "http://xml.org/sax/features/external-general-entities"
            }
            Feature::ExternalParameterEntities => {
                "http://xml.org/sax/features/external-parameter-entities"
            }
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Current state of every [`Feature`].
///
/// The default is a stock engine: everything on, external content included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureSet {
    /// See [`Feature::SupportDtd`].
    pub support_dtd: bool,
    /// See [`Feature::LoadExternalDtd`].
    pub load_external_dtd: bool,
    /// See [`Feature::ExternalGeneralEntities`].
    pub external_general_entities: bool,
    /// See [`Feature::ExternalParameterEntities`].
    pub external_parameter_entities: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            support_dtd: true,
            load_external_dtd: true,
            external_general_entities: true,
            external_parameter_entities: true,
        }
    }
}

impl FeatureSet {
    /// Current value of `feature`.
    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::SupportDtd => self.support_dtd,
            Feature::LoadExternalDtd => self.load_external_dtd,
            Feature::ExternalGeneralEntities => self.external_general_entities,
            Feature::ExternalParameterEntities => self.external_parameter_entities,
        }
    }

    /// Switch `feature` on or off.
    pub fn set(&mut self, feature: Feature, enabled: bool) {
        match feature {
            Feature::SupportDtd => self.support_dtd = enabled,
            Feature::LoadExternalDtd => self.load_external_dtd = enabled,
            Feature::ExternalGeneralEntities => self.external_general_entities = enabled,
            Feature::ExternalParameterEntities => self.external_parameter_entities = enabled,
        }
    }
}

/// An engine or engine factory whose features can be switched.
pub trait FeatureConfigurable {
    /// Set `feature`; engines that do not expose it fail with
    /// [`EngineErrorKind::Unsupported`].
    fn set_feature(&mut self, feature: Feature, enabled: bool) -> Result<(), EngineError>;

    /// Current value of `feature`, or `None` if the engine does not expose it.
    fn feature(&self, feature: Feature) -> Option<bool>;
}

/// Where in the input an engine error happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    /// System identifier of the document, if one was supplied.
    pub system_id: Option<String>,
    /// Byte offset into the (UTF-8) input.
    pub position: u64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.system_id {
            Some(id) => write!(f, "{} at byte {}", id, self.position),
            None => write!(f, "byte {}", self.position),
        }
    }
}

/// Classification of engine failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineErrorKind {
    /// Input is not well-formed XML.
    Syntax,
    /// Input ended before the document was complete.
    UnexpectedEof,
    /// Input bytes could not be decoded.
    Encoding,
    /// Entity declaration, reference or expansion problem.
    Entity,
    /// Reading or writing the underlying resource failed.
    Io,
    /// A cursor was used out of order or after close.
    State,
    /// The engine does not expose a requested feature.
    Unsupported,
}

/// Low-level engine failure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
    location: Option<Location>,
}

impl EngineError {
    /// Create an error of `kind`.
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Malformed input.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Syntax, message)
    }

    /// Premature end of input. Messages start with "Unexpected end of file".
    pub fn eof(detail: impl fmt::Display) -> Self {
        Self::new(
            EngineErrorKind::UnexpectedEof,
            format!("Unexpected end of file: {}", detail),
        )
    }

    /// Undecodable input.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Encoding, message)
    }

    /// Entity problem.
    pub fn entity(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Entity, message)
    }

    /// Resource I/O failure.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Io, message)
    }

    /// Cursor misuse.
    pub fn state(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::State, message)
    }

    /// Unsupported feature.
    pub fn unsupported(feature: Feature) -> Self {
        Self::new(
            EngineErrorKind::Unsupported,
            format!("feature not supported: {}", feature.uri()),
        )
    }

    /// Attach a location.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// What went wrong, broadly.
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    /// Diagnostic message without location.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where it went wrong, if known.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.message, location),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// Common close behaviour of the four cursor kinds.
///
/// `close` is idempotent. Readers stop delivering events; writers emit any
/// pending start tag and flush the resource they write to.
pub trait XmlCursor {
    /// Close the cursor. Never closes a resource the cursor only borrows.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Wording engines use for premature end of input.
const END_OF_INPUT_MARKERS: [&str; 4] = [
    "end of file",
    "unexpected eof",
    "end of input",
    "unclosed",
];

/// Best-effort check whether `message` reports premature end of input.
pub(crate) fn mentions_end_of_input(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    END_OF_INPUT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
