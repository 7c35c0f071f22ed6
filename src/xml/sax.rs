//! SAX-style push engine.
//!
//! A [`SaxEngine`] drives a [`ContentHandler`] through one document. Optional
//! handler roles (DTD declarations, external entity resolution, error
//! reporting) are exposed through accessor methods on the handler and are
//! detected once per parse with [`HandlerRoles::detect`].

use std::error::Error as StdError;
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use super::entity::{EntityLoader, EntityResolver, FileEntityLoader};
use super::event::{Attribute, Notation, UnparsedEntity, XmlEvent};
use super::reader::{ReaderSettings, XmlStreamReader};
use super::{EngineError, Feature, FeatureConfigurable, FeatureSet};
use crate::error::Cause;

/// Failure raised while pushing a document through a handler
#[derive(Debug)]
pub enum SaxError {
    /// The document could not be parsed.
    Parse(EngineError),
    /// A handler callback failed; parsing stopped.
    Handler(Cause),
}

impl SaxError {
    /// Wrap a handler failure.
    pub fn handler(cause: impl Into<Cause>) -> Self {
        SaxError::Handler(cause.into())
    }
}

impl fmt::Display for SaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaxError::Parse(err) => write!(f, "{}", err),
            SaxError::Handler(err) => write!(f, "handler failed: {}", err),
        }
    }
}

impl StdError for SaxError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SaxError::Parse(err) => Some(err),
            SaxError::Handler(err) => Some(err.as_ref()),
        }
    }
}

impl From<EngineError> for SaxError {
    fn from(err: EngineError) -> Self {
        SaxError::Parse(err)
    }
}

/// Receives document content. Every callback defaults to doing nothing.
#[allow(unused_variables)]
pub trait ContentHandler {
    /// Before any other callback.
    fn start_document(&mut self) -> Result<(), SaxError> {
        Ok(())
    }

    /// After the root element closed.
    fn end_document(&mut self) -> Result<(), SaxError> {
        Ok(())
    }

    /// Start tag with resolved attributes.
    fn start_element(&mut self, name: &str, attributes: &[Attribute]) -> Result<(), SaxError> {
        Ok(())
    }

    /// End tag.
    fn end_element(&mut self, name: &str) -> Result<(), SaxError> {
        Ok(())
    }

    /// Character data, including CDATA sections.
    fn characters(&mut self, text: &str) -> Result<(), SaxError> {
        Ok(())
    }

    /// Processing instruction.
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SaxError> {
        Ok(())
    }

    /// An external entity reference that was not expanded.
    fn skipped_entity(&mut self, name: &str) -> Result<(), SaxError> {
        Ok(())
    }

    /// This handler as a DTD handler, if it is one.
    fn as_dtd_handler(&mut self) -> Option<&mut dyn DtdHandler> {
        None
    }

    /// This handler as an entity resolver, if it is one.
    fn as_entity_resolver(&mut self) -> Option<&mut dyn EntityResolver> {
        None
    }

    /// This handler as an error handler, if it is one.
    fn as_error_handler(&mut self) -> Option<&mut dyn ErrorHandler> {
        None
    }
}

/// Receives notation and unparsed entity declarations.
pub trait DtdHandler {
    /// A `<!NOTATION>` declaration.
    fn notation_decl(&mut self, notation: &Notation) -> Result<(), SaxError>;

    /// An `NDATA` entity declaration.
    fn unparsed_entity_decl(&mut self, entity: &UnparsedEntity) -> Result<(), SaxError>;
}

/// Observes problems before they are raised.
#[allow(unused_variables)]
pub trait ErrorHandler {
    /// Recoverable problem; parsing continues.
    fn warning(&mut self, err: &EngineError) {}

    /// Unrecoverable problem; the parse fails with `err` afterwards.
    fn fatal_error(&mut self, err: &EngineError) {}
}

/// Which optional roles a handler plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandlerRoles {
    /// Handler receives DTD declarations.
    pub dtd_handler: bool,
    /// Handler is asked for external content.
    pub entity_resolver: bool,
    /// Handler observes warnings and fatal errors.
    pub error_handler: bool,
}

impl HandlerRoles {
    /// Check which optional roles `handler` takes on.
    pub fn detect(handler: &mut dyn ContentHandler) -> Self {
        Self {
            dtd_handler: handler.as_dtd_handler().is_some(),
            entity_resolver: handler.as_entity_resolver().is_some(),
            error_handler: handler.as_error_handler().is_some(),
        }
    }
}

/// Document text plus the system identifier it came from.
pub struct InputSource<'a> {
    reader: Box<dyn BufRead + 'a>,
    system_id: Option<String>,
}

impl<'a> InputSource<'a> {
    /// Input without a system identifier.
    pub fn new(reader: Box<dyn BufRead + 'a>) -> Self {
        Self {
            reader,
            system_id: None,
        }
    }

    /// Set the system identifier used for diagnostics and relative lookups.
    pub fn with_system_id(mut self, system_id: Option<&str>) -> Self {
        self.system_id = system_id.map(str::to_string);
        self
    }
}

impl fmt::Debug for InputSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource")
            .field("system_id", &self.system_id)
            .finish_non_exhaustive()
    }
}

/// Creates push engines. Stock engines resolve external content.
#[derive(Clone)]
pub struct SaxEngineFactory {
    loader: Arc<dyn EntityLoader>,
}

impl Default for SaxEngineFactory {
    fn default() -> Self {
        Self {
            loader: Arc::new(FileEntityLoader),
        }
    }
}

impl fmt::Debug for SaxEngineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaxEngineFactory").finish_non_exhaustive()
    }
}

impl SaxEngineFactory {
    /// Factory with the file-only entity loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loader used for external DTDs and entities.
    pub fn with_entity_loader(mut self, loader: Arc<dyn EntityLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// A fresh engine with stock features.
    pub fn new_engine(&self) -> SaxEngine {
        SaxEngine {
            features: FeatureSet::default(),
            loader: Arc::clone(&self.loader),
        }
    }
}

/// One-shot push engine. All four features are switchable.
pub struct SaxEngine {
    features: FeatureSet,
    loader: Arc<dyn EntityLoader>,
}

impl fmt::Debug for SaxEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaxEngine")
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl FeatureConfigurable for SaxEngine {
    fn set_feature(&mut self, feature: Feature, enabled: bool) -> Result<(), EngineError> {
        self.features.set(feature, enabled);
        Ok(())
    }

    fn feature(&self, feature: Feature) -> Option<bool> {
        Some(self.features.get(feature))
    }
}

impl SaxEngine {
    /// Push `input` through `handler`, using only the roles in `roles`.
    ///
    /// Fatal parse errors are shown to the error handler role before being
    /// returned.
    pub fn parse(
        &mut self,
        input: InputSource<'_>,
        handler: &mut dyn ContentHandler,
        roles: HandlerRoles,
    ) -> Result<(), SaxError> {
        let settings = ReaderSettings {
            features: self.features,
            loader: Arc::clone(&self.loader),
        };
        let resolver = if roles.entity_resolver {
            handler.as_entity_resolver()
        } else {
            None
        };
        let opened = XmlStreamReader::open(
            input.reader,
            input.system_id.as_deref(),
            settings,
            resolver,
        );
        let mut reader = match opened {
            Ok(reader) => reader,
            Err(err) => return Err(fatal(handler, roles, err)),
        };
        let result = drive(&mut reader, handler, roles);
        if let Err(err) = reader.close() {
            log::debug!("ignoring reader close failure: {}", err);
        }
        result
    }
}

fn drive(
    reader: &mut XmlStreamReader<'_>,
    handler: &mut dyn ContentHandler,
    roles: HandlerRoles,
) -> Result<(), SaxError> {
    loop {
        match reader.event() {
            XmlEvent::StartDocument { .. } => handler.start_document()?,
            XmlEvent::EndDocument => return handler.end_document(),
            XmlEvent::StartElement { name, attributes } => {
                handler.start_element(name, attributes)?
            }
            XmlEvent::EndElement { name } => handler.end_element(name)?,
            XmlEvent::Characters(text) | XmlEvent::CData(text) => handler.characters(text)?,
            XmlEvent::Comment(_) => {}
            XmlEvent::ProcessingInstruction { target, data } => {
                handler.processing_instruction(target, data)?
            }
            XmlEvent::Dtd(doctype) if roles.dtd_handler => {
                if let Some(dtd) = handler.as_dtd_handler() {
                    for notation in &doctype.notations {
                        dtd.notation_decl(notation)?;
                    }
                    for entity in &doctype.unparsed_entities {
                        dtd.unparsed_entity_decl(entity)?;
                    }
                }
            }
            XmlEvent::Dtd(_) => {}
            XmlEvent::EntityReference(name) => {
                if roles.error_handler {
                    if let Some(errors) = handler.as_error_handler() {
                        let warning = EngineError::entity(format!(
                            "external entity &{}; was not expanded",
                            name
                        ))
                        .at(reader.location());
                        errors.warning(&warning);
                    }
                }
                handler.skipped_entity(name)?;
            }
        }

        let resolver = if roles.entity_resolver {
            handler.as_entity_resolver()
        } else {
            None
        };
        if let Err(err) = reader.next_with(resolver) {
            return Err(fatal(handler, roles, err));
        }
    }
}

fn fatal(handler: &mut dyn ContentHandler, roles: HandlerRoles, err: EngineError) -> SaxError {
    if roles.error_handler {
        if let Some(errors) = handler.as_error_handler() {
            errors.fatal_error(&err);
        }
    }
    SaxError::Parse(err)
}
