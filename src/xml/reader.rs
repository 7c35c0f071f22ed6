//! Pull-style XML cursors over quick-xml.
//!
//! [`XmlStreamReader`] is a cursor positioned on one event at a time;
//! [`XmlEventReader`] hands out owned [`XmlEvent`]s and supports peeking.
//! Both are created by an [`XmlInputFactory`], which carries the features
//! that govern DTD and external entity processing.
//!
//! quick-xml splits text around references and does not look into DOCTYPE
//! declarations, so this layer coalesces character data, resolves character,
//! predefined, internal and (when enabled) external entities, and enforces
//! the document-level well-formedness rules quick-xml leaves to its caller.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesPI, BytesStart, Event};
use quick_xml::reader::Reader;

use super::dtd::{self, EntityDef, Markup};
use super::entity::{
    char_ref, decode_external, replacement_text, EntityLoader, EntityResolver,
    FileEntityLoader, MAX_EXPANDED_BYTES, MAX_EXPANSION_DEPTH,
};
use super::event::{is_xml_whitespace, local_name, Attribute, DocType, EventType, XmlEvent};
use super::{
    mentions_end_of_input, EngineError, Feature, FeatureConfigurable, FeatureSet, Location,
    XmlCursor,
};
use crate::system_id;

/// Optional caller hook threaded through one read step.
pub(crate) type Resolver<'r> = Option<&'r mut dyn EntityResolver>;

/// Engine settings a reader is opened with.
#[derive(Clone)]
pub(crate) struct ReaderSettings {
    pub features: FeatureSet,
    pub loader: Arc<dyn EntityLoader>,
}

/// Creates pull cursors.
///
/// Like a stock StAX factory, a new factory resolves DTDs and external
/// entities. External parameter entities are not a separate switch here: they
/// follow [`Feature::ExternalGeneralEntities`], and setting
/// [`Feature::ExternalParameterEntities`] directly is unsupported.
#[derive(Clone)]
pub struct XmlInputFactory {
    features: FeatureSet,
    loader: Arc<dyn EntityLoader>,
}

impl Default for XmlInputFactory {
    fn default() -> Self {
        Self {
            features: FeatureSet::default(),
            loader: Arc::new(FileEntityLoader),
        }
    }
}

impl fmt::Debug for XmlInputFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlInputFactory")
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl XmlInputFactory {
    /// Factory with stock features and the file-only entity loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loader used for external DTDs and entities.
    pub fn with_entity_loader(mut self, loader: Arc<dyn EntityLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Current feature values.
    pub fn features(&self) -> FeatureSet {
        self.features
    }

    /// Open a cursor positioned on `StartDocument`.
    ///
    /// The prolog is read eagerly, so empty or truncated input fails here.
    pub fn create_stream_reader<'a>(
        &self,
        input: Box<dyn BufRead + 'a>,
        system_id: Option<&str>,
    ) -> Result<XmlStreamReader<'a>, EngineError> {
        XmlStreamReader::open(input, system_id, self.settings(), None)
    }

    /// Open an event reader whose first event is `StartDocument`.
    pub fn create_event_reader<'a>(
        &self,
        input: Box<dyn BufRead + 'a>,
        system_id: Option<&str>,
    ) -> Result<XmlEventReader<'a>, EngineError> {
        self.create_stream_reader(input, system_id)
            .map(XmlEventReader::new)
    }

    fn settings(&self) -> ReaderSettings {
        ReaderSettings {
            features: self.features,
            loader: Arc::clone(&self.loader),
        }
    }
}

impl FeatureConfigurable for XmlInputFactory {
    fn set_feature(&mut self, feature: Feature, enabled: bool) -> Result<(), EngineError> {
        match feature {
            Feature::ExternalParameterEntities => Err(EngineError::unsupported(feature)),
            Feature::ExternalGeneralEntities => {
                self.features.external_general_entities = enabled;
                self.features.external_parameter_entities = enabled;
                Ok(())
            }
            _ => {
                self.features.set(feature, enabled);
                Ok(())
            }
        }
    }

    fn feature(&self, feature: Feature) -> Option<bool> {
        match feature {
            Feature::ExternalParameterEntities => None,
            _ => Some(self.features.get(feature)),
        }
    }
}

#[derive(Clone, Debug)]
enum GeneralEntity {
    Internal(String),
    External {
        public_id: Option<String>,
        system_id: String,
    },
    Unparsed,
}

#[derive(Clone, Debug)]
enum ParameterEntity {
    Internal(String),
    External {
        public_id: Option<String>,
        system_id: String,
    },
}

/// What an entity reference stands for.
enum Replacement {
    /// Character data that is never reparsed (character references and
    /// the predefined entities).
    Literal(String),
    /// Replacement text that may hold further references or markup.
    Parsed(String),
    /// An external entity left unexpanded.
    Skipped,
}

/// Where a reference is being expanded; attribute values may not pull in
/// external content.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    Content,
    Attribute,
}

/// Cursor over the events of one document.
///
/// The cursor always sits on a current event, starting at
/// [`EventType::StartDocument`]. [`next`](Self::next) advances it.
pub struct XmlStreamReader<'a> {
    reader: Reader<Box<dyn BufRead + 'a>>,
    buf: Vec<u8>,
    settings: ReaderSettings,
    system_id: Option<String>,
    general: HashMap<String, GeneralEntity>,
    parameters: HashMap<String, ParameterEntity>,
    expanded: usize,
    queue: VecDeque<XmlEvent>,
    pending_text: Option<String>,
    current: XmlEvent,
    open: Vec<String>,
    started: bool,
    root_closed: bool,
    exhausted: bool,
    closed: bool,
}

impl<'a> XmlStreamReader<'a> {
    pub(crate) fn open(
        input: Box<dyn BufRead + 'a>,
        system_id: Option<&str>,
        settings: ReaderSettings,
        mut resolver: Resolver<'_>,
    ) -> Result<Self, EngineError> {
        let mut reader = Reader::from_reader(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        log::trace!(
            "opening XML reader for {}",
            system_id.unwrap_or("<anonymous input>")
        );
        let mut this = Self {
            reader,
            buf: Vec::with_capacity(1024),
            settings,
            system_id: system_id.map(str::to_string),
            general: HashMap::new(),
            parameters: HashMap::new(),
            expanded: 0,
            queue: VecDeque::new(),
            pending_text: None,
            current: XmlEvent::start_document(),
            open: Vec::new(),
            started: false,
            root_closed: false,
            exhausted: false,
            closed: false,
        };
        this.advance(&mut resolver)?;
        Ok(this)
    }

    /// Advance to the next event and return its type.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<EventType, EngineError> {
        self.advance(&mut None)
    }

    /// Advance, asking `resolver` for external content first.
    pub(crate) fn next_with(
        &mut self,
        mut resolver: Resolver<'_>,
    ) -> Result<EventType, EngineError> {
        self.advance(&mut resolver)
    }

    /// False once the cursor is on `EndDocument` or closed.
    pub fn has_next(&self) -> bool {
        !self.closed && !matches!(self.current, XmlEvent::EndDocument)
    }

    /// The current event.
    pub fn event(&self) -> &XmlEvent {
        &self.current
    }

    /// Type of the current event.
    pub fn event_type(&self) -> EventType {
        self.current.event_type()
    }

    /// Qualified name of the current start or end element.
    pub fn name(&self) -> Option<&str> {
        self.current.name()
    }

    /// Local name of the current start or end element.
    pub fn local_name(&self) -> Option<&str> {
        self.current.name().map(local_name)
    }

    /// Attributes of the current start element; empty for other events.
    pub fn attributes(&self) -> &[Attribute] {
        match &self.current {
            XmlEvent::StartElement { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Value of the attribute named `name` on the current start element.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Text of the current character, CDATA or comment event.
    pub fn text(&self) -> Option<&str> {
        self.current.text()
    }

    /// True if the current event is a start element.
    pub fn is_start_element(&self) -> bool {
        self.current.is_start_element()
    }

    /// True if the current event is an end element.
    pub fn is_end_element(&self) -> bool {
        self.current.is_end_element()
    }

    /// Fail unless the current event has type `kind` (and name `name`).
    pub fn require(&self, kind: EventType, name: Option<&str>) -> Result<(), EngineError> {
        if self.event_type() != kind {
            return Err(EngineError::state(format!(
                "expected {:?} but the current event is {}",
                kind, self.current
            ))
            .at(self.location()));
        }
        if let Some(expected) = name {
            if self.name() != Some(expected) {
                return Err(EngineError::state(format!(
                    "expected element <{}> but found {}",
                    expected, self.current
                ))
                .at(self.location()));
            }
        }
        Ok(())
    }

    /// Skip the prolog, whitespace, comments and processing instructions up
    /// to the next start or end element.
    pub fn next_tag(&mut self) -> Result<EventType, EngineError> {
        loop {
            let kind = self.next()?;
            match &self.current {
                XmlEvent::StartElement { .. } | XmlEvent::EndElement { .. } => return Ok(kind),
                XmlEvent::StartDocument { .. }
                | XmlEvent::Dtd(_)
                | XmlEvent::Comment(_)
                | XmlEvent::ProcessingInstruction { .. } => {}
                event if event.is_whitespace() => {}
                other => {
                    return Err(EngineError::syntax(format!(
                        "expected a start or end tag but found {}",
                        other
                    ))
                    .at(self.location()))
                }
            }
        }
    }

    /// Read the text content of a text-only element.
    ///
    /// Must be called on a start element; leaves the cursor on its end element.
    pub fn element_text(&mut self) -> Result<String, EngineError> {
        self.require(EventType::StartElement, None)?;
        let mut text = String::new();
        loop {
            self.next()?;
            match &self.current {
                XmlEvent::Characters(chunk) | XmlEvent::CData(chunk) => text.push_str(chunk),
                XmlEvent::Comment(_)
                | XmlEvent::ProcessingInstruction { .. }
                | XmlEvent::EntityReference(_) => {}
                XmlEvent::EndElement { .. } => return Ok(text),
                other => {
                    return Err(EngineError::syntax(format!(
                        "unexpected {} while reading element text",
                        other
                    ))
                    .at(self.location()))
                }
            }
        }
    }

    /// Current position in the input.
    pub fn location(&self) -> Location {
        Location {
            system_id: self.system_id.clone(),
            position: self.reader.buffer_position() as u64,
        }
    }

    /// System identifier the cursor was opened with.
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    fn advance(&mut self, resolver: &mut Resolver<'_>) -> Result<EventType, EngineError> {
        if self.closed {
            return Err(EngineError::state("XML reader is closed"));
        }
        loop {
            if let Some(event) = self.queue.pop_front() {
                let kind = event.event_type();
                self.current = event;
                return Ok(kind);
            }
            if self.exhausted {
                return Err(EngineError::state("no events after the end of the document")
                    .at(self.location()));
            }
            self.fill(resolver)?;
        }
    }

    /// Read raw events until at least one cursor event is queued.
    fn fill(&mut self, resolver: &mut Resolver<'_>) -> Result<(), EngineError> {
        let mut buf = std::mem::take(&mut self.buf);
        let outcome = match self.reader.read_event_into(&mut buf) {
            Ok(event) => self.accept(event, resolver),
            Err(err) => Err(self.engine_error(&err)),
        };
        buf.clear();
        self.buf = buf;
        outcome
    }

    fn accept(&mut self, event: Event<'_>, resolver: &mut Resolver<'_>) -> Result<(), EngineError> {
        if !self.started {
            if matches!(event, Event::Eof) {
                return Err(EngineError::eof("document is empty").at(self.location()));
            }
            self.started = true;
            if let Event::Decl(decl) = &event {
                let start = self.start_document(decl)?;
                self.queue.push_back(start);
                return Ok(());
            }
            self.queue.push_back(XmlEvent::start_document());
        }

        match event {
            Event::Decl(_) => Err(self.syntax("XML declaration is only allowed at the start")),
            Event::Start(start) => self.start_element(&start, false, resolver),
            Event::Empty(start) => self.start_element(&start, true, resolver),
            Event::End(end) => {
                let name = self.decode(end.name().as_ref())?;
                self.end_element(name)
            }
            Event::Text(text) => {
                let text = self.decode(&text)?;
                self.push_text(&text)
            }
            Event::CData(data) => {
                let data = self.decode(&data)?;
                self.require_root("CDATA section")?;
                self.push_event(XmlEvent::CData(data));
                Ok(())
            }
            Event::GeneralRef(reference) => {
                let name = reference
                    .decode()
                    .map_err(|err| self.syntax(format!("cannot decode reference: {}", err)))?
                    .into_owned();
                self.require_root("entity reference")?;
                self.expand_in_content(&name, 0, resolver).map(|_| ())
            }
            Event::Comment(comment) => {
                let comment = self.decode(&comment)?;
                self.push_event(XmlEvent::Comment(comment));
                Ok(())
            }
            Event::PI(pi) => self.processing_instruction(&pi),
            Event::DocType(raw) => {
                if !self.open.is_empty() || self.root_closed {
                    return Err(self.syntax("DOCTYPE must precede the root element"));
                }
                let raw = self.decode(&raw)?;
                let doctype = self.doctype(&raw, resolver)?;
                self.push_event(XmlEvent::Dtd(doctype));
                Ok(())
            }
            Event::Eof => self.end_of_input(),
        }
    }

    fn processing_instruction(&mut self, pi: &BytesPI<'_>) -> Result<(), EngineError> {
        let target = self.decode(pi.target())?;
        let data = self.decode(pi.content())?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.syntax("XML declaration is only allowed at the start"));
        }
        self.push_event(XmlEvent::ProcessingInstruction {
            target,
            data: data.trim_start_matches(is_xml_whitespace).to_string(),
        });
        Ok(())
    }

    fn start_document(&self, decl: &BytesDecl<'_>) -> Result<XmlEvent, EngineError> {
        let version = decl
            .version()
            .map_err(|err| self.syntax(format!("malformed XML declaration: {}", err)))?;
        let version = self.decode(&version)?;
        let encoding = match decl.encoding() {
            Some(Ok(raw)) => Some(self.decode(&raw)?),
            Some(Err(err)) => {
                return Err(self.syntax(format!("malformed encoding declaration: {}", err)))
            }
            None => None,
        };
        let standalone = match decl.standalone() {
            Some(Ok(raw)) => Some(raw.as_ref() == b"yes"),
            Some(Err(err)) => {
                return Err(self.syntax(format!("malformed standalone declaration: {}", err)))
            }
            None => None,
        };
        Ok(XmlEvent::StartDocument {
            version,
            encoding,
            standalone,
        })
    }

    fn start_element(
        &mut self,
        start: &BytesStart<'_>,
        empty: bool,
        resolver: &mut Resolver<'_>,
    ) -> Result<(), EngineError> {
        if self.root_closed {
            return Err(self.syntax("document has more than one root element"));
        }
        let name = self.decode(start.name().as_ref())?;
        let attributes = self.read_attributes(start, resolver)?;
        self.push_event(XmlEvent::StartElement {
            name: name.clone(),
            attributes,
        });
        self.open.push(name.clone());
        if empty {
            self.end_element(name)?;
        }
        Ok(())
    }

    fn end_element(&mut self, name: String) -> Result<(), EngineError> {
        match self.open.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(self.syntax(format!(
                    "end tag </{}> does not match start tag <{}>",
                    name, open
                )))
            }
            None => return Err(self.syntax(format!("unexpected end tag </{}>", name))),
        }
        if self.open.is_empty() {
            self.root_closed = true;
        }
        self.push_event(XmlEvent::EndElement { name });
        Ok(())
    }

    fn read_attributes(
        &mut self,
        start: &BytesStart<'_>,
        resolver: &mut Resolver<'_>,
    ) -> Result<Vec<Attribute>, EngineError> {
        let mut out = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| self.syntax(format!("malformed attribute: {}", err)))?;
            let name = self.decode(attr.key.as_ref())?;
            let raw = self.decode(&attr.value)?;
            if raw.contains('<') {
                return Err(self.syntax(format!(
                    "attribute `{}` contains a literal `<`",
                    name
                )));
            }
            let value = self.expand_text(&raw, 0, Context::Attribute, resolver)?;
            out.push(Attribute { name, value });
        }
        Ok(out)
    }

    fn push_text(&mut self, text: &str) -> Result<(), EngineError> {
        if self.open.is_empty() {
            if text.chars().all(is_xml_whitespace) {
                return Ok(());
            }
            let place = if self.root_closed {
                "after the root element"
            } else {
                "in the prolog"
            };
            return Err(self.syntax(format!("content is not allowed {}", place)));
        }
        self.append_text(text);
        Ok(())
    }

    fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.pending_text {
            Some(pending) => pending.push_str(text),
            None => self.pending_text = Some(text.to_string()),
        }
    }

    /// Queue `event` behind any character data collected so far.
    fn push_event(&mut self, event: XmlEvent) {
        self.flush_text();
        self.queue.push_back(event);
    }

    fn flush_text(&mut self) {
        if let Some(text) = self.pending_text.take() {
            self.queue.push_back(XmlEvent::Characters(text));
        }
    }

    fn require_root(&self, what: &str) -> Result<(), EngineError> {
        if self.open.is_empty() {
            return Err(self.syntax(format!("{} outside the root element", what)));
        }
        Ok(())
    }

    fn end_of_input(&mut self) -> Result<(), EngineError> {
        self.flush_text();
        if let Some(open) = self.open.last() {
            return Err(
                EngineError::eof(format!("element <{}> is not closed", open)).at(self.location())
            );
        }
        if !self.root_closed {
            return Err(EngineError::eof("document has no root element").at(self.location()));
        }
        self.queue.push_back(XmlEvent::EndDocument);
        self.exhausted = true;
        log::trace!(
            "finished reading {}",
            self.system_id.as_deref().unwrap_or("<anonymous input>")
        );
        Ok(())
    }

    /// Expand `&name;` in an attribute value or entity value.
    /// `Ok(None)` means an external entity was skipped.
    fn expand_reference(
        &mut self,
        name: &str,
        depth: usize,
        context: Context,
        resolver: &mut Resolver<'_>,
    ) -> Result<Option<String>, EngineError> {
        match self.replacement(name, depth, context, resolver)? {
            Replacement::Literal(text) => Ok(Some(text)),
            Replacement::Parsed(value) => self
                .expand_text(&value, depth + 1, context, resolver)
                .map(Some),
            Replacement::Skipped => Ok(None),
        }
    }

    /// Expand `&name;` in element content, where replacement text may
    /// carry markup of its own. Returns the number of bytes produced.
    fn expand_in_content(
        &mut self,
        name: &str,
        depth: usize,
        resolver: &mut Resolver<'_>,
    ) -> Result<usize, EngineError> {
        match self.replacement(name, depth, Context::Content, resolver)? {
            Replacement::Literal(text) => {
                self.append_text(&text);
                Ok(text.len())
            }
            Replacement::Parsed(value) => self.expand_markup(name, &value, depth + 1, resolver),
            Replacement::Skipped => {
                self.push_event(XmlEvent::EntityReference(name.to_string()));
                Ok(0)
            }
        }
    }

    /// Tokenize replacement text and queue its events in place of the
    /// reference. Elements it opens must also close within it.
    ///
    /// Every nesting level is charged for what it produced, so the budget
    /// grows with both the output and the depth it was reached through.
    fn expand_markup(
        &mut self,
        name: &str,
        value: &str,
        depth: usize,
        resolver: &mut Resolver<'_>,
    ) -> Result<usize, EngineError> {
        let level = self.open.len();
        let mut produced = 0;
        let mut nested = Reader::from_str(value);
        let config = nested.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        loop {
            let event = nested.read_event().map_err(|err| {
                self.syntax(format!("malformed replacement text of &{};: {}", name, err))
            })?;
            match event {
                Event::Start(start) => {
                    produced += start.name().as_ref().len();
                    self.start_element(&start, false, resolver)?;
                }
                Event::Empty(start) => {
                    produced += start.name().as_ref().len();
                    self.start_element(&start, true, resolver)?;
                }
                Event::End(end) => {
                    let tag = self.decode(end.name().as_ref())?;
                    produced += tag.len();
                    if self.open.len() <= level {
                        return Err(self.syntax(format!(
                            "end tag </{}> in &{}; closes an element opened outside it",
                            tag, name
                        )));
                    }
                    self.end_element(tag)?;
                }
                Event::Text(text) => {
                    let text = self.decode(&text)?;
                    produced += text.len();
                    self.append_text(&text);
                }
                Event::CData(data) => {
                    let data = self.decode(&data)?;
                    produced += data.len();
                    self.push_event(XmlEvent::CData(data));
                }
                Event::GeneralRef(reference) => {
                    let inner = reference
                        .decode()
                        .map_err(|err| self.syntax(format!("cannot decode reference: {}", err)))?
                        .into_owned();
                    produced += self.expand_in_content(&inner, depth, resolver)?;
                }
                Event::Comment(comment) => {
                    let comment = self.decode(&comment)?;
                    self.push_event(XmlEvent::Comment(comment));
                }
                Event::PI(pi) => self.processing_instruction(&pi)?,
                Event::Decl(_) | Event::DocType(_) => {
                    return Err(self.syntax(format!(
                        "replacement text of &{}; contains a declaration",
                        name
                    )))
                }
                Event::Eof => break,
            }
        }
        if self.open.len() != level {
            return Err(self.syntax(format!(
                "replacement text of &{}; leaves elements open",
                name
            )));
        }
        self.charge(produced)?;
        Ok(produced)
    }

    /// Look up what `&name;` stands for, fetching external text if enabled.
    fn replacement(
        &mut self,
        name: &str,
        depth: usize,
        context: Context,
        resolver: &mut Resolver<'_>,
    ) -> Result<Replacement, EngineError> {
        if name.starts_with('#') {
            return char_ref(name)
                .map(|c| Replacement::Literal(c.to_string()))
                .ok_or_else(|| self.syntax(format!("invalid character reference &{};", name)));
        }
        if let Some(text) = resolve_predefined_entity(name) {
            return Ok(Replacement::Literal(text.to_string()));
        }
        if depth >= MAX_EXPANSION_DEPTH {
            return Err(EngineError::entity(format!(
                "entity &{}; is nested more than {} levels deep",
                name, MAX_EXPANSION_DEPTH
            ))
            .at(self.location()));
        }
        match self.general.get(name).cloned() {
            Some(GeneralEntity::Internal(value)) => Ok(Replacement::Parsed(value)),
            Some(GeneralEntity::External {
                public_id,
                system_id,
            }) => {
                if context == Context::Attribute {
                    return Err(EngineError::entity(format!(
                        "external entity &{}; referenced in an attribute value",
                        name
                    ))
                    .at(self.location()));
                }
                if !self.settings.features.external_general_entities {
                    log::warn!("not expanding external entity &{};", name);
                    return Ok(Replacement::Skipped);
                }
                let text = self.fetch(public_id.as_deref(), &system_id, resolver)?;
                self.general
                    .insert(name.to_string(), GeneralEntity::Internal(text.clone()));
                Ok(Replacement::Parsed(text))
            }
            Some(GeneralEntity::Unparsed) => Err(EngineError::entity(format!(
                "reference to unparsed entity &{};",
                name
            ))
            .at(self.location())),
            None => Err(EngineError::entity(format!("undeclared entity &{};", name))
                .at(self.location())),
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<(), EngineError> {
        self.expanded += bytes;
        if self.expanded > MAX_EXPANDED_BYTES {
            return Err(EngineError::entity(format!(
                "entity expansion exceeds {} bytes",
                MAX_EXPANDED_BYTES
            ))
            .at(self.location()));
        }
        Ok(())
    }

    /// Expand every reference in entity replacement text or an attribute value.
    fn expand_text(
        &mut self,
        value: &str,
        depth: usize,
        context: Context,
        resolver: &mut Resolver<'_>,
    ) -> Result<String, EngineError> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(amp) = rest.find('&') {
            push_literal(&mut out, &rest[..amp], context);
            let after = &rest[amp + 1..];
            let semi = after
                .find(';')
                .ok_or_else(|| self.syntax("unterminated entity reference"))?;
            if let Some(text) = self.expand_reference(&after[..semi], depth, context, resolver)? {
                out.push_str(&text);
            }
            rest = &after[semi + 1..];
        }
        push_literal(&mut out, rest, context);
        self.charge(out.len())?;
        Ok(out)
    }

    fn doctype(&mut self, raw: &str, resolver: &mut Resolver<'_>) -> Result<DocType, EngineError> {
        let decl = dtd::parse_doctype(raw).map_err(|msg| self.syntax(msg))?;
        let mut doctype = DocType {
            name: decl.name,
            public_id: decl.public_id,
            system_id: decl.system_id,
            internal_subset: decl.internal_subset,
            ..DocType::default()
        };
        if !self.settings.features.support_dtd {
            log::debug!("DTD support is off, ignoring DOCTYPE {}", doctype.name);
            return Ok(doctype);
        }
        if let Some(subset) = doctype.internal_subset.clone() {
            self.apply_subset(&subset, &mut doctype, 0, resolver)?;
        }
        if let Some(system_id) = doctype.system_id.clone() {
            if self.settings.features.load_external_dtd {
                let text = self.fetch(doctype.public_id.as_deref(), &system_id, resolver)?;
                self.apply_subset(&text, &mut doctype, 0, resolver)?;
            } else {
                log::debug!("not loading external DTD {}", system_id);
            }
        }
        Ok(doctype)
    }

    fn apply_subset(
        &mut self,
        subset: &str,
        doctype: &mut DocType,
        depth: usize,
        resolver: &mut Resolver<'_>,
    ) -> Result<(), EngineError> {
        if depth >= MAX_EXPANSION_DEPTH {
            return Err(EngineError::entity(format!(
                "parameter entities are nested more than {} levels deep",
                MAX_EXPANSION_DEPTH
            ))
            .at(self.location()));
        }
        let markup = dtd::parse_subset(subset).map_err(|msg| self.syntax(msg))?;
        for item in markup {
            match item {
                Markup::Entity(decl) if decl.parameter => {
                    let entity = match decl.def {
                        EntityDef::Internal(text) => ParameterEntity::Internal(text),
                        EntityDef::External {
                            public_id,
                            system_id,
                            ..
                        } => ParameterEntity::External {
                            public_id,
                            system_id,
                        },
                    };
                    // First declaration is binding.
                    self.parameters.entry(decl.name).or_insert(entity);
                }
                Markup::Entity(decl) => {
                    if self.general.contains_key(&decl.name) {
                        continue;
                    }
                    let entity = match decl.def {
                        EntityDef::Internal(literal) => GeneralEntity::Internal(
                            replacement_text(&literal).map_err(|msg| self.syntax(msg))?,
                        ),
                        EntityDef::External {
                            public_id,
                            system_id,
                            notation: Some(notation),
                        } => {
                            doctype.unparsed_entities.push(super::UnparsedEntity {
                                name: decl.name.clone(),
                                public_id,
                                system_id,
                                notation,
                            });
                            GeneralEntity::Unparsed
                        }
                        EntityDef::External {
                            public_id,
                            system_id,
                            notation: None,
                        } => GeneralEntity::External {
                            public_id,
                            system_id,
                        },
                    };
                    self.general.insert(decl.name, entity);
                }
                Markup::Notation(notation) => doctype.notations.push(notation),
                Markup::ParameterReference(name) => {
                    match self.parameters.get(&name).cloned() {
                        Some(ParameterEntity::Internal(text)) => {
                            self.apply_subset(&text, doctype, depth + 1, resolver)?;
                        }
                        Some(ParameterEntity::External {
                            public_id,
                            system_id,
                        }) => {
                            if self.settings.features.external_parameter_entities {
                                let text = self.fetch(public_id.as_deref(), &system_id, resolver)?;
                                self.apply_subset(&text, doctype, depth + 1, resolver)?;
                            } else {
                                log::debug!("not expanding external parameter entity %{};", name);
                            }
                        }
                        None => {
                            return Err(EngineError::entity(format!(
                                "undeclared parameter entity %{};",
                                name
                            ))
                            .at(self.location()))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch external content: caller resolver first, then the loader.
    fn fetch(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
        resolver: &mut Resolver<'_>,
    ) -> Result<String, EngineError> {
        let absolute = system_id::resolve(self.system_id.as_deref(), system_id);
        if let Some(resolver) = resolver.as_mut() {
            let resolved = resolver
                .resolve_entity(public_id, &absolute)
                .map_err(|err| self.entity_io(&absolute, &err))?;
            if let Some(bytes) = resolved {
                return decode_external(&absolute, bytes);
            }
        }
        log::debug!("fetching external content {}", absolute);
        let bytes = self
            .settings
            .loader
            .load(&absolute)
            .map_err(|err| self.entity_io(&absolute, &err))?;
        decode_external(&absolute, bytes)
    }

    fn entity_io(&self, system_id: &str, err: &std::io::Error) -> EngineError {
        EngineError::entity(format!(
            "cannot load external content `{}`: {}",
            system_id, err
        ))
        .at(self.location())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, EngineError> {
        self.reader
            .decoder()
            .decode(bytes)
            .map(|text| text.into_owned())
            .map_err(|err| {
                EngineError::encoding(format!("cannot decode input: {}", err)).at(self.location())
            })
    }

    fn syntax(&self, message: impl Into<String>) -> EngineError {
        EngineError::syntax(message).at(self.location())
    }

    fn engine_error(&self, err: &quick_xml::Error) -> EngineError {
        let location = Location {
            system_id: self.system_id.clone(),
            position: self.reader.error_position() as u64,
        };
        let message = err.to_string();
        match err {
            quick_xml::Error::Io(_) => EngineError::io(message).at(location),
            _ if mentions_end_of_input(&message) => EngineError::eof(message).at(location),
            _ => EngineError::syntax(message).at(location),
        }
    }
}

impl XmlCursor for XmlStreamReader<'_> {
    fn close(&mut self) -> Result<(), EngineError> {
        if !self.closed {
            self.closed = true;
            self.queue.clear();
            self.pending_text = None;
            self.buf = Vec::new();
            log::trace!(
                "closed XML reader for {}",
                self.system_id.as_deref().unwrap_or("<anonymous input>")
            );
        }
        Ok(())
    }
}

impl XmlStreamReader<'_> {
    /// Close the cursor; later calls are no-ops. The input is not closed.
    pub fn close(&mut self) -> Result<(), EngineError> {
        XmlCursor::close(self)
    }
}

impl fmt::Debug for XmlStreamReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlStreamReader")
            .field("system_id", &self.system_id)
            .field("current", &self.current)
            .field("depth", &self.open.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Attribute values normalize literal whitespace to spaces.
fn push_literal(out: &mut String, literal: &str, context: Context) {
    match context {
        Context::Content => out.push_str(literal),
        Context::Attribute => out.extend(literal.chars().map(|c| {
            if is_xml_whitespace(c) {
                ' '
            } else {
                c
            }
        })),
    }
}

/// Owned-event view over a [`XmlStreamReader`].
///
/// The first event is `StartDocument` and the last `EndDocument`. Also an
/// `Iterator` that stops after the first error.
pub struct XmlEventReader<'a> {
    inner: XmlStreamReader<'a>,
    delivered_first: bool,
    peeked: Option<XmlEvent>,
    failed: bool,
}

impl<'a> XmlEventReader<'a> {
    fn new(inner: XmlStreamReader<'a>) -> Self {
        Self {
            inner,
            delivered_first: false,
            peeked: None,
            failed: false,
        }
    }

    /// True while events remain.
    pub fn has_next(&self) -> bool {
        !self.failed && (self.peeked.is_some() || self.has_more_raw())
    }

    /// Take the next event.
    pub fn next_event(&mut self) -> Result<XmlEvent, EngineError> {
        if let Some(event) = self.peeked.take() {
            return Ok(event);
        }
        self.pull()
    }

    /// Look at the next event without consuming it; `None` after the end.
    pub fn peek(&mut self) -> Result<Option<&XmlEvent>, EngineError> {
        if self.peeked.is_none() && self.has_more_raw() {
            let event = self.pull()?;
            self.peeked = Some(event);
        }
        Ok(self.peeked.as_ref())
    }

    /// Skip the prolog, whitespace, comments and PIs up to the next start or
    /// end element.
    pub fn next_tag(&mut self) -> Result<XmlEvent, EngineError> {
        loop {
            let event = self.next_event()?;
            match &event {
                XmlEvent::StartElement { .. } | XmlEvent::EndElement { .. } => return Ok(event),
                XmlEvent::StartDocument { .. }
                | XmlEvent::Dtd(_)
                | XmlEvent::Comment(_)
                | XmlEvent::ProcessingInstruction { .. } => {}
                e if e.is_whitespace() => {}
                other => {
                    return Err(EngineError::syntax(format!(
                        "expected a start or end tag but found {}",
                        other
                    ))
                    .at(self.inner.location()))
                }
            }
        }
    }

    /// Read text up to the end element of the start element just consumed.
    pub fn element_text(&mut self) -> Result<String, EngineError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                XmlEvent::Characters(chunk) | XmlEvent::CData(chunk) => text.push_str(&chunk),
                XmlEvent::Comment(_)
                | XmlEvent::ProcessingInstruction { .. }
                | XmlEvent::EntityReference(_) => {}
                XmlEvent::EndElement { .. } => return Ok(text),
                other => {
                    return Err(EngineError::syntax(format!(
                        "unexpected {} while reading element text",
                        other
                    ))
                    .at(self.inner.location()))
                }
            }
        }
    }

    /// Position of the underlying cursor.
    pub fn location(&self) -> Location {
        self.inner.location()
    }

    /// System identifier the reader was opened with.
    pub fn system_id(&self) -> Option<&str> {
        self.inner.system_id()
    }

    /// Close the reader; later calls are no-ops. The input is not closed.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.peeked = None;
        self.inner.close()
    }

    fn has_more_raw(&self) -> bool {
        if self.inner.closed {
            return false;
        }
        !self.delivered_first || self.inner.has_next()
    }

    fn pull(&mut self) -> Result<XmlEvent, EngineError> {
        if !self.delivered_first && !self.inner.closed {
            self.delivered_first = true;
            return Ok(self.inner.event().clone());
        }
        match self.inner.next() {
            Ok(_) => Ok(self.inner.event().clone()),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }
}

impl XmlCursor for XmlEventReader<'_> {
    fn close(&mut self) -> Result<(), EngineError> {
        XmlEventReader::close(self)
    }
}

impl Iterator for XmlEventReader<'_> {
    type Item = Result<XmlEvent, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_event())
    }
}

impl fmt::Debug for XmlEventReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlEventReader")
            .field("inner", &self.inner)
            .field("peeked", &self.peeked)
            .finish()
    }
}
