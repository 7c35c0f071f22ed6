//! Push-style XML writers over quick-xml.

use std::fmt;
use std::io::Write;

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use super::event::XmlEvent;
use super::reader::XmlEventReader;
use super::{EngineError, XmlCursor};
use crate::charset::Charset;

/// Creates writer cursors.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlOutputFactory {
    indent: Option<usize>,
}

impl XmlOutputFactory {
    /// Factory producing compact output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent nested elements by `width` spaces.
    pub fn with_indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }

    /// Open a writer that declares `charset` in its XML declaration.
    ///
    /// The writer produces UTF-8; transcoding to `charset` is the caller's
    /// business. Charsets that cannot be produced are refused.
    pub fn create_stream_writer<'a>(
        &self,
        out: Box<dyn Write + 'a>,
        charset: Charset,
    ) -> Result<XmlStreamWriter<'a>, EngineError> {
        if charset.encoding().output_encoding() != charset.encoding() {
            return Err(EngineError::state(format!(
                "cannot write XML in charset {}",
                charset
            )));
        }
        let writer = match self.indent {
            Some(width) => Writer::new_with_indent(out, b' ', width),
            None => Writer::new(out),
        };
        Ok(XmlStreamWriter {
            writer,
            encoding: charset.name(),
            pending: None,
            open: Vec::new(),
            declared: false,
            root_closed: false,
            closed: false,
        })
    }

    /// Open an event writer.
    pub fn create_event_writer<'a>(
        &self,
        out: Box<dyn Write + 'a>,
        charset: Charset,
    ) -> Result<XmlEventWriter<'a>, EngineError> {
        self.create_stream_writer(out, charset)
            .map(|inner| XmlEventWriter { inner })
    }
}

/// Start tag waiting for attributes.
struct PendingStart {
    start: BytesStart<'static>,
    empty: bool,
}

/// Cursor that writes one construct per call.
///
/// Start tags stay open for [`write_attribute`](Self::write_attribute) until
/// the next construct is written.
pub struct XmlStreamWriter<'a> {
    writer: Writer<Box<dyn Write + 'a>>,
    encoding: &'static str,
    pending: Option<PendingStart>,
    open: Vec<String>,
    declared: bool,
    root_closed: bool,
    closed: bool,
}

impl XmlStreamWriter<'_> {
    /// `<?xml version="1.0" encoding="..."?>`
    pub fn write_start_document(&mut self) -> Result<(), EngineError> {
        self.write_start_document_with("1.0", None)
    }

    /// XML declaration with an explicit version and standalone flag.
    pub fn write_start_document_with(
        &mut self,
        version: &str,
        standalone: Option<bool>,
    ) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.declared || !self.open.is_empty() || self.root_closed {
            return Err(EngineError::state(
                "XML declaration must be the first thing written",
            ));
        }
        self.declared = true;
        let standalone = standalone.map(|yes| if yes { "yes" } else { "no" });
        let encoding = self.encoding;
        self.emit(Event::Decl(BytesDecl::new(version, Some(encoding), standalone)))
    }

    /// Open element `name`; attributes may follow.
    pub fn write_start_element(&mut self, name: &str) -> Result<(), EngineError> {
        self.begin(name, false)?;
        self.open.push(name.to_string());
        Ok(())
    }

    /// Write `<name/>`; attributes may follow.
    pub fn write_empty_element(&mut self, name: &str) -> Result<(), EngineError> {
        self.begin(name, true)
    }

    /// Add an attribute to the start tag just written.
    pub fn write_attribute(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        check_name(name)?;
        match self.pending.as_mut() {
            Some(pending) => {
                pending.start.push_attribute((name, value));
                Ok(())
            }
            None => Err(EngineError::state(format!(
                "attribute `{}` written outside a start tag",
                name
            ))),
        }
    }

    /// Escaped character data.
    pub fn write_characters(&mut self, text: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        if self.open.is_empty() && !text.trim().is_empty() {
            return Err(EngineError::state(
                "character data outside the root element",
            ));
        }
        self.emit(Event::Text(BytesText::new(text)))
    }

    /// `<![CDATA[...]]>`
    pub fn write_cdata(&mut self, data: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        if self.open.is_empty() {
            return Err(EngineError::state("CDATA section outside the root element"));
        }
        if data.contains("]]>") {
            return Err(EngineError::state("CDATA section cannot contain `]]>`"));
        }
        self.emit(Event::CData(BytesCData::new(data)))
    }

    /// `<!--...-->`
    pub fn write_comment(&mut self, text: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        if text.contains("--") || text.ends_with('-') {
            return Err(EngineError::state("comment cannot contain `--`"));
        }
        self.emit(Event::Comment(BytesText::from_escaped(text)))
    }

    /// `<?target data?>`
    pub fn write_processing_instruction(
        &mut self,
        target: &str,
        data: Option<&str>,
    ) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        check_name(target)?;
        let content = match data {
            Some(data) if !data.is_empty() => format!("{} {}", target, data),
            _ => target.to_string(),
        };
        self.emit(Event::PI(BytesPI::new(content)))
    }

    /// `<!DOCTYPE declaration>`; `declaration` is everything after the keyword.
    pub fn write_dtd(&mut self, declaration: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        if !self.open.is_empty() || self.root_closed || self.pending.is_some() {
            return Err(EngineError::state("DOCTYPE must precede the root element"));
        }
        let raw = format!("<!DOCTYPE {}>", declaration.trim());
        self.raw(raw.as_bytes())
    }

    /// `&name;` written verbatim.
    pub fn write_entity_reference(&mut self, name: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        check_name(name)?;
        self.raw(format!("&{};", name).as_bytes())
    }

    /// Close the innermost open element.
    pub fn write_end_element(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        let name = self
            .open
            .pop()
            .ok_or_else(|| EngineError::state("no open element to end"))?;
        self.emit(Event::End(BytesEnd::new(name)))?;
        if self.open.is_empty() {
            self.root_closed = true;
        }
        Ok(())
    }

    /// Close every open element.
    pub fn write_end_document(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        while !self.open.is_empty() {
            self.write_end_element()?;
        }
        Ok(())
    }

    /// Flush buffered output to the underlying writer.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        self.writer
            .get_mut()
            .flush()
            .map_err(|err| EngineError::io(format!("cannot flush XML output: {}", err)))
    }

    /// Depth of open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Close the writer; later calls are no-ops. Writes any pending start tag
    /// and flushes, but never closes the underlying writer.
    pub fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.flush();
        self.closed = true;
        flushed
    }

    fn begin(&mut self, name: &str, empty: bool) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.flush_pending()?;
        check_name(name)?;
        if self.open.is_empty() && self.root_closed {
            return Err(EngineError::state(format!(
                "cannot write <{}>: the document already has a root element",
                name
            )));
        }
        self.pending = Some(PendingStart {
            start: BytesStart::new(name.to_string()),
            empty,
        });
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), EngineError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if pending.empty {
            self.emit(Event::Empty(pending.start))?;
            if self.open.is_empty() {
                self.root_closed = true;
            }
            Ok(())
        } else {
            self.emit(Event::Start(pending.start))
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), EngineError> {
        self.writer
            .write_event(event)
            .map_err(|err| EngineError::io(format!("cannot write XML: {}", err)))
    }

    fn raw(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.writer
            .get_mut()
            .write_all(bytes)
            .map_err(|err| EngineError::io(format!("cannot write XML: {}", err)))
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::state("XML writer is closed"));
        }
        Ok(())
    }
}

impl XmlCursor for XmlStreamWriter<'_> {
    fn close(&mut self) -> Result<(), EngineError> {
        XmlStreamWriter::close(self)
    }
}

impl fmt::Debug for XmlStreamWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlStreamWriter")
            .field("encoding", &self.encoding)
            .field("open", &self.open)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn check_name(name: &str) -> Result<(), EngineError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EngineError::state(format!("`{}` is not a valid XML name", name)))
    }
}

/// Writer that accepts owned [`XmlEvent`]s.
pub struct XmlEventWriter<'a> {
    inner: XmlStreamWriter<'a>,
}

impl<'a> XmlEventWriter<'a> {
    /// Write one event.
    pub fn add(&mut self, event: &XmlEvent) -> Result<(), EngineError> {
        let w = &mut self.inner;
        match event {
            XmlEvent::StartDocument {
                version,
                standalone,
                ..
            } => w.write_start_document_with(version, *standalone),
            XmlEvent::EndDocument => w.write_end_document(),
            XmlEvent::StartElement { name, attributes } => {
                w.write_start_element(name)?;
                for attr in attributes {
                    w.write_attribute(&attr.name, &attr.value)?;
                }
                Ok(())
            }
            XmlEvent::EndElement { name } => {
                if let Some(open) = w.open.last() {
                    if open != name {
                        return Err(EngineError::state(format!(
                            "end element </{}> does not match open element <{}>",
                            name, open
                        )));
                    }
                }
                w.write_end_element()
            }
            XmlEvent::Characters(text) => w.write_characters(text),
            XmlEvent::CData(data) => w.write_cdata(data),
            XmlEvent::Comment(text) => w.write_comment(text),
            XmlEvent::ProcessingInstruction { target, data } => {
                w.write_processing_instruction(target, Some(data))
            }
            XmlEvent::Dtd(doctype) => w.write_dtd(&doctype.declaration()),
            XmlEvent::EntityReference(name) => w.write_entity_reference(name),
        }
    }

    /// Copy every remaining event of `reader`; returns how many were written.
    pub fn add_all(&mut self, reader: &mut XmlEventReader<'_>) -> Result<usize, EngineError> {
        let mut count = 0;
        while reader.has_next() {
            let event = reader.next_event()?;
            self.add(&event)?;
            count += 1;
        }
        Ok(count)
    }

    /// The underlying stream writer.
    pub fn stream_writer(&mut self) -> &mut XmlStreamWriter<'a> {
        &mut self.inner
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        self.inner.flush()
    }

    /// Close the writer; later calls are no-ops.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.inner.close()
    }
}

impl XmlCursor for XmlEventWriter<'_> {
    fn close(&mut self) -> Result<(), EngineError> {
        XmlEventWriter::close(self)
    }
}

impl fmt::Debug for XmlEventWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlEventWriter")
            .field("inner", &self.inner)
            .finish()
    }
}
