//! Parser and formatter backends driven by the pull cursors.
//!
//! Each backend wraps a handler closure. Parsers hand the handler a cursor
//! positioned on `StartDocument`; formatters hand it the value and a writer
//! cursor. The cursor is closed after the handler returns. When the handler
//! fails, closing is best-effort and the handler's error wins.
//!
//! Non-UTF-8 output is produced in memory and transcoded once the writer
//! cursor is closed, so nothing reaches the target if writing fails.

use std::fmt;
use std::io::{BufRead, Read, Write};

use crate::charset::{self, Charset};
use crate::config::XmlOptions;
use crate::error::Error;
use crate::formatter::Formatter;
use crate::parser::Parser;
use crate::xml::{
    XmlCursor, XmlEventReader, XmlEventWriter, XmlInputFactory, XmlOutputFactory,
    XmlStreamReader, XmlStreamWriter,
};
use crate::xxe;

type StreamRead<T> = dyn Fn(&mut XmlStreamReader<'_>) -> Result<T, Error> + Send + Sync;
type EventRead<T> = dyn Fn(&mut XmlEventReader<'_>) -> Result<T, Error> + Send + Sync;
type StreamWrite<T> = dyn Fn(&T, &mut XmlStreamWriter<'_>) -> Result<(), Error> + Send + Sync;
type EventWrite<T> = dyn Fn(&T, &mut XmlEventWriter<'_>) -> Result<(), Error> + Send + Sync;

/// Run `body` on `cursor`, then close it.
fn run_cursor<C, T>(mut cursor: C, body: impl FnOnce(&mut C) -> Result<T, Error>) -> Result<T, Error>
where
    C: XmlCursor,
{
    match body(&mut cursor) {
        Ok(value) => {
            cursor.close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = cursor.close() {
                log::debug!("ignoring cursor close failure after error: {}", close_err);
            }
            Err(err)
        }
    }
}

fn input_factory(base: &XmlInputFactory, options: &XmlOptions) -> XmlInputFactory {
    let mut factory = base.clone();
    xxe::apply(&mut factory, options);
    factory
}

fn output_factory(base: XmlOutputFactory, options: &XmlOptions) -> XmlOutputFactory {
    match options.indent {
        Some(width) => base.with_indent(width),
        None => base,
    }
}

/// Write through `write`, transcoding into `charset` when it is not UTF-8.
fn write_encoded(
    stream: &mut dyn Write,
    charset: Charset,
    write: impl FnOnce(Box<dyn Write + '_>) -> Result<(), Error>,
) -> Result<(), Error> {
    charset.ensure_writable()?;
    if charset.is_utf_8() {
        write(Box::new(&mut *stream))?;
        return stream.flush().map_err(Error::Io);
    }
    let mut buffer = Vec::new();
    write(Box::new(&mut buffer))?;
    charset::encode_into(&buffer, charset, stream)?;
    stream.flush().map_err(Error::Io)
}

/// Parser backed by the cursor reader.
pub struct StaxStreamParser<T> {
    factory: XmlInputFactory,
    handler: Box<StreamRead<T>>,
    options: XmlOptions,
}

impl<T> StaxStreamParser<T> {
    /// Parse with `handler`, which receives a cursor on `StartDocument`.
    ///
    /// The handler does not close anything. Once it returns, the cursor is
    /// closed and then any input the parse opened, whether it succeeded or
    /// failed. The handler reads as far as it needs; nothing after that is
    /// checked.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut XmlStreamReader<'_>) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            factory: XmlInputFactory::new(),
            handler: Box::new(handler),
            options: XmlOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: XmlOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the input factory, e.g. to install an entity loader.
    pub fn with_factory(mut self, factory: XmlInputFactory) -> Self {
        self.factory = factory;
        self
    }

    fn read(&self, input: Box<dyn BufRead + '_>, system_id: Option<&str>) -> Result<T, Error> {
        let reader =
            input_factory(&self.factory, &self.options).create_stream_reader(input, system_id)?;
        run_cursor(reader, |cursor| (self.handler)(cursor))
    }
}

impl<T> Parser<T> for StaxStreamParser<T> {
    fn parse_reader_with_id(
        &self,
        reader: &mut dyn BufRead,
        system_id: Option<&str>,
    ) -> Result<T, Error> {
        self.read(Box::new(reader), system_id)
    }

    fn parse_stream_with_id(
        &self,
        stream: &mut dyn Read,
        charset: Charset,
        system_id: Option<&str>,
    ) -> Result<T, Error> {
        let decoded = charset::decode_stream(stream, charset)?;
        self.read(decoded, system_id)
    }
}

/// Parser backed by the event reader.
pub struct StaxEventParser<T> {
    factory: XmlInputFactory,
    handler: Box<EventRead<T>>,
    options: XmlOptions,
}

impl<T> StaxEventParser<T> {
    /// Parse with `handler`, whose first event is `StartDocument`.
    ///
    /// Closing works as for [`StaxStreamParser::new`].
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&mut XmlEventReader<'_>) -> Result<T, Error> + Send + Sync + 'static,
    {
        Self {
            factory: XmlInputFactory::new(),
            handler: Box::new(handler),
            options: XmlOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: XmlOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the input factory.
    pub fn with_factory(mut self, factory: XmlInputFactory) -> Self {
        self.factory = factory;
        self
    }

    fn read(&self, input: Box<dyn BufRead + '_>, system_id: Option<&str>) -> Result<T, Error> {
        let reader =
            input_factory(&self.factory, &self.options).create_event_reader(input, system_id)?;
        run_cursor(reader, |events| (self.handler)(events))
    }
}

impl<T> Parser<T> for StaxEventParser<T> {
    fn parse_reader_with_id(
        &self,
        reader: &mut dyn BufRead,
        system_id: Option<&str>,
    ) -> Result<T, Error> {
        self.read(Box::new(reader), system_id)
    }

    fn parse_stream_with_id(
        &self,
        stream: &mut dyn Read,
        charset: Charset,
        system_id: Option<&str>,
    ) -> Result<T, Error> {
        let decoded = charset::decode_stream(stream, charset)?;
        self.read(decoded, system_id)
    }
}

/// Formatter backed by the cursor writer.
pub struct StaxStreamFormatter<T: ?Sized> {
    factory: XmlOutputFactory,
    handler: Box<StreamWrite<T>>,
    options: XmlOptions,
}

impl<T: ?Sized> StaxStreamFormatter<T> {
    /// Format with `handler`. It writes the whole document, declaration
    /// included if wanted.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&T, &mut XmlStreamWriter<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        Self {
            factory: XmlOutputFactory::new(),
            handler: Box::new(handler),
            options: XmlOptions::default(),
        }
    }

    /// Replace the options; `indent` controls pretty-printing.
    pub fn with_options(mut self, options: XmlOptions) -> Self {
        self.options = options;
        self
    }

    fn write(&self, value: &T, out: Box<dyn Write + '_>, charset: Charset) -> Result<(), Error> {
        let writer = output_factory(self.factory, &self.options).create_stream_writer(out, charset)?;
        run_cursor(writer, |cursor| (self.handler)(value, cursor))
    }
}

impl<T: ?Sized> Formatter<T> for StaxStreamFormatter<T> {
    fn format_writer(&self, value: &T, writer: &mut dyn Write) -> Result<(), Error> {
        self.write(value, Box::new(writer), Charset::utf_8())
    }

    fn format_stream_with_charset(
        &self,
        value: &T,
        stream: &mut dyn Write,
        charset: Charset,
    ) -> Result<(), Error> {
        write_encoded(stream, charset, |out| self.write(value, out, charset))
    }
}

/// Formatter backed by the event writer.
pub struct StaxEventFormatter<T: ?Sized> {
    factory: XmlOutputFactory,
    handler: Box<EventWrite<T>>,
    options: XmlOptions,
}

impl<T: ?Sized> StaxEventFormatter<T> {
    /// Format with `handler`, which adds events to the writer.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&T, &mut XmlEventWriter<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        Self {
            factory: XmlOutputFactory::new(),
            handler: Box::new(handler),
            options: XmlOptions::default(),
        }
    }

    /// Replace the options; `indent` controls pretty-printing.
    pub fn with_options(mut self, options: XmlOptions) -> Self {
        self.options = options;
        self
    }

    fn write(&self, value: &T, out: Box<dyn Write + '_>, charset: Charset) -> Result<(), Error> {
        let writer = output_factory(self.factory, &self.options).create_event_writer(out, charset)?;
        run_cursor(writer, |events| (self.handler)(value, events))
    }
}

impl<T: ?Sized> Formatter<T> for StaxEventFormatter<T> {
    fn format_writer(&self, value: &T, writer: &mut dyn Write) -> Result<(), Error> {
        self.write(value, Box::new(writer), Charset::utf_8())
    }

    fn format_stream_with_charset(
        &self,
        value: &T,
        stream: &mut dyn Write,
        charset: Charset,
    ) -> Result<(), Error> {
        write_encoded(stream, charset, |out| self.write(value, out, charset))
    }
}

macro_rules! debug_backend {
    ($name:ident, $($bound:tt)+) => {
        impl<T: $($bound)+> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("options", &self.options)
                    .finish_non_exhaustive()
            }
        }
    };
}

debug_backend!(StaxStreamParser, Sized);
debug_backend!(StaxEventParser, Sized);
debug_backend!(StaxStreamFormatter, ?Sized);
debug_backend!(StaxEventFormatter, ?Sized);
