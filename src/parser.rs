//! Turning XML input into values.
//!
//! A [`Parser`] implementation supplies two primitives: parse UTF-8 text from
//! a borrowed reader, and parse a borrowed byte stream in a given charset.
//! Every other entry point is derived from those two and follows the same
//! resource rules:
//!
//! - borrowed readers and streams are never closed;
//! - resources opened by the parser (files, factory results, anchored
//!   resources) are closed exactly once, whether parsing succeeds or fails;
//! - arguments are validated before any resource is opened.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use crate::charset::Charset;
use crate::error::Error;
use crate::resource::{
    check_source, open_file, open_or_fail, release_reader, with_owned, ResourceAnchor,
};
use crate::system_id;
use crate::vfs::VirtualPath;

/// Parses XML input into a `T`.
///
/// Implementations must be usable from several threads at once when they are
/// `Sync`; none of the entry points mutate the parser.
pub trait Parser<T> {
    /// Parse UTF-8 text from a borrowed reader. The reader is not closed.
    ///
    /// `system_id` names the document in diagnostics.
    fn parse_reader_with_id(
        &self,
        reader: &mut dyn BufRead,
        system_id: Option<&str>,
    ) -> Result<T, Error>;

    /// Parse a borrowed byte stream encoded in `charset`. The stream is not
    /// closed.
    fn parse_stream_with_id(
        &self,
        stream: &mut dyn Read,
        charset: Charset,
        system_id: Option<&str>,
    ) -> Result<T, Error>;

    /// Parse UTF-8 text from a borrowed reader.
    fn parse_reader(&self, reader: &mut dyn BufRead) -> Result<T, Error> {
        self.parse_reader_with_id(reader, None)
    }

    /// Parse a borrowed UTF-8 byte stream.
    fn parse_stream(&self, stream: &mut dyn Read) -> Result<T, Error> {
        self.parse_stream_with_id(stream, Charset::utf_8(), None)
    }

    /// Parse a borrowed byte stream encoded in `charset`.
    fn parse_stream_with_charset(
        &self,
        stream: &mut dyn Read,
        charset: Charset,
    ) -> Result<T, Error> {
        self.parse_stream_with_id(stream, charset, None)
    }

    /// Parse a document held in memory.
    fn parse_str(&self, text: &str) -> Result<T, Error> {
        let mut reader = text.as_bytes();
        self.parse_reader(&mut reader)
    }

    /// Parse a UTF-8 file.
    fn parse_file(&self, path: &Path) -> Result<T, Error> {
        self.parse_file_with_charset(path, Charset::utf_8())
    }

    /// Parse a file encoded in `charset`.
    ///
    /// Fails with `NotFound` or `AccessDenied` before opening anything. The
    /// file's `file:` URI is the document's system identifier.
    fn parse_file_with_charset(&self, path: &Path, charset: Charset) -> Result<T, Error> {
        let path = check_source(path)?;
        let system_id = system_id::from_path(path);
        log::debug!("parsing {} as {}", path.display(), charset);
        let file = open_or_fail(
            || open_file(path),
            || format!("InputStream for {}", path.display()),
        )?;
        with_owned(
            BufReader::new(file),
            |stream| self.parse_stream_with_id(stream, charset, Some(&system_id)),
            release_reader,
        )
    }

    /// Parse a UTF-8 document at a real or in-memory path.
    fn parse_path(&self, path: &dyn VirtualPath) -> Result<T, Error> {
        self.parse_path_with_charset(path, Charset::utf_8())
    }

    /// Parse a document at a real or in-memory path, encoded in `charset`.
    ///
    /// Real paths go through [`parse_file_with_charset`](Self::parse_file_with_charset).
    fn parse_path_with_charset(&self, path: &dyn VirtualPath, charset: Charset) -> Result<T, Error> {
        if let Some(local) = path.local_path() {
            return self.parse_file_with_charset(local, charset);
        }
        let stream = path.open_read().map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.path().to_path_buf(),
            },
            _ => Error::Io(err),
        })?;
        with_owned(
            BufReader::new(stream),
            |stream| self.parse_stream_with_id(stream, charset, None),
            release_reader,
        )
    }

    /// Parse the UTF-8 resource `name` located relative to `anchor`.
    fn parse_resource(&self, anchor: &dyn ResourceAnchor, name: &str) -> Result<T, Error> {
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("name", "resource name is empty"));
        }
        let stream = open_or_fail(
            || anchor.open_resource(name),
            || format!("resource `{}` relative to {}", name, anchor.anchor_name()),
        )?;
        with_owned(
            BufReader::new(stream),
            |stream| self.parse_stream(stream),
            release_reader,
        )
    }

    /// Parse from a reader produced by `factory`, closing it afterwards.
    ///
    /// A factory yielding `None` is a `MissingResource` error.
    fn parse_reader_from<R, F>(&self, factory: F) -> Result<T, Error>
    where
        R: BufRead,
        F: FnOnce() -> io::Result<Option<R>>,
        Self: Sized,
    {
        let reader = open_or_fail(factory, || "Reader".to_string())?;
        with_owned(reader, |reader| self.parse_reader(reader), release_reader)
    }

    /// Parse from a byte stream produced by `factory`, closing it afterwards.
    fn parse_stream_from<R, F>(&self, factory: F, charset: Charset) -> Result<T, Error>
    where
        R: Read,
        F: FnOnce() -> io::Result<Option<R>>,
        Self: Sized,
    {
        let stream = open_or_fail(factory, || "InputStream".to_string())?;
        with_owned(
            stream,
            |stream| self.parse_stream_with_charset(stream, charset),
            release_reader,
        )
    }

    /// A parser whose results are passed through `f`.
    fn map<V, F>(self, f: F) -> AndThen<Self, T, V>
    where
        Self: Sized,
        F: Fn(T) -> V + Send + Sync + 'static,
    {
        AndThen {
            parser: self,
            transform: Box::new(move |value| Some(f(value))),
        }
    }

    /// A parser whose results are passed through `f`; `None` fails the parse
    /// with `InvalidArgument`.
    fn and_then<V, F>(self, f: F) -> AndThen<Self, T, V>
    where
        Self: Sized,
        F: Fn(T) -> Option<V> + Send + Sync + 'static,
    {
        AndThen {
            parser: self,
            transform: Box::new(f),
        }
    }
}

/// Parser adapter created by [`Parser::map`] and [`Parser::and_then`].
///
/// Every entry point delegates to the same entry point of the wrapped parser,
/// so its resource handling is unchanged. The transform runs only after a
/// successful parse.
pub struct AndThen<P, T, V> {
    parser: P,
    transform: Box<dyn Fn(T) -> Option<V> + Send + Sync>,
}

impl<P, T, V> AndThen<P, T, V> {
    fn apply(&self, parsed: Result<T, Error>) -> Result<V, Error> {
        let value = parsed?;
        (self.transform)(value)
            .ok_or_else(|| Error::invalid_argument("result", "transform produced no value"))
    }
}

impl<P, T, V> Parser<V> for AndThen<P, T, V>
where
    P: Parser<T>,
{
    fn parse_reader_with_id(
        &self,
        reader: &mut dyn BufRead,
        system_id: Option<&str>,
    ) -> Result<V, Error> {
        self.apply(self.parser.parse_reader_with_id(reader, system_id))
    }

    fn parse_stream_with_id(
        &self,
        stream: &mut dyn Read,
        charset: Charset,
        system_id: Option<&str>,
    ) -> Result<V, Error> {
        self.apply(self.parser.parse_stream_with_id(stream, charset, system_id))
    }

    fn parse_str(&self, text: &str) -> Result<V, Error> {
        self.apply(self.parser.parse_str(text))
    }

    fn parse_file_with_charset(&self, path: &Path, charset: Charset) -> Result<V, Error> {
        self.apply(self.parser.parse_file_with_charset(path, charset))
    }

    fn parse_path_with_charset(&self, path: &dyn VirtualPath, charset: Charset) -> Result<V, Error> {
        self.apply(self.parser.parse_path_with_charset(path, charset))
    }

    fn parse_resource(&self, anchor: &dyn ResourceAnchor, name: &str) -> Result<V, Error> {
        self.apply(self.parser.parse_resource(anchor, name))
    }

    fn parse_reader_from<R, F>(&self, factory: F) -> Result<V, Error>
    where
        R: BufRead,
        F: FnOnce() -> io::Result<Option<R>>,
        Self: Sized,
    {
        self.apply(self.parser.parse_reader_from(factory))
    }

    fn parse_stream_from<R, F>(&self, factory: F, charset: Charset) -> Result<V, Error>
    where
        R: Read,
        F: FnOnce() -> io::Result<Option<R>>,
        Self: Sized,
    {
        self.apply(self.parser.parse_stream_from(factory, charset))
    }
}
