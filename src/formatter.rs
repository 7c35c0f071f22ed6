//! Turning values into XML output.
//!
//! The mirror image of [`crate::parser`]: implementations supply "format to a
//! borrowed writer" and "format to a borrowed byte stream in a charset", and
//! every other entry point is derived with the same resource rules. Targets
//! opened by the formatter are flushed and closed exactly once; borrowed ones
//! are left open.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::charset::Charset;
use crate::error::Error;
use crate::resource::{check_target, create_file, open_or_fail, release_writer, with_owned};
use crate::vfs::VirtualPath;

/// Formats a `T` as XML.
pub trait Formatter<T: ?Sized> {
    /// Write `value` as UTF-8 XML to a borrowed writer. The writer is flushed
    /// but not closed.
    fn format_writer(&self, value: &T, writer: &mut dyn Write) -> Result<(), Error>;

    /// Write `value` to a borrowed byte stream, encoded in `charset`.
    fn format_stream_with_charset(
        &self,
        value: &T,
        stream: &mut dyn Write,
        charset: Charset,
    ) -> Result<(), Error>;

    /// Write `value` to a borrowed byte stream as UTF-8.
    fn format_stream(&self, value: &T, stream: &mut dyn Write) -> Result<(), Error> {
        self.format_stream_with_charset(value, stream, Charset::utf_8())
    }

    /// Format `value` into a string.
    fn format_to_string(&self, value: &T) -> Result<String, Error> {
        let mut out = Vec::new();
        self.format_writer(value, &mut out)?;
        String::from_utf8(out)
            .map_err(|err| Error::backend_with("formatter produced invalid UTF-8", err))
    }

    /// Write `value` to a UTF-8 file, creating or truncating it.
    fn format_file(&self, value: &T, path: &Path) -> Result<(), Error> {
        self.format_file_with_charset(value, path, Charset::utf_8())
    }

    /// Write `value` to a file encoded in `charset`.
    ///
    /// Fails with `AccessDenied` before creating anything if `path` is a
    /// directory or other non-regular file.
    fn format_file_with_charset(&self, value: &T, path: &Path, charset: Charset) -> Result<(), Error> {
        charset.ensure_writable()?;
        let path = check_target(path)?;
        log::debug!("formatting into {} as {}", path.display(), charset);
        let file = open_or_fail(
            || create_file(path),
            || format!("OutputStream for {}", path.display()),
        )?;
        with_owned(
            BufWriter::new(file),
            |out| self.format_stream_with_charset(value, out, charset),
            release_writer,
        )
    }

    /// Write `value` as UTF-8 to a real or in-memory path.
    fn format_path(&self, value: &T, path: &dyn VirtualPath) -> Result<(), Error> {
        self.format_path_with_charset(value, path, Charset::utf_8())
    }

    /// Write `value` to a real or in-memory path, encoded in `charset`.
    fn format_path_with_charset(
        &self,
        value: &T,
        path: &dyn VirtualPath,
        charset: Charset,
    ) -> Result<(), Error> {
        if let Some(local) = path.local_path() {
            return self.format_file_with_charset(value, local, charset);
        }
        charset.ensure_writable()?;
        let out = path.open_write()?;
        with_owned(
            out,
            |out| self.format_stream_with_charset(value, out, charset),
            release_writer,
        )
    }

    /// Write to a writer produced by `factory`, flushing and closing it
    /// afterwards. A factory yielding `None` is a `MissingResource` error.
    fn format_writer_from<W, F>(&self, value: &T, factory: F) -> Result<(), Error>
    where
        W: Write,
        F: FnOnce() -> io::Result<Option<W>>,
        Self: Sized,
    {
        let writer = open_or_fail(factory, || "Writer".to_string())?;
        with_owned(
            writer,
            |writer| self.format_writer(value, writer),
            release_writer,
        )
    }

    /// Write to a byte stream produced by `factory`, encoded in `charset`.
    fn format_stream_from<W, F>(&self, value: &T, factory: F, charset: Charset) -> Result<(), Error>
    where
        W: Write,
        F: FnOnce() -> io::Result<Option<W>>,
        Self: Sized,
    {
        charset.ensure_writable()?;
        let stream = open_or_fail(factory, || "OutputStream".to_string())?;
        with_owned(
            stream,
            |stream| self.format_stream_with_charset(value, stream, charset),
            release_writer,
        )
    }

    /// A formatter for `V` that converts with `f` before formatting.
    fn compose<V, F>(self, f: F) -> Compose<Self, V, T>
    where
        Self: Sized,
        T: Sized,
        V: ?Sized,
        F: Fn(&V) -> T + Send + Sync + 'static,
    {
        Compose {
            formatter: self,
            transform: Box::new(move |value| Some(f(value))),
        }
    }

    /// Like [`compose`](Self::compose), but `None` fails with
    /// `InvalidArgument` before any output is opened.
    fn compose_some<V, F>(self, f: F) -> Compose<Self, V, T>
    where
        Self: Sized,
        T: Sized,
        V: ?Sized,
        F: Fn(&V) -> Option<T> + Send + Sync + 'static,
    {
        Compose {
            formatter: self,
            transform: Box::new(f),
        }
    }
}

/// Formatter adapter created by [`Formatter::compose`].
///
/// The conversion runs before the wrapped formatter's entry point, so a
/// failed conversion never creates or truncates a file.
pub struct Compose<Fm, V: ?Sized, T> {
    formatter: Fm,
    transform: Box<dyn Fn(&V) -> Option<T> + Send + Sync>,
}

impl<Fm, V: ?Sized, T> Compose<Fm, V, T> {
    fn prepare(&self, value: &V) -> Result<T, Error> {
        (self.transform)(value)
            .ok_or_else(|| Error::invalid_argument("value", "nothing to format"))
    }
}

impl<Fm, V, T> Formatter<V> for Compose<Fm, V, T>
where
    Fm: Formatter<T>,
    V: ?Sized,
{
    fn format_writer(&self, value: &V, writer: &mut dyn Write) -> Result<(), Error> {
        let value = self.prepare(value)?;
        self.formatter.format_writer(&value, writer)
    }

    fn format_stream_with_charset(
        &self,
        value: &V,
        stream: &mut dyn Write,
        charset: Charset,
    ) -> Result<(), Error> {
        let value = self.prepare(value)?;
        self.formatter
            .format_stream_with_charset(&value, stream, charset)
    }

    fn format_to_string(&self, value: &V) -> Result<String, Error> {
        let value = self.prepare(value)?;
        self.formatter.format_to_string(&value)
    }

    fn format_file_with_charset(&self, value: &V, path: &Path, charset: Charset) -> Result<(), Error> {
        let value = self.prepare(value)?;
        self.formatter
            .format_file_with_charset(&value, path, charset)
    }

    fn format_path_with_charset(
        &self,
        value: &V,
        path: &dyn VirtualPath,
        charset: Charset,
    ) -> Result<(), Error> {
        let value = self.prepare(value)?;
        self.formatter
            .format_path_with_charset(&value, path, charset)
    }

    fn format_writer_from<W, F>(&self, value: &V, factory: F) -> Result<(), Error>
    where
        W: Write,
        F: FnOnce() -> io::Result<Option<W>>,
        Self: Sized,
    {
        let value = self.prepare(value)?;
        self.formatter.format_writer_from(&value, factory)
    }

    fn format_stream_from<W, F>(&self, value: &V, factory: F, charset: Charset) -> Result<(), Error>
    where
        W: Write,
        F: FnOnce() -> io::Result<Option<W>>,
        Self: Sized,
    {
        let value = self.prepare(value)?;
        self.formatter.format_stream_from(&value, factory, charset)
    }
}
