//! Optional async helpers for file input and output.
//!
//! This module is available with the `async` feature. Files are read and
//! written with `tokio::fs`; parsing and formatting run on the caller's task
//! over the in-memory bytes.

use std::io;
use std::path::Path;

use crate::charset::Charset;
use crate::error::Error;
use crate::formatter::Formatter;
use crate::parser::Parser;
use crate::system_id;

/// Read a UTF-8 file asynchronously and parse it with `parser`.
pub async fn parse_file_async<T, P>(parser: &P, path: impl AsRef<Path>) -> Result<T, Error>
where
    P: Parser<T> + ?Sized,
{
    parse_file_async_with_charset(parser, path, Charset::utf_8()).await
}

/// Read a file encoded in `charset` asynchronously and parse it.
///
/// Missing files are `NotFound`, directories `AccessDenied`. The file's
/// `file:` URI is the document's system identifier.
pub async fn parse_file_async_with_charset<T, P>(
    parser: &P,
    path: impl AsRef<Path>,
    charset: Charset,
) -> Result<T, Error>
where
    P: Parser<T> + ?Sized,
{
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::invalid_argument("path", "path is empty"));
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(Error::access_denied(path)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(Error::not_found(path)),
        Err(err) => return Err(Error::Io(err)),
    }
    let bytes = tokio::fs::read(path).await?;
    let system_id = system_id::from_path(path);
    parser.parse_stream_with_id(&mut bytes.as_slice(), charset, Some(&system_id))
}

/// Format `value` and write it to `path` asynchronously as UTF-8.
///
/// Nothing is written when formatting fails.
pub async fn format_file_async<T, F>(
    formatter: &F,
    value: &T,
    path: impl AsRef<Path>,
) -> Result<(), Error>
where
    T: ?Sized,
    F: Formatter<T> + ?Sized,
{
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(Error::invalid_argument("path", "path is empty"));
    }
    if let Ok(meta) = tokio::fs::metadata(path).await {
        if !meta.is_file() {
            return Err(Error::access_denied(path));
        }
    }
    let mut out = Vec::new();
    formatter.format_stream(value, &mut out)?;
    tokio::fs::write(path, out).await?;
    Ok(())
}
