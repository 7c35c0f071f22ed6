//! Opening, validating and releasing resources.
//!
//! Two ownership modes run through the whole crate:
//!
//! - a resource produced by a *factory* belongs to the operation and is
//!   released exactly once when the operation returns, fails or unwinds
//!   ([`with_owned`]);
//! - a resource passed in *directly* (`&mut dyn Read`, `&mut dyn Write`) is
//!   borrowed and never released by the operation.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Invoke a resource factory, refusing an absent resource.
///
/// `expected` describes what the factory should have produced and is only
/// evaluated on failure.
pub fn open_or_fail<R, F, D>(factory: F, expected: D) -> Result<R, Error>
where
    F: FnOnce() -> io::Result<Option<R>>,
    D: FnOnce() -> String,
{
    match factory()? {
        Some(resource) => Ok(resource),
        None => Err(Error::missing_resource(expected())),
    }
}

/// Validate a path that is about to be read.
///
/// Fails with `NotFound` if nothing exists there and with `AccessDenied` if
/// it is not a regular file. Only metadata is inspected.
pub fn check_source(path: &Path) -> Result<&Path, Error> {
    ensure_named(path)?;
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(path),
        Ok(_) => Err(Error::access_denied(path)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::not_found(path)),
        Err(err) => Err(Error::Io(err)),
    }
}

/// Validate a path that is about to be written; absence is fine.
pub fn check_target(path: &Path) -> Result<&Path, Error> {
    ensure_named(path)?;
    match fs::metadata(path) {
        Ok(meta) if !meta.is_file() => Err(Error::access_denied(path)),
        Ok(_) => Ok(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(path),
        Err(err) => Err(Error::Io(err)),
    }
}

fn ensure_named(path: &Path) -> Result<(), Error> {
    if path.as_os_str().is_empty() {
        return Err(Error::invalid_argument("path", "path is empty"));
    }
    Ok(())
}

/// Run `body` against an operation-owned resource, then release it.
///
/// `release` is called exactly once on every exit path. A release failure is
/// reported only when `body` succeeded; while already failing it is logged
/// and the primary error is kept.
pub fn with_owned<R, T, B, C>(mut resource: R, body: B, release: C) -> Result<T, Error>
where
    B: FnOnce(&mut R) -> Result<T, Error>,
    C: FnOnce(R) -> io::Result<()>,
{
    let result = body(&mut resource);
    let released = release(resource);
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(Error::Io(err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            log::debug!("ignoring release failure after error: {}", close_err);
            Err(err)
        }
    }
}

/// Release an owned reader; dropping it closes the handle.
pub fn release_reader<R>(reader: R) -> io::Result<()> {
    drop(reader);
    Ok(())
}

/// Release an owned writer, surfacing any failure to flush buffered output.
pub fn release_writer<W: Write>(mut writer: W) -> io::Result<()> {
    let flushed = writer.flush();
    drop(writer);
    flushed
}

pub(crate) fn open_file(path: &Path) -> io::Result<Option<File>> {
    File::open(path).map(Some)
}

pub(crate) fn create_file(path: &Path) -> io::Result<Option<File>> {
    File::create(path).map(Some)
}

/// Classpath-style lookup of named resources relative to an anchor.
pub trait ResourceAnchor {
    /// Name used in diagnostics.
    fn anchor_name(&self) -> &str;

    /// Open `name`, or `Ok(None)` if the anchor has no such resource.
    fn open_resource(&self, name: &str) -> io::Result<Option<Box<dyn Read + '_>>>;
}

/// Resources stored as files below a root directory.
#[derive(Clone, Debug)]
pub struct DirAnchor {
    root: PathBuf,
    name: String,
}

impl DirAnchor {
    /// Anchor resources at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self { root, name }
    }

    /// Anchor resources at `root` under an explicit diagnostic name.
    pub fn named(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }
}

impl ResourceAnchor for DirAnchor {
    fn anchor_name(&self) -> &str {
        &self.name
    }

    fn open_resource(&self, name: &str) -> io::Result<Option<Box<dyn Read + '_>>> {
        let relative = name.trim_start_matches('/');
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Ok(None);
        }
        let file = match File::open(self.root.join(relative)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if !file.metadata()?.is_file() {
            return Ok(None);
        }
        Ok(Some(Box::new(file)))
    }
}

/// Resources compiled into the binary, typically with `include_bytes!`.
#[derive(Clone, Default)]
pub struct EmbeddedAnchor {
    name: String,
    entries: HashMap<String, &'static [u8]>,
}

impl EmbeddedAnchor {
    /// Create an empty anchor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Register a resource under `name`.
    pub fn with(mut self, name: &str, bytes: &'static [u8]) -> Self {
        self.entries
            .insert(name.trim_start_matches('/').to_string(), bytes);
        self
    }
}

impl fmt::Debug for EmbeddedAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedAnchor")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ResourceAnchor for EmbeddedAnchor {
    fn anchor_name(&self) -> &str {
        &self.name
    }

    fn open_resource(&self, name: &str) -> io::Result<Option<Box<dyn Read + '_>>> {
        match self.entries.get(name.trim_start_matches('/')) {
            Some(bytes) => Ok(Some(Box::new(Cursor::new(*bytes)))),
            None => Ok(None),
        }
    }
}
