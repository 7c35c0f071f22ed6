//! Paths that may live outside the real filesystem.
//!
//! `Parser::parse_path` and `Formatter::format_path` accept any
//! [`VirtualPath`]. Real paths are routed through the file entry points (with
//! source/target validation); other paths are opened directly.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// A path on the real filesystem or on an in-memory one.
pub trait VirtualPath {
    /// Nominal path, used in diagnostics.
    fn path(&self) -> &Path;

    /// The real filesystem path, if this path lives there.
    fn local_path(&self) -> Option<&Path>;

    /// Open the content for reading.
    fn open_read(&self) -> io::Result<Box<dyn Read + '_>>;

    /// Open the content for writing, replacing what was there.
    fn open_write(&self) -> io::Result<Box<dyn Write + '_>>;
}

impl VirtualPath for Path {
    fn path(&self) -> &Path {
        self
    }

    fn local_path(&self) -> Option<&Path> {
        Some(self)
    }

    fn open_read(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(self)?))
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + '_>> {
        Ok(Box::new(File::create(self)?))
    }
}

impl VirtualPath for PathBuf {
    fn path(&self) -> &Path {
        self
    }

    fn local_path(&self) -> Option<&Path> {
        Some(self)
    }

    fn open_read(&self) -> io::Result<Box<dyn Read + '_>> {
        self.as_path().open_read()
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + '_>> {
        self.as_path().open_write()
    }
}

/// A shared in-memory filesystem.
///
/// Cloning yields another handle to the same files.
#[derive(Clone, Debug, Default)]
pub struct MemoryFs {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryFs {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// A path inside this filesystem.
    pub fn path(&self, path: impl Into<PathBuf>) -> MemoryPath {
        MemoryPath {
            fs: self.clone(),
            path: path.into(),
        }
    }

    /// Store `bytes` at `path`.
    pub fn write(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(path.into(), bytes.into());
    }

    /// Current content of `path`.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().get(path.as_ref()).cloned()
    }

    /// Whether `path` holds a file.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lock().contains_key(path.as_ref())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A path inside a [`MemoryFs`].
#[derive(Clone, Debug)]
pub struct MemoryPath {
    fs: MemoryFs,
    path: PathBuf,
}

impl VirtualPath for MemoryPath {
    fn path(&self) -> &Path {
        &self.path
    }

    fn local_path(&self) -> Option<&Path> {
        None
    }

    fn open_read(&self) -> io::Result<Box<dyn Read + '_>> {
        match self.fs.read(&self.path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no in-memory file at {}", self.path.display()),
            )),
        }
    }

    fn open_write(&self) -> io::Result<Box<dyn Write + '_>> {
        Ok(Box::new(MemoryWriter {
            fs: &self.fs,
            path: &self.path,
            buf: Vec::new(),
        }))
    }
}

/// Buffers writes and publishes them on flush and on drop.
struct MemoryWriter<'a> {
    fs: &'a MemoryFs,
    path: &'a Path,
    buf: Vec<u8>,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.fs.write(self.path, self.buf.clone());
        Ok(())
    }
}

impl Drop for MemoryWriter<'_> {
    fn drop(&mut self) {
        self.fs.write(self.path, std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_path_round_trip() {
        let fs = MemoryFs::new();
        let path = fs.path("/docs/a.xml");
        assert!(path.local_path().is_none());
        assert!(path.open_read().is_err());

        {
            let mut out = path.open_write().unwrap();
            out.write_all(b"<a/>").unwrap();
        }
        assert!(fs.exists("/docs/a.xml"));

        let mut text = String::new();
        path.open_read().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "<a/>");
    }

    #[test]
    fn test_real_path_is_local() {
        let path = Path::new("/tmp/whatever.xml");
        assert_eq!(path.local_path(), Some(path));
    }
}
