//! Unified error types for mu-xmlio
//!
//! Every `Parser`/`Formatter` entry point fails with [`Error`]. Engine-level
//! failures (`crate::xml::EngineError`) never reach callers directly: they are
//! translated at the backend boundary, see [`crate::translate`].

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Boxed underlying cause kept for diagnostics.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Top-level error type for parse and format operations
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required argument was absent or unusable; raised before any I/O.
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// A resource factory or lookup produced no resource.
    MissingResource {
        /// What was expected, e.g. `"Reader"` or a resource name and anchor.
        expected: String,
    },
    /// Source path does not exist.
    NotFound {
        /// The path that was checked.
        path: PathBuf,
    },
    /// Path exists but is not a regular file.
    AccessDenied {
        /// The path that was checked.
        path: PathBuf,
    },
    /// Input ended before a well-formed document was complete.
    Truncated {
        /// Originating file, when it could be derived from the error location.
        path: Option<PathBuf>,
        /// Engine diagnostic.
        message: String,
    },
    /// Any other parser or writer failure.
    Backend {
        /// Human-readable description.
        message: String,
        /// Original failure, if there was one.
        cause: Option<Cause>,
    },
    /// The push backend's result hook could not build a value.
    Build(BuildError),
    /// Plain I/O failure while opening, reading, writing or closing a resource.
    Io(io::Error),
}

impl Error {
    /// Reject an argument before any I/O is attempted.
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// A factory or lookup returned nothing.
    pub fn missing_resource(expected: impl Into<String>) -> Self {
        Error::MissingResource {
            expected: expected.into(),
        }
    }

    /// Backend failure without an underlying cause.
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
            cause: None,
        }
    }

    /// Backend failure wrapping its original cause.
    pub fn backend_with<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: Into<Cause>,
    {
        Error::Backend {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub(crate) fn not_found(path: &Path) -> Self {
        Error::NotFound {
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn access_denied(path: &Path) -> Self {
        Error::AccessDenied {
            path: path.to_path_buf(),
        }
    }

    /// The path carried by filesystem and truncation errors.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::NotFound { path } | Error::AccessDenied { path } => Some(path),
            Error::Truncated { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// True for premature end of input.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Error::Truncated { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { name, reason } => {
                write!(f, "Invalid argument `{}`: {}", name, reason)
            }
            Error::MissingResource { expected } => write!(f, "Missing resource: {}", expected),
            Error::NotFound { path } => write!(f, "Not found: {}", path.display()),
            Error::AccessDenied { path } => {
                write!(f, "Access denied (not a regular file): {}", path.display())
            }
            Error::Truncated {
                path: Some(path),
                message,
            } => write!(
                f,
                "Unexpected end of input in {}: {}",
                path.display(),
                message
            ),
            Error::Truncated {
                path: None,
                message,
            } => write!(f, "Unexpected end of input: {}", message),
            Error::Backend { message, .. } => write!(f, "XML backend error: {}", message),
            Error::Build(err) => write!(f, "Build error: {}", err),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Backend {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            Error::Build(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Error::Build(err)
    }
}

/// Failure to materialize a result from accumulated handler state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    message: String,
}

impl BuildError {
    /// Create a build error with a free-form message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// A required field was never seen by the handler.
    pub fn missing(field: &str) -> Self {
        Self::new(format!("required field `{}` is missing", field))
    }

    /// Description of what could not be built.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for BuildError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display_names_argument() {
        let err = Error::invalid_argument("encoding", "unknown label `latin-9000`");
        assert_eq!(
            err.to_string(),
            "Invalid argument `encoding`: unknown label `latin-9000`"
        );
    }

    #[test]
    fn test_truncated_display_with_and_without_path() {
        let with_path = Error::Truncated {
            path: Some(PathBuf::from("/tmp/a.xml")),
            message: "Unexpected end of file".into(),
        };
        assert!(with_path.to_string().contains("/tmp/a.xml"));
        assert_eq!(with_path.path(), Some(Path::new("/tmp/a.xml")));

        let without = Error::Truncated {
            path: None,
            message: "Unexpected end of file".into(),
        };
        assert_eq!(
            without.to_string(),
            "Unexpected end of input: Unexpected end of file"
        );
        assert!(without.path().is_none());
    }

    #[test]
    fn test_backend_keeps_cause() {
        let cause = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let err = Error::backend_with("write failed", cause);
        let source = err.source().expect("cause");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn test_build_error_missing_field() {
        let err: Error = BuildError::missing("firstName").into();
        assert_eq!(
            err.to_string(),
            "Build error: required field `firstName` is missing"
        );
    }
}
