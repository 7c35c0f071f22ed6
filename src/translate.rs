//! Translation of engine failures into [`Error`].
//!
//! Premature end of input becomes [`Error::Truncated`], carrying the source
//! file when the failure location names a `file:` system identifier. Every
//! other engine failure becomes [`Error::Backend`] with the engine error kept
//! as its cause.

use crate::error::Error;
use crate::system_id;
use crate::xml::{mentions_end_of_input, EngineError, EngineErrorKind, SaxError};

/// Map an engine failure onto the crate taxonomy.
pub fn translate(err: EngineError) -> Error {
    if err.kind() == EngineErrorKind::UnexpectedEof || mentions_end_of_input(err.message()) {
        let path = err
            .location()
            .and_then(|location| location.system_id.as_deref())
            .and_then(system_id::to_path);
        return Error::Truncated {
            path,
            message: err.message().to_string(),
        };
    }
    Error::backend_with(err.message().to_string(), err)
}

/// Map a push-engine failure. Handler failures that already are [`Error`]s
/// pass through unchanged.
pub fn translate_sax(err: SaxError) -> Error {
    match err {
        SaxError::Parse(err) => translate(err),
        SaxError::Handler(cause) => match cause.downcast::<Error>() {
            Ok(err) => *err,
            Err(cause) => Error::Backend {
                message: format!("handler failed: {}", cause),
                cause: Some(cause),
            },
        },
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        translate(err)
    }
}

impl From<SaxError> for Error {
    fn from(err: SaxError) -> Self {
        translate_sax(err)
    }
}
