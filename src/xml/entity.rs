//! External entity loading and expansion limits.

use std::fs;
use std::io;

use super::EngineError;
use crate::system_id;

/// Maximum nesting of entity references inside entity replacement text.
pub const MAX_EXPANSION_DEPTH: usize = 16;

/// Maximum total bytes produced by entity expansion in one document.
pub const MAX_EXPANDED_BYTES: usize = 1 << 20;

/// Fetches the content of external DTDs and entities.
///
/// Only consulted when the engine's features allow external content. The
/// system id is already resolved against the document's own.
pub trait EntityLoader: Send + Sync {
    /// Load the bytes behind `system_id`.
    fn load(&self, system_id: &str) -> io::Result<Vec<u8>>;
}

/// Default loader: reads `file:` system identifiers from disk and refuses
/// every other scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileEntityLoader;

impl EntityLoader for FileEntityLoader {
    fn load(&self, system_id: &str) -> io::Result<Vec<u8>> {
        match system_id::to_path(system_id) {
            Some(path) => {
                log::debug!("loading external entity from {}", path.display());
                fs::read(path)
            }
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("not loading `{}`: only file: system identifiers are supported", system_id),
            )),
        }
    }
}

/// Caller-supplied hook asked for external content before the loader.
///
/// Returning `Ok(None)` falls through to the engine's [`EntityLoader`].
pub trait EntityResolver {
    /// Provide the bytes for an external entity or DTD.
    fn resolve_entity(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
    ) -> io::Result<Option<Vec<u8>>>;
}

/// Decode fetched external content and drop its text declaration.
pub(crate) fn decode_external(system_id: &str, bytes: Vec<u8>) -> Result<String, EngineError> {
    let text = String::from_utf8(bytes).map_err(|err| {
        EngineError::encoding(format!(
            "external entity `{}` is not valid UTF-8: {}",
            system_id, err
        ))
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    Ok(strip_text_decl(text).to_string())
}

fn strip_text_decl(text: &str) -> &str {
    if text.starts_with("<?xml") {
        if let Some(end) = text.find("?>") {
            return &text[end + 2..];
        }
    }
    text
}

/// Value of a character reference body such as `#38` or `#x26`.
pub(crate) fn char_ref(body: &str) -> Option<char> {
    let digits = body.strip_prefix('#')?;
    let code = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code).filter(|&c| c != '\0')
}

/// Replacement text of an internal entity as declared by `literal`.
///
/// Character references are included when the entity is declared; general
/// entity references are left for the point of use.
pub(crate) fn replacement_text(literal: &str) -> Result<String, String> {
    let mut out = String::with_capacity(literal.len());
    let mut rest = literal;
    while let Some(amp) = rest.find("&#") {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| "unterminated character reference in entity value".to_string())?;
        let c = char_ref(&after[..semi])
            .ok_or_else(|| format!("invalid character reference &{};", &after[..semi]))?;
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
