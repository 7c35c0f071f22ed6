//! System identifiers for XML input.
//!
//! Files are identified by `file:` URIs (ASCII-escaped) so that engine
//! diagnostics can name their origin. The inverse mapping is only used when a
//! path has to be reconstructed from an error location.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file:";

/// Build an absolute, percent-escaped `file:` URI for `path`.
pub fn from_path(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let raw = absolute.to_string_lossy().replace('\\', "/");

    let mut uri = String::with_capacity(raw.len() + 8);
    uri.push_str("file://");
    if !raw.starts_with('/') {
        uri.push('/');
    }
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~/:".contains(&byte) {
            uri.push(byte as char);
        } else {
            let _ = write!(uri, "%{:02X}", byte);
        }
    }
    uri
}

/// Recover a filesystem path from a `file:/` system identifier.
///
/// Returns `None` for any other scheme or for undecodable escapes.
pub fn to_path(system_id: &str) -> Option<PathBuf> {
    let rest = system_id.strip_prefix(FILE_SCHEME)?;
    if !rest.starts_with('/') {
        return None;
    }
    let rest = match rest.strip_prefix("//") {
        Some(after) if after.starts_with('/') => after,
        Some(after) => after.strip_prefix("localhost").filter(|p| p.starts_with('/'))?,
        None => rest,
    };
    let decoded = percent_decode(rest)?;
    Some(PathBuf::from(platform_path(decoded)))
}

#[cfg(windows)]
fn platform_path(decoded: String) -> String {
    let bytes = decoded.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
        decoded[1..].replace('/', "\\")
    } else {
        decoded
    }
}

#[cfg(not(windows))]
fn platform_path(decoded: String) -> String {
    decoded
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// True if `id` starts with a URI scheme such as `http:` or `file:`.
pub fn has_scheme(id: &str) -> bool {
    match id.find(':') {
        // Single letters are Windows drive letters, not schemes.
        Some(pos) if pos > 1 => {
            let scheme = &id[..pos];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Resolve a possibly relative system identifier against the document's own.
pub fn resolve(base: Option<&str>, system_id: &str) -> String {
    if has_scheme(system_id) {
        return system_id.to_string();
    }
    match base {
        Some(base) if has_scheme(base) => {
            if system_id.starts_with('/') {
                let scheme_end = base.find(':').map_or(0, |p| p + 1);
                format!("{}//{}", &base[..scheme_end], system_id)
            } else {
                let dir_end = base.rfind('/').map_or(base.len(), |p| p + 1);
                format!("{}{}", &base[..dir_end], system_id)
            }
        }
        _ => system_id.to_string(),
    }
}
