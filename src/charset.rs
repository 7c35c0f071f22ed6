//! Character encodings for byte-oriented entry points.
//!
//! The engine works on UTF-8 text. Byte streams in any other charset are
//! decoded up front (reads) or encoded after the cursor is closed (writes)
//! using `encoding_rs`. UTF-8 streams are passed through without copying.

use std::fmt;
use std::io::{BufRead, BufReader, Cursor, Read, Write};

use encoding_rs::Encoding;

use crate::error::Error;

/// WHATWG labels that name ISO-8859-1 rather than windows-1252.
const LATIN1_LABELS: &[&str] = &[
    "csisolatin1",
    "ibm819",
    "cp819",
    "iso-8859-1",
    "iso-ir-100",
    "iso8859-1",
    "iso88591",
    "iso_8859-1",
    "iso_8859-1:1987",
    "l1",
    "latin1",
];

const LATIN1: &str = "ISO-8859-1";

/// A character encoding bound to a byte stream
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    encoding: &'static Encoding,
    declared: &'static str,
}

impl Charset {
    /// UTF-8, the default for every entry point.
    pub fn utf_8() -> Self {
        Self::from_encoding(encoding_rs::UTF_8)
    }

    /// Look up a charset by its WHATWG label (`"utf-8"`, `"ISO-8859-1"`, ...).
    ///
    /// WHATWG maps the ISO-8859-1 labels to windows-1252. Those labels keep
    /// the name `ISO-8859-1` in XML declarations, and output in them is
    /// limited to U+0000..=U+00FF.
    pub fn for_label(label: &str) -> Result<Self, Error> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("encoding", "charset label is empty"));
        }
        let encoding = Encoding::for_label(trimmed.as_bytes()).ok_or_else(|| {
            Error::invalid_argument("encoding", format!("unknown charset label `{}`", trimmed))
        })?;
        let latin1 = encoding == encoding_rs::WINDOWS_1252
            && LATIN1_LABELS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(trimmed));
        Ok(Self {
            encoding,
            declared: if latin1 { LATIN1 } else { encoding.name() },
        })
    }

    /// Wrap an `encoding_rs` encoding.
    pub fn from_encoding(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            declared: encoding.name(),
        }
    }

    /// The underlying `encoding_rs` encoding.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Name written into XML declarations.
    pub fn name(&self) -> &'static str {
        self.declared
    }

    fn is_latin1(&self) -> bool {
        self.declared == LATIN1
    }

    /// True for UTF-8.
    pub fn is_utf_8(&self) -> bool {
        self.encoding == encoding_rs::UTF_8
    }

    /// Reject charsets that `encoding_rs` cannot produce (UTF-16, replacement).
    pub(crate) fn ensure_writable(&self) -> Result<(), Error> {
        if self.encoding.output_encoding() != self.encoding {
            return Err(Error::invalid_argument(
                "encoding",
                format!("charset {} cannot be used for output", self.name()),
            ));
        }
        Ok(())
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::utf_8()
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Present a byte stream in `charset` as UTF-8 text.
///
/// The returned reader borrows `stream`; dropping it never closes the stream.
pub fn decode_stream<'a>(
    stream: &'a mut dyn Read,
    charset: Charset,
) -> Result<Box<dyn BufRead + 'a>, Error> {
    if charset.is_utf_8() {
        return Ok(Box::new(BufReader::new(stream)));
    }
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    let (text, had_errors) = charset.encoding.decode_with_bom_removal(&bytes);
    if had_errors {
        return Err(Error::backend(format!(
            "malformed input for charset {}",
            charset.name()
        )));
    }
    Ok(Box::new(Cursor::new(text.into_owned().into_bytes())))
}

/// Encode UTF-8 text into `charset` and write it to `out`.
pub fn encode_into(text: &[u8], charset: Charset, out: &mut dyn Write) -> Result<(), Error> {
    if charset.is_utf_8() {
        out.write_all(text)?;
        return Ok(());
    }
    let text = std::str::from_utf8(text)
        .map_err(|err| Error::backend_with("writer produced invalid UTF-8", err))?;
    let (bytes, _, unmappable) = charset.encoding.encode(text);
    let outside_latin1 = charset.is_latin1() && text.chars().any(|c| u32::from(c) > 0xff);
    if unmappable || outside_latin1 {
        return Err(Error::backend(format!(
            "unmappable character for charset {}",
            charset.name()
        )));
    }
    out.write_all(&bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_utf8() {
        assert!(Charset::default().is_utf_8());
        assert_eq!(Charset::utf_8().name(), "UTF-8");
    }

    #[test]
    fn test_unknown_label_is_invalid_argument() {
        let err = Charset::for_label("latin-9000").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument {
                name: "encoding",
                ..
            }
        ));
        assert!(Charset::for_label("  ").is_err());
    }

    #[test]
    fn test_decode_latin1_stream() {
        let charset = Charset::for_label("ISO-8859-1").unwrap();
        let mut bytes: &[u8] = b"<a>caf\xe9</a>";
        let mut reader = decode_stream(&mut bytes, charset).unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "<a>café</a>");
    }

    #[test]
    fn test_encode_rejects_unmappable() {
        let charset = Charset::for_label("ISO-8859-1").unwrap();
        let mut out = Vec::new();
        let err = encode_into("snow ☃".as_bytes(), charset, &mut out).unwrap_err();
        assert!(err.to_string().contains("unmappable"));

        encode_into("café".as_bytes(), charset, &mut out).unwrap();
        assert_eq!(out, b"caf\xe9");
    }

    #[test]
    fn test_latin1_labels_keep_their_name() {
        assert_eq!(Charset::for_label("ISO-8859-1").unwrap().name(), "ISO-8859-1");
        assert_eq!(Charset::for_label("latin1").unwrap().name(), "ISO-8859-1");
        assert_eq!(
            Charset::for_label("windows-1252").unwrap().name(),
            "windows-1252"
        );

        let mut out = Vec::new();
        let latin1 = Charset::for_label("ISO-8859-1").unwrap();
        assert!(encode_into("5 €".as_bytes(), latin1, &mut out).is_err());
        let cp1252 = Charset::for_label("windows-1252").unwrap();
        encode_into("5 €".as_bytes(), cp1252, &mut out).unwrap();
        assert_eq!(out, b"5 \x80");
    }

    #[test]
    fn test_utf16_is_not_writable() {
        let charset = Charset::for_label("utf-16le").unwrap();
        assert!(charset.ensure_writable().is_err());
        assert!(Charset::utf_8().ensure_writable().is_ok());
    }
}
