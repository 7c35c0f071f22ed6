//! Backend configuration.

/// Options shared by every parser and formatter backend.
///
/// Backends copy their options at construction and never mutate them while
/// parsing or formatting, so one configured backend can serve many calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XmlOptions {
    /// Skip the XXE hardening step and keep the engine's default entity
    /// handling, which resolves external DTDs and entities.
    ///
    /// Only for trusted input. Defaults to `false`.
    pub ignore_xxe_protections: bool,
    /// Indentation width for formatter output; `None` writes compact XML.
    pub indent: Option<usize>,
}

impl Default for XmlOptions {
    fn default() -> Self {
        Self {
            ignore_xxe_protections: false,
            indent: None,
        }
    }
}

impl XmlOptions {
    /// Default options: XXE protections on, compact output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opt out of (or back into) XXE hardening.
    pub fn with_ignore_xxe_protections(mut self, ignore: bool) -> Self {
        self.ignore_xxe_protections = ignore;
        self
    }

    /// Indent formatter output by `width` spaces per level.
    pub fn with_indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }
}
