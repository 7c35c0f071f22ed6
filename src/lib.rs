//! mu-xmlio -- Resource-safe XML parsing and formatting
//!
//! Parser and formatter contracts with push (SAX style) and pull (StAX style)
//! backends over quick-xml. Every entry point derives from two primitives per
//! backend, so resource handling, error translation and XXE hardening behave
//! the same whichever way input arrives.
//!
//! # Features
//!
//! - `async` -- tokio based file helpers in [`async_api`]
//! - `cli` -- the `mu-xmlio` command line tool
//!
//! # Resource ownership
//!
//! Readers, writers and streams passed in directly are borrowed and never
//! closed. Files, anchored resources and factory results are opened by the
//! operation and closed exactly once, whether it succeeds or fails.
//!
//! # XXE
//!
//! The engine defaults resolve DTDs and external entities. Backends disable
//! that before every parse unless [`XmlOptions::with_ignore_xxe_protections`]
//! opts out.
//!
//! ```
//! use mu_xmlio::{Parser, StaxStreamParser};
//!
//! let first_name = StaxStreamParser::new(|reader| {
//!     reader.next_tag()?;
//!     reader.next_tag()?;
//!     Ok(reader.element_text()?)
//! });
//! let name = first_name
//!     .parse_str("<person><firstName>John</firstName></person>")
//!     .unwrap();
//! assert_eq!(name, "John");
//! ```

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod charset;
pub mod config;
pub mod error;
pub mod formatter;
pub mod parser;
pub mod resource;
pub mod sax;
pub mod stax;
pub mod system_id;
pub mod translate;
pub mod vfs;
pub mod xml;
pub mod xxe;

#[cfg(feature = "async")]
pub mod async_api;

// Re-export key types for convenience
#[cfg(feature = "async")]
pub use async_api::{format_file_async, parse_file_async, parse_file_async_with_charset};
pub use charset::Charset;
pub use config::XmlOptions;
pub use error::{BuildError, Error};
pub use formatter::{Compose, Formatter};
pub use parser::{AndThen, Parser};
pub use resource::{DirAnchor, EmbeddedAnchor, ResourceAnchor};
pub use sax::SaxParser;
pub use stax::{StaxEventFormatter, StaxEventParser, StaxStreamFormatter, StaxStreamParser};
pub use translate::{translate, translate_sax};
pub use vfs::{MemoryFs, MemoryPath, VirtualPath};
pub use xml::{
    ContentHandler, EngineError, EngineErrorKind, EventType, Feature, FeatureConfigurable, XmlEvent,
    XmlEventReader, XmlEventWriter, XmlStreamReader, XmlStreamWriter,
};
pub use xxe::harden;
