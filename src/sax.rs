//! Parser backend driven by the push engine.
//!
//! A [`SaxParser`] pairs a handler with a result hook. Each parse:
//!
//! 1. creates a fresh [`SaxEngine`] and hardens it against XXE (unless the
//!    options opt out);
//! 2. obtains a handler, either a new one per call or a single shared one;
//! 3. detects which optional roles the handler plays;
//! 4. runs the `before` hook, pushes the document through the handler, then
//!    runs the `after` hook to build the result.
//!
//! Engine failures are translated (see [`crate::translate`]); a failing
//! `after` hook surfaces as [`Error::Build`].

use std::fmt;
use std::io::{BufRead, Read};
use std::sync::Mutex;

use crate::charset::{self, Charset};
use crate::config::XmlOptions;
use crate::error::{BuildError, Error};
use crate::parser::Parser;
use crate::translate::translate_sax;
use crate::xml::{ContentHandler, HandlerRoles, InputSource, SaxEngine, SaxEngineFactory};
use crate::xxe;

type Supplier<H> = Box<dyn Fn() -> H + Send + Sync>;
type BeforeHook<H> = Box<dyn Fn(&mut H) + Send + Sync>;
type AfterHook<H, T> = Box<dyn Fn(&mut H) -> Result<T, BuildError> + Send + Sync>;

enum HandlerSource<H> {
    PerCall(Supplier<H>),
    Shared(Mutex<H>),
}

/// Push-engine backed [`Parser`].
pub struct SaxParser<T, H> {
    factory: SaxEngineFactory,
    handlers: HandlerSource<H>,
    before: Option<BeforeHook<H>>,
    after: AfterHook<H, T>,
    options: XmlOptions,
}

impl<T, H> SaxParser<T, H>
where
    H: ContentHandler,
{
    /// Build a fresh handler with `supplier` for every parse.
    pub fn per_call<S, A>(supplier: S, after: A) -> Self
    where
        S: Fn() -> H + Send + Sync + 'static,
        A: Fn(&mut H) -> Result<T, BuildError> + Send + Sync + 'static,
    {
        Self::with_source(HandlerSource::PerCall(Box::new(supplier)), Box::new(after))
    }

    /// Reuse one handler for every parse.
    ///
    /// Parses are serialized on the handler. Use a `before` hook to reset
    /// state left over from the previous document.
    pub fn shared<A>(handler: H, after: A) -> Self
    where
        A: Fn(&mut H) -> Result<T, BuildError> + Send + Sync + 'static,
    {
        Self::with_source(HandlerSource::Shared(Mutex::new(handler)), Box::new(after))
    }

    fn with_source(handlers: HandlerSource<H>, after: AfterHook<H, T>) -> Self {
        Self {
            factory: SaxEngineFactory::new(),
            handlers,
            before: None,
            after,
            options: XmlOptions::default(),
        }
    }

    /// Run `before` on the handler ahead of every parse.
    pub fn with_before<B>(mut self, before: B) -> Self
    where
        B: Fn(&mut H) + Send + Sync + 'static,
    {
        self.before = Some(Box::new(before));
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: XmlOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the engine factory, e.g. to install an entity loader.
    pub fn with_factory(mut self, factory: SaxEngineFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Options in effect.
    pub fn options(&self) -> &XmlOptions {
        &self.options
    }

    fn run(&self, input: InputSource<'_>) -> Result<T, Error> {
        let mut engine = self.factory.new_engine();
        xxe::apply(&mut engine, &self.options);
        match &self.handlers {
            HandlerSource::PerCall(supplier) => {
                let mut handler = supplier();
                self.run_with(&mut engine, &mut handler, input)
            }
            HandlerSource::Shared(shared) => {
                let mut handler = shared
                    .lock()
                    .map_err(|_| Error::backend("shared handler is poisoned by an earlier panic"))?;
                self.run_with(&mut engine, &mut *handler, input)
            }
        }
    }

    fn run_with(
        &self,
        engine: &mut SaxEngine,
        handler: &mut H,
        input: InputSource<'_>,
    ) -> Result<T, Error> {
        let roles = HandlerRoles::detect(handler);
        log::trace!("push parse with handler roles {:?}", roles);
        if let Some(before) = &self.before {
            before(handler);
        }
        engine.parse(input, handler, roles).map_err(translate_sax)?;
        (self.after)(handler).map_err(Error::Build)
    }
}

impl<T, H> Parser<T> for SaxParser<T, H>
where
    H: ContentHandler,
{
    fn parse_reader_with_id(
        &self,
        reader: &mut dyn BufRead,
        system_id: Option<&str>,
    ) -> Result<T, Error> {
        self.run(InputSource::new(Box::new(reader)).with_system_id(system_id))
    }

    fn parse_stream_with_id(
        &self,
        stream: &mut dyn Read,
        charset: Charset,
        system_id: Option<&str>,
    ) -> Result<T, Error> {
        let decoded = charset::decode_stream(stream, charset)?;
        self.run(InputSource::new(decoded).with_system_id(system_id))
    }
}

impl<T, H> fmt::Debug for SaxParser<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = match self.handlers {
            HandlerSource::PerCall(_) => "per-call",
            HandlerSource::Shared(_) => "shared",
        };
        f.debug_struct("SaxParser")
            .field("handlers", &handlers)
            .field("before", &self.before.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{Attribute, SaxError};

    #[derive(Default)]
    struct Counter {
        elements: usize,
    }

    impl ContentHandler for Counter {
        fn start_element(&mut self, _: &str, _: &[Attribute]) -> Result<(), SaxError> {
            self.elements += 1;
            Ok(())
        }
    }

    #[test]
    fn test_per_call_handler_starts_fresh() {
        let parser = SaxParser::per_call(Counter::default, |h: &mut Counter| Ok(h.elements));
        assert_eq!(parser.parse_str("<a><b/><c/></a>").unwrap(), 3);
        assert_eq!(parser.parse_str("<a/>").unwrap(), 1);
    }

    #[test]
    fn test_shared_handler_needs_reset() {
        let accumulating = SaxParser::shared(Counter::default(), |h: &mut Counter| Ok(h.elements));
        assert_eq!(accumulating.parse_str("<a/>").unwrap(), 1);
        assert_eq!(accumulating.parse_str("<a/>").unwrap(), 2);

        let reset = SaxParser::shared(Counter::default(), |h: &mut Counter| Ok(h.elements))
            .with_before(|h| h.elements = 0);
        assert_eq!(reset.parse_str("<a/>").unwrap(), 1);
        assert_eq!(reset.parse_str("<a/>").unwrap(), 1);
    }

    #[test]
    fn test_after_hook_failure_is_build_error() {
        let parser = SaxParser::per_call(Counter::default, |h: &mut Counter| {
            if h.elements > 1 {
                Ok(h.elements)
            } else {
                Err(BuildError::missing("child"))
            }
        });
        assert!(matches!(parser.parse_str("<a/>"), Err(Error::Build(_))));
    }

    #[test]
    fn test_malformed_input_is_backend_error() {
        let parser = SaxParser::per_call(Counter::default, |h: &mut Counter| Ok(h.elements));
        assert!(matches!(
            parser.parse_str("<a><b></a>"),
            Err(Error::Backend { .. })
        ));
        assert!(parser.parse_str("<a>").unwrap_err().is_truncated());
    }
}
