//! Integration tests running the same documents through every backend.
//!
//! Run:    cargo test --test backends

mod common;

use std::cell::Cell;
use std::fs;
use std::io::{self, Write};
use std::rc::Rc;
use std::thread;

use common::{
    event_formatter, event_parser, sax_parser, stream_formatter, stream_parser, Person, JOHN_DOE,
};
use mu_xmlio::{
    Error, Formatter, Parser, StaxEventFormatter, StaxStreamFormatter, XmlEvent, XmlEventWriter,
    XmlOptions, XmlStreamWriter,
};

type AnyParser = Box<dyn Parser<Person> + Send + Sync>;
type AnyFormatter = Box<dyn Formatter<Person> + Send + Sync>;

fn parsers() -> Vec<(&'static str, AnyParser)> {
    vec![
        ("sax", Box::new(sax_parser()) as AnyParser),
        ("stax-stream", Box::new(stream_parser()) as AnyParser),
        ("stax-event", Box::new(event_parser()) as AnyParser),
    ]
}

fn formatters() -> Vec<(&'static str, AnyFormatter)> {
    vec![
        ("stax-stream", Box::new(stream_formatter()) as AnyFormatter),
        ("stax-event", Box::new(event_formatter()) as AnyFormatter),
    ]
}

// -- Parsing ------------------------------------------------------------------

#[test]
fn test_minimal_document_all_backends() {
    for (name, parser) in parsers() {
        assert_eq!(
            parser.parse_str(JOHN_DOE).unwrap(),
            Person::new("John", "Doe"),
            "backend {}",
            name
        );
    }
}

#[test]
fn test_prolog_and_whitespace_are_ignored() {
    let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
               <!-- contact -->\n\
               <person>\n  <firstName>John</firstName>\n  <lastName>Doe</lastName>\n</person>\n";
    for (name, parser) in parsers() {
        assert_eq!(
            parser.parse_str(xml).unwrap(),
            Person::new("John", "Doe"),
            "backend {}",
            name
        );
    }
}

#[test]
fn test_internal_entities_expand_under_hardening() {
    let xml = "<!DOCTYPE person [<!ENTITY given \"John\"><!ENTITY family \"D&#111;e\">]>\
               <person><firstName>&given;</firstName><lastName>&family;</lastName></person>";
    for (name, parser) in parsers() {
        assert_eq!(
            parser.parse_str(xml).unwrap(),
            Person::new("John", "Doe"),
            "backend {}",
            name
        );
    }
}

#[test]
fn test_entity_markup_expands_to_elements() {
    let xml = "<!DOCTYPE person [\
               <!ENTITY given \"<firstName>John</firstName>\">\
               <!ENTITY family \"<lastName>&#68;oe</lastName>\">]>\
               <person>&given;&family;</person>";
    for (name, parser) in parsers() {
        assert_eq!(
            parser.parse_str(xml).unwrap(),
            Person::new("John", "Doe"),
            "backend {}",
            name
        );
    }
}

#[test]
fn test_empty_input_is_truncated() {
    for (name, parser) in parsers() {
        let err = parser.parse_str("").unwrap_err();
        assert!(err.is_truncated(), "backend {}: {:?}", name, err);
        assert!(err.path().is_none());

        let mut empty: &[u8] = &[];
        assert!(parser.parse_stream(&mut empty).unwrap_err().is_truncated());
    }
}

#[test]
fn test_truncated_file_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut off.xml");
    fs::write(&path, "<person><firstName>John</firstName><lastName>Do").unwrap();
    for (name, parser) in parsers() {
        let err = parser.parse_file(&path).unwrap_err();
        assert!(err.is_truncated(), "backend {}: {:?}", name, err);
        assert_eq!(err.path(), Some(path.as_path()), "backend {}", name);
    }
}

#[test]
fn test_malformed_input_is_backend_error() {
    for (name, parser) in parsers() {
        for xml in [
            "<person><firstName>John</lastName></person>",
            "<person><firstName>John</firstName><lastName>Doe</firstName></person>",
            "<person>&undeclared;</person>",
        ] {
            let err = parser.parse_str(xml).unwrap_err();
            assert!(
                matches!(err, Error::Backend { .. }),
                "backend {} on {}: {:?}",
                name,
                xml,
                err
            );
        }
    }
}

#[test]
fn test_missing_field_is_build_error() {
    let err = sax_parser()
        .parse_str("<person><firstName>John</firstName></person>")
        .unwrap_err();
    match err {
        Error::Build(build) => assert!(build.message().contains("lastName")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_parsers_shared_across_threads() {
    let parsers = parsers();
    thread::scope(|scope| {
        for (name, parser) in &parsers {
            for i in 0..4 {
                let parser = parser.as_ref();
                scope.spawn(move || {
                    let xml = format!(
                        "<person><firstName>P{}</firstName><lastName>{}</lastName></person>",
                        i, name
                    );
                    assert_eq!(
                        parser.parse_str(&xml).unwrap(),
                        Person::new(&format!("P{}", i), name)
                    );
                });
            }
        }
    });
}

#[test]
fn test_ignore_xxe_keeps_plain_documents_working() {
    let parser = stream_parser().with_options(XmlOptions::new().with_ignore_xxe_protections(true));
    assert_eq!(
        parser.parse_str(JOHN_DOE).unwrap(),
        Person::new("John", "Doe")
    );
}

// -- Formatting ---------------------------------------------------------------

#[test]
fn test_format_then_parse_all_backends() {
    let person = Person::new("Ann & \"Bo\"", "<O'Neil>");
    for (fname, formatter) in formatters() {
        let xml = formatter.format_to_string(&person).unwrap();
        roxmltree::Document::parse(&xml).expect("formatter output is well-formed");
        for (pname, parser) in parsers() {
            assert_eq!(
                parser.parse_str(&xml).unwrap(),
                person,
                "{} -> {}",
                fname,
                pname
            );
        }
    }
}

#[test]
fn test_parse_then_format_is_identity() {
    for (_, formatter) in formatters() {
        let person = stream_parser().parse_str(JOHN_DOE).unwrap();
        assert_eq!(formatter.format_to_string(&person).unwrap(), JOHN_DOE);
    }
}

#[test]
fn test_indented_output() {
    let formatter = stream_formatter().with_options(XmlOptions::new().with_indent(2));
    let xml = formatter.format_to_string(&Person::new("John", "Doe")).unwrap();
    assert_eq!(
        xml,
        "<person>\n  <firstName>John</firstName>\n  <lastName>Doe</lastName>\n</person>"
    );
    assert_eq!(
        stream_parser().parse_str(&xml).unwrap(),
        Person::new("John", "Doe")
    );
}

/// Accepts writes, fails every flush.
struct FailingFlush(Vec<u8>);

impl Write for FailingFlush {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

#[test]
fn test_finalize_failure_is_surfaced() {
    for (name, formatter) in formatters() {
        let mut out = FailingFlush(Vec::new());
        let err = formatter
            .format_writer(&Person::new("John", "Doe"), &mut out)
            .unwrap_err();
        assert!(
            matches!(err, Error::Backend { ref message, .. } if message.contains("disk full")),
            "backend {}: {:?}",
            name,
            err
        );
    }
}

/// Fails every flush and counts how often it was dropped.
struct BrokenSink(Rc<Cell<usize>>);

impl Write for BrokenSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

impl Drop for BrokenSink {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

fn assert_handler_error_wins<F: Formatter<Person>>(name: &str, formatter: F) {
    let closes = Rc::new(Cell::new(0));
    let sink = BrokenSink(closes.clone());
    let err = formatter
        .format_writer_from(&Person::default(), move || Ok(Some(sink)))
        .unwrap_err();
    assert!(
        matches!(err, Error::Backend { ref message, .. } if message.contains("gave up")),
        "backend {}: {:?}",
        name,
        err
    );
    assert_eq!(closes.get(), 1, "backend {}", name);
}

#[test]
fn test_handler_error_wins_over_close_failure() {
    assert_handler_error_wins(
        "stax-stream",
        StaxStreamFormatter::new(|_: &Person, w: &mut XmlStreamWriter<'_>| {
            w.write_start_element("person")?;
            Err(Error::backend("gave up"))
        }),
    );
    assert_handler_error_wins(
        "stax-event",
        StaxEventFormatter::new(|_: &Person, w: &mut XmlEventWriter<'_>| {
            w.add(&XmlEvent::start_element("person"))?;
            Err(Error::backend("gave up"))
        }),
    );
}
