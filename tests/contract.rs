//! Integration tests for the parser/formatter resource contract.
//!
//! Run:    cargo test --test contract

mod common;

use std::fs;
use std::io::{self, Cursor};

use common::{stream_formatter, stream_parser, Person, Tracked, JOHN_DOE};
use mu_xmlio::{
    Charset, DirAnchor, EmbeddedAnchor, Error, Formatter, MemoryFs, Parser, VirtualPath,
};

// -- Ownership ----------------------------------------------------------------

#[test]
fn test_factory_stream_closed_once_on_success() {
    let (stream, closes) = Tracked::new(JOHN_DOE);
    let person = stream_parser()
        .parse_stream_from(move || Ok(Some(stream)), Charset::utf_8())
        .unwrap();
    assert_eq!(person, Person::new("John", "Doe"));
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_factory_reader_closed_once_on_failure() {
    let (reader, closes) = Tracked::new("<person><firstName>");
    let err = stream_parser()
        .parse_reader_from(move || Ok(Some(reader)))
        .unwrap_err();
    assert!(err.is_truncated());
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_factory_writer_closed_once_on_success_and_failure() {
    let (writer, closes) = Tracked::new(Vec::new());
    stream_formatter()
        .format_writer_from(&Person::new("John", "Doe"), move || Ok(Some(writer)))
        .unwrap();
    assert_eq!(closes.get(), 1);

    let failing = mu_xmlio::StaxStreamFormatter::new(
        |_: &Person, w: &mut mu_xmlio::XmlStreamWriter<'_>| {
            w.write_start_element("person")?;
            Err(Error::backend("gave up halfway"))
        },
    );
    let (writer, closes) = Tracked::new(Vec::new());
    let err = failing
        .format_stream_from(&Person::default(), move || Ok(Some(writer)), Charset::utf_8())
        .unwrap_err();
    assert!(matches!(err, Error::Backend { .. }));
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_borrowed_resources_are_not_closed() {
    let (mut reader, closes) = Tracked::new(JOHN_DOE);
    stream_parser().parse_reader(&mut reader).unwrap();
    assert_eq!(closes.get(), 0);

    let (mut writer, closes) = Tracked::new(Vec::new());
    stream_formatter()
        .format_writer(&Person::new("John", "Doe"), &mut writer)
        .unwrap();
    assert_eq!(closes.get(), 0);
    drop(writer);
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_absent_factory_result_is_missing_resource() {
    let err = stream_parser()
        .parse_stream_from(|| Ok(None::<Cursor<Vec<u8>>>), Charset::utf_8())
        .unwrap_err();
    assert!(matches!(err, Error::MissingResource { ref expected } if expected == "InputStream"));

    let err = stream_formatter()
        .format_writer_from(&Person::default(), || Ok(None::<Vec<u8>>))
        .unwrap_err();
    assert!(matches!(err, Error::MissingResource { ref expected } if expected == "Writer"));
}

#[test]
fn test_factory_failure_propagates_as_io() {
    let err = stream_parser()
        .parse_reader_from(|| -> io::Result<Option<Cursor<Vec<u8>>>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        })
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

// -- Files and paths ----------------------------------------------------------

#[test]
fn test_missing_and_directory_paths() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.xml");

    let err = stream_parser().parse_file(&missing).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(err.path(), Some(missing.as_path()));

    let err = stream_parser().parse_file(dir.path()).unwrap_err();
    assert!(matches!(err, Error::AccessDenied { .. }));
    assert_eq!(err.path(), Some(dir.path()));

    let err = stream_formatter()
        .format_file(&Person::default(), dir.path())
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied { .. }));
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("person.xml");
    let person = Person::new("Zoë", "Ång & Co <ltd>");

    stream_formatter().format_file(&person, &path).unwrap();
    let written = fs::read_to_string(&path).unwrap();
    roxmltree::Document::parse(&written).expect("formatter output is well-formed");

    assert_eq!(stream_parser().parse_file(&path).unwrap(), person);
    assert_eq!(stream_parser().parse_path(&path).unwrap(), person);
}

#[test]
fn test_latin1_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latin1.xml");
    let latin1 = Charset::for_label("ISO-8859-1").unwrap();
    let person = Person::new("Zoë", "Müller");

    stream_formatter()
        .format_file_with_charset(&person, &path, latin1)
        .unwrap();
    let bytes = fs::read(&path).unwrap();
    assert!(bytes.windows(3).any(|w| w == b"Zo\xeb"));

    assert_eq!(
        stream_parser().parse_file_with_charset(&path, latin1).unwrap(),
        person
    );
}

#[test]
fn test_unwritable_charset_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("utf16.xml");
    let utf16 = Charset::for_label("utf-16le").unwrap();
    let err = stream_formatter()
        .format_file_with_charset(&Person::default(), &path, utf16)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert!(!path.exists());
}

#[test]
fn test_memory_fs_paths() {
    let fs = MemoryFs::new();
    let person = Person::new("John", "Doe");
    let path = fs.path("/people/john.xml");

    stream_formatter().format_path(&person, &path).unwrap();
    assert_eq!(fs.read("/people/john.xml").unwrap(), JOHN_DOE.as_bytes());
    assert_eq!(stream_parser().parse_path(&path).unwrap(), person);

    let missing = fs.path("/people/jane.xml");
    let err = stream_parser().parse_path(&missing).unwrap_err();
    assert!(matches!(err, Error::NotFound { ref path } if path == missing.path()));
}

// -- Resources ----------------------------------------------------------------

#[test]
fn test_dir_anchor_resources() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("people")).unwrap();
    fs::write(dir.path().join("people/john.xml"), JOHN_DOE).unwrap();
    let anchor = DirAnchor::named("fixtures", dir.path());

    let person = stream_parser()
        .parse_resource(&anchor, "people/john.xml")
        .unwrap();
    assert_eq!(person, Person::new("John", "Doe"));

    let err = stream_parser()
        .parse_resource(&anchor, "people/jane.xml")
        .unwrap_err();
    match err {
        Error::MissingResource { expected } => {
            assert!(expected.contains("people/jane.xml"));
            assert!(expected.contains("fixtures"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(matches!(
        stream_parser().parse_resource(&anchor, "../escape.xml"),
        Err(Error::MissingResource { .. })
    ));
}

#[test]
fn test_embedded_anchor_resources() {
    let anchor = EmbeddedAnchor::new("embedded").with("john.xml", JOHN_DOE.as_bytes());
    assert_eq!(
        stream_parser().parse_resource(&anchor, "/john.xml").unwrap(),
        Person::new("John", "Doe")
    );
    assert!(matches!(
        stream_parser().parse_resource(&anchor, " "),
        Err(Error::InvalidArgument { name: "name", .. })
    ));
}

// -- Combinators --------------------------------------------------------------

#[test]
fn test_and_then_matches_manual_transform() {
    let full_name = |p: Person| format!("{} {}", p.first_name, p.last_name);
    let parser = stream_parser().map(full_name);

    assert_eq!(
        parser.parse_str(JOHN_DOE).unwrap(),
        full_name(stream_parser().parse_str(JOHN_DOE).unwrap())
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("john.xml");
    fs::write(&path, JOHN_DOE).unwrap();
    assert_eq!(parser.parse_file(&path).unwrap(), "John Doe");

    let (stream, closes) = Tracked::new(JOHN_DOE);
    assert_eq!(
        parser
            .parse_stream_from(move || Ok(Some(stream)), Charset::utf_8())
            .unwrap(),
        "John Doe"
    );
    assert_eq!(closes.get(), 1);
}

#[test]
fn test_and_then_none_is_invalid_result() {
    let parser = stream_parser().and_then(|p: Person| (p.last_name != "Doe").then_some(p));
    assert!(matches!(
        parser.parse_str(JOHN_DOE),
        Err(Error::InvalidArgument { name: "result", .. })
    ));
}

#[test]
fn test_compose_matches_manual_transform() {
    let split = |full: &str| {
        let (first, last) = full.split_once(' ').unwrap_or((full, ""));
        Person::new(first, last)
    };
    let formatter = stream_formatter().compose(split);
    assert_eq!(
        formatter.format_to_string("John Doe").unwrap(),
        stream_formatter().format_to_string(&split("John Doe")).unwrap()
    );

    let guarded = stream_formatter().compose_some(|full: &str| {
        full.split_once(' ').map(|(first, last)| Person::new(first, last))
    });
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.xml");
    assert!(matches!(
        guarded.format_file("Prince", &path),
        Err(Error::InvalidArgument { name: "value", .. })
    ));
    assert!(!path.exists());
}
