//! Shared fixtures: a two-field person record with a parser and formatter for
//! every backend.

#![allow(dead_code)]

use std::cell::Cell;
use std::io::{self, BufRead, Read, Write};
use std::rc::Rc;

use mu_xmlio::xml::{Attribute, SaxError};
use mu_xmlio::{
    BuildError, ContentHandler, Error, EventType, SaxParser, StaxEventFormatter, StaxEventParser,
    StaxStreamFormatter, StaxStreamParser, XmlEvent, XmlEventWriter, XmlStreamWriter,
};

pub const JOHN_DOE: &str =
    "<person><firstName>John</firstName><lastName>Doe</lastName></person>";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        }
    }

    fn set(&mut self, field: &str, text: String) -> Result<(), Error> {
        match field {
            "firstName" => self.first_name = text,
            "lastName" => self.last_name = text,
            other => return Err(Error::backend(format!("unexpected element <{}>", other))),
        }
        Ok(())
    }
}

pub fn stream_parser() -> StaxStreamParser<Person> {
    StaxStreamParser::new(|reader| {
        reader.next_tag()?;
        reader.require(EventType::StartElement, Some("person"))?;
        let mut person = Person::default();
        while reader.next_tag()? == EventType::StartElement {
            let field = reader.local_name().unwrap_or_default().to_string();
            let text = reader.element_text()?;
            person.set(&field, text)?;
        }
        reader.require(EventType::EndElement, Some("person"))?;
        Ok(person)
    })
}

pub fn event_parser() -> StaxEventParser<Person> {
    StaxEventParser::new(|events| {
        let root = events.next_tag()?;
        if root.name() != Some("person") {
            return Err(Error::backend(format!("unexpected root {}", root)));
        }
        let mut person = Person::default();
        loop {
            let tag = events.next_tag()?;
            if tag.is_end_element() {
                return Ok(person);
            }
            let field = tag.name().unwrap_or_default().to_string();
            let text = events.element_text()?;
            person.set(&field, text)?;
        }
    })
}

/// Collects person fields from push callbacks.
#[derive(Default)]
pub struct PersonHandler {
    field: Option<String>,
    text: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl ContentHandler for PersonHandler {
    fn start_element(&mut self, name: &str, _attributes: &[Attribute]) -> Result<(), SaxError> {
        if name != "person" {
            self.field = Some(name.to_string());
            self.text.clear();
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), SaxError> {
        if self.field.as_deref() == Some(name) {
            let text = std::mem::take(&mut self.text);
            match name {
                "firstName" => self.first_name = Some(text),
                "lastName" => self.last_name = Some(text),
                _ => {}
            }
            self.field = None;
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SaxError> {
        if self.field.is_some() {
            self.text.push_str(text);
        }
        Ok(())
    }
}

pub fn sax_parser() -> SaxParser<Person, PersonHandler> {
    SaxParser::per_call(PersonHandler::default, |h: &mut PersonHandler| {
        Ok(Person {
            first_name: h
                .first_name
                .clone()
                .ok_or_else(|| BuildError::missing("firstName"))?,
            last_name: h
                .last_name
                .clone()
                .ok_or_else(|| BuildError::missing("lastName"))?,
        })
    })
}

pub fn stream_formatter() -> StaxStreamFormatter<Person> {
    StaxStreamFormatter::new(|person: &Person, w: &mut XmlStreamWriter<'_>| {
        w.write_start_element("person")?;
        w.write_start_element("firstName")?;
        w.write_characters(&person.first_name)?;
        w.write_end_element()?;
        w.write_start_element("lastName")?;
        w.write_characters(&person.last_name)?;
        w.write_end_element()?;
        w.write_end_document()?;
        Ok(())
    })
}

pub fn event_formatter() -> StaxEventFormatter<Person> {
    StaxEventFormatter::new(|person: &Person, w: &mut XmlEventWriter<'_>| {
        w.add(&XmlEvent::start_element("person"))?;
        for (name, value) in [("firstName", &person.first_name), ("lastName", &person.last_name)] {
            w.add(&XmlEvent::start_element(name))?;
            w.add(&XmlEvent::characters(value.as_str()))?;
            w.add(&XmlEvent::end_element(name))?;
        }
        w.add(&XmlEvent::end_element("person"))?;
        Ok(())
    })
}

/// In-memory stream that counts how often it was dropped (closed).
pub struct Tracked {
    inner: io::Cursor<Vec<u8>>,
    pub closes: Rc<Cell<usize>>,
}

impl Tracked {
    pub fn new(bytes: impl Into<Vec<u8>>) -> (Self, Rc<Cell<usize>>) {
        let closes = Rc::new(Cell::new(0));
        let tracked = Self {
            inner: io::Cursor::new(bytes.into()),
            closes: closes.clone(),
        };
        (tracked, closes)
    }
}

impl Read for Tracked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for Tracked {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

impl Write for Tracked {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}
