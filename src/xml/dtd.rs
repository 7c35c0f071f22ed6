//! DOCTYPE and DTD subset scanning.
//!
//! Only what entity processing needs is understood: entity and notation
//! declarations plus parameter entity references. Element and attribute-list
//! declarations, comments and PIs are skipped without validation.

use super::event::{is_xml_whitespace, Notation};

/// Parsed `<!DOCTYPE ...>` body.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct DoctypeDecl {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub internal_subset: Option<String>,
}

/// Replacement text or external location of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EntityDef {
    Internal(String),
    External {
        public_id: Option<String>,
        system_id: String,
        notation: Option<String>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EntityDecl {
    pub name: String,
    pub parameter: bool,
    pub def: EntityDef,
}

/// A markup declaration that affects entity processing.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Markup {
    Entity(EntityDecl),
    Notation(Notation),
    ParameterReference(String),
}

/// Parse the text between `<!DOCTYPE` and the closing `>`.
pub(crate) fn parse_doctype(raw: &str) -> Result<DoctypeDecl, String> {
    let mut scan = Scanner::new(raw.trim());
    let name = scan.name().ok_or("DOCTYPE is missing the root element name")?;
    let mut decl = DoctypeDecl {
        name,
        ..DoctypeDecl::default()
    };
    scan.skip_ws();
    if let Some((public_id, system_id)) = scan.external_id(false)? {
        decl.public_id = public_id;
        decl.system_id = system_id;
        scan.skip_ws();
    }
    if scan.eat("[") {
        let end = scan
            .rest()
            .rfind(']')
            .ok_or("DOCTYPE internal subset is not terminated by `]`")?;
        decl.internal_subset = Some(scan.rest()[..end].to_string());
        scan.pos += end + 1;
        scan.skip_ws();
    }
    if !scan.at_end() {
        return Err(format!(
            "unexpected content in DOCTYPE: `{}`",
            scan.rest()
        ));
    }
    Ok(decl)
}

/// Scan a DTD subset (internal, external, or a parameter entity's text).
pub(crate) fn parse_subset(subset: &str) -> Result<Vec<Markup>, String> {
    let mut scan = Scanner::new(subset);
    let mut markup = Vec::new();
    loop {
        scan.skip_ws();
        if scan.at_end() {
            break;
        }
        if scan.eat("<!--") {
            scan.skip_past("-->")?;
        } else if scan.eat("<?") {
            scan.skip_past("?>")?;
        } else if scan.eat("<![") {
            // Conditional sections only occur in external subsets; their
            // declarations are not needed for entity expansion.
            scan.skip_past("]]>")?;
        } else if scan.eat("<!ENTITY") {
            markup.push(Markup::Entity(scan.entity_decl()?));
        } else if scan.eat("<!NOTATION") {
            markup.push(Markup::Notation(scan.notation_decl()?));
        } else if scan.eat("<!") {
            scan.skip_decl()?;
        } else if scan.eat("%") {
            let name = scan.name().ok_or("malformed parameter entity reference")?;
            if !scan.eat(";") {
                return Err(format!("parameter entity reference `%{}` lacks `;`", name));
            }
            markup.push(Markup::ParameterReference(name));
        } else {
            return Err(format!(
                "unexpected content in DTD at offset {}",
                scan.pos
            ));
        }
    }
    Ok(markup)
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches(is_xml_whitespace);
        self.pos += rest.len() - trimmed.len();
        trimmed.len() != rest.len()
    }

    fn require_ws(&mut self, context: &str) -> Result<(), String> {
        if self.skip_ws() {
            Ok(())
        } else {
            Err(format!("whitespace required in {}", context))
        }
    }

    fn eat(&mut self, literal: &str) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), String> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(format!("unterminated markup, expected `{}`", terminator)),
        }
    }

    fn name(&mut self) -> Option<String> {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(idx, _)| idx);
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(rest[..end].to_string())
    }

    fn quoted(&mut self) -> Result<String, String> {
        let rest = self.rest();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err("expected a quoted literal".to_string()),
        };
        let body = &rest[1..];
        let end = body
            .find(quote)
            .ok_or("unterminated quoted literal")?;
        self.pos += end + 2;
        Ok(body[..end].to_string())
    }

    /// `SYSTEM "sys"` or `PUBLIC "pub" "sys"`. Notations may omit the system
    /// literal after a public one.
    #[allow(clippy::type_complexity)]
    fn external_id(
        &mut self,
        system_optional: bool,
    ) -> Result<Option<(Option<String>, Option<String>)>, String> {
        if self.eat("SYSTEM") {
            self.require_ws("SYSTEM identifier")?;
            return Ok(Some((None, Some(self.quoted()?))));
        }
        if self.eat("PUBLIC") {
            self.require_ws("PUBLIC identifier")?;
            let public_id = self.quoted()?;
            let checkpoint = self.pos;
            let had_ws = self.skip_ws();
            if had_ws && matches!(self.rest().chars().next(), Some('"' | '\'')) {
                return Ok(Some((Some(public_id), Some(self.quoted()?))));
            }
            if system_optional {
                self.pos = checkpoint;
                return Ok(Some((Some(public_id), None)));
            }
            return Err("PUBLIC identifier requires a system literal".to_string());
        }
        Ok(None)
    }

    fn entity_decl(&mut self) -> Result<EntityDecl, String> {
        self.require_ws("ENTITY declaration")?;
        let parameter = if self.rest().starts_with('%') {
            self.pos += 1;
            self.require_ws("parameter ENTITY declaration")?;
            true
        } else {
            false
        };
        let name = self.name().ok_or("ENTITY declaration is missing a name")?;
        self.require_ws("ENTITY declaration")?;

        let def = if matches!(self.rest().chars().next(), Some('"' | '\'')) {
            EntityDef::Internal(self.quoted()?)
        } else {
            let (public_id, system_id) = self
                .external_id(false)?
                .ok_or_else(|| format!("entity `{}` has neither a value nor an external id", name))?;
            let system_id = system_id.unwrap_or_default();
            let mut notation = None;
            let checkpoint = self.pos;
            if self.skip_ws() && self.eat("NDATA") {
                if parameter {
                    return Err(format!("parameter entity `{}` cannot be unparsed", name));
                }
                self.require_ws("NDATA")?;
                notation = Some(self.name().ok_or("NDATA is missing a notation name")?);
            } else {
                self.pos = checkpoint;
            }
            EntityDef::External {
                public_id,
                system_id,
                notation,
            }
        };
        self.skip_ws();
        if !self.eat(">") {
            return Err(format!("ENTITY declaration `{}` is not terminated", name));
        }
        Ok(EntityDecl {
            name,
            parameter,
            def,
        })
    }

    fn notation_decl(&mut self) -> Result<Notation, String> {
        self.require_ws("NOTATION declaration")?;
        let name = self.name().ok_or("NOTATION declaration is missing a name")?;
        self.require_ws("NOTATION declaration")?;
        let (public_id, system_id) = self
            .external_id(true)?
            .ok_or_else(|| format!("notation `{}` has no external id", name))?;
        self.skip_ws();
        if !self.eat(">") {
            return Err(format!("NOTATION declaration `{}` is not terminated", name));
        }
        Ok(Notation {
            name,
            public_id,
            system_id,
        })
    }

    /// Skip an `<!ELEMENT ...>` or `<!ATTLIST ...>` declaration.
    fn skip_decl(&mut self) -> Result<(), String> {
        let mut quote = None;
        for (idx, c) in self.rest().char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(c),
                (None, '>') => {
                    self.pos += idx + 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err("unterminated markup declaration".to_string())
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.') || (!c.is_ascii() && !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctype_with_system_id_and_subset() {
        let decl =
            parse_doctype(" person SYSTEM \"person.dtd\" [ <!ENTITY who \"John\"> ]").unwrap();
        assert_eq!(decl.name, "person");
        assert_eq!(decl.system_id.as_deref(), Some("person.dtd"));
        assert_eq!(
            decl.internal_subset.as_deref(),
            Some(" <!ENTITY who \"John\"> ")
        );
    }

    #[test]
    fn test_doctype_public_requires_system_literal() {
        let decl = parse_doctype("html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"x.dtd\"").unwrap();
        assert_eq!(decl.public_id.as_deref(), Some("-//W3C//DTD XHTML 1.1//EN"));
        assert!(parse_doctype("html PUBLIC \"-//X//EN\"").is_err());
    }

    #[test]
    fn test_subset_declarations() {
        let markup = parse_subset(
            r#"
            <!-- people -->
            <!ELEMENT person (firstName, lastName)>
            <!ATTLIST person id CDATA "a>b">
            <!ENTITY first "John">
            <!ENTITY % ext SYSTEM "ext.ent">
            <!ENTITY logo SYSTEM "logo.png" NDATA png>
            <!NOTATION png PUBLIC "image/png">
            %ext;
            "#,
        )
        .unwrap();
        assert_eq!(markup.len(), 5);
        assert_eq!(
            markup[0],
            Markup::Entity(EntityDecl {
                name: "first".into(),
                parameter: false,
                def: EntityDef::Internal("John".into()),
            })
        );
        assert!(matches!(
            &markup[1],
            Markup::Entity(EntityDecl { parameter: true, .. })
        ));
        assert!(matches!(
            &markup[2],
            Markup::Entity(EntityDecl {
                def: EntityDef::External { notation: Some(n), .. },
                ..
            }) if n == "png"
        ));
        assert!(matches!(&markup[3], Markup::Notation(n) if n.system_id.is_none()));
        assert_eq!(markup[4], Markup::ParameterReference("ext".into()));
    }

    #[test]
    fn test_subset_rejects_garbage() {
        assert!(parse_subset("hello").is_err());
        assert!(parse_subset("<!ENTITY broken \"x\"").is_err());
    }
}
