//! RDF value types: terms, quads and quad patterns
//!
//! A [`Quad`] is a subject/predicate/object triple with an optional named
//! graph context. `None` as context means the default (unnamed) graph.
//!
//! A [`QuadPattern`] selects quads by fixed positions. Its `contexts` list
//! follows the usual store convention:
//!
//! - empty list: any context, including the default graph
//! - `None` entry: the default graph
//! - `Some(term)` entry: that named graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// XML Schema namespace
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
/// `xsd:string`, the datatype of plain literals
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
/// `xsd:boolean`
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
/// `xsd:integer`
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
/// `xsd:decimal`
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
/// `xsd:double`
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// A literal value with datatype and optional language tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    /// Lexical form
    pub value: String,
    /// Datatype IRI
    pub datatype: String,
    /// Language tag (language-tagged strings only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Literal {
    /// Numeric value for the numeric XSD datatypes
    pub fn as_f64(&self) -> Option<f64> {
        let local = self.datatype.strip_prefix(XSD)?;
        match local {
            "integer" | "int" | "long" | "short" | "byte" | "decimal" | "double" | "float"
            | "nonNegativeInteger" | "positiveInteger" | "negativeInteger"
            | "nonPositiveInteger" | "unsignedInt" | "unsignedLong" => {
                self.value.trim().parse::<f64>().ok()
            }
            _ => None,
        }
    }

    /// Boolean value for `xsd:boolean` literals
    pub fn as_bool(&self) -> Option<bool> {
        if self.datatype != XSD_BOOLEAN {
            return None;
        }
        match self.value.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

/// An RDF term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// IRI reference
    Iri(String),
    /// Blank node with a store-local label
    Blank(String),
    /// Literal value
    Literal(Literal),
}

impl Term {
    /// IRI term
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    /// Blank node term
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    /// Plain string literal
    pub fn literal(value: impl Into<String>) -> Self {
        Self::typed_literal(value, XSD_STRING)
    }

    /// Literal with an explicit datatype
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            datatype: datatype.into(),
            language: None,
        })
    }

    /// Language-tagged string
    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            datatype: "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString".to_string(),
            language: Some(language.into().to_ascii_lowercase()),
        })
    }

    /// `xsd:boolean` literal
    pub fn boolean(value: bool) -> Self {
        Self::typed_literal(if value { "true" } else { "false" }, XSD_BOOLEAN)
    }

    /// `xsd:integer` literal
    pub fn integer(value: i64) -> Self {
        Self::typed_literal(value.to_string(), XSD_INTEGER)
    }

    /// True if this is a resource (IRI or blank node), usable as subject or context
    pub fn is_resource(&self) -> bool {
        matches!(self, Term::Iri(_) | Term::Blank(_))
    }

    /// Literal payload, if any
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", iri),
            Term::Blank(label) => write!(f, "_:{}", label),
            Term::Literal(lit) => {
                write!(f, "\"{}\"", lit.value.replace('\\', "\\\\").replace('"', "\\\""))?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{}", lang)
                } else if lit.datatype != XSD_STRING {
                    write!(f, "^^<{}>", lit.datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A subject/predicate/object triple in an optional named graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quad {
    /// Subject
    pub subject: Term,
    /// Predicate
    pub predicate: Term,
    /// Object
    pub object: Term,
    /// Named graph, `None` for the default graph
    pub context: Option<Term>,
}

impl Quad {
    /// Quad in the default graph
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    /// Quad in the given named graph
    pub fn in_context(subject: Term, predicate: Term, object: Term, context: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: Some(context),
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ctx) = &self.context {
            write!(f, " {}", ctx)?;
        }
        write!(f, " .")
    }
}

/// Selects quads by fixed subject, predicate, object and contexts
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    /// Fixed subject, `None` for any
    pub subject: Option<Term>,
    /// Fixed predicate, `None` for any
    pub predicate: Option<Term>,
    /// Fixed object, `None` for any
    pub object: Option<Term>,
    /// Contexts to search, empty for all
    pub contexts: Vec<Option<Term>>,
}

impl QuadPattern {
    /// Pattern matching every quad
    pub fn any() -> Self {
        Self::default()
    }

    /// Pattern over subject, predicate and object in all contexts
    pub fn new(subject: Option<Term>, predicate: Option<Term>, object: Option<Term>) -> Self {
        Self {
            subject,
            predicate,
            object,
            contexts: Vec::new(),
        }
    }

    /// Restrict the pattern to the given contexts
    pub fn with_contexts(mut self, contexts: Vec<Option<Term>>) -> Self {
        self.contexts = contexts;
        self
    }

    /// Pattern matching exactly one quad in its own context
    pub fn exact(quad: &Quad) -> Self {
        Self {
            subject: Some(quad.subject.clone()),
            predicate: Some(quad.predicate.clone()),
            object: Some(quad.object.clone()),
            contexts: vec![quad.context.clone()],
        }
    }

    /// Whether the quad is selected by this pattern
    pub fn matches(&self, quad: &Quad) -> bool {
        fn fixed(pos: &Option<Term>, term: &Term) -> bool {
            pos.as_ref().map_or(true, |t| t == term)
        }
        fixed(&self.subject, &quad.subject)
            && fixed(&self.predicate, &quad.predicate)
            && fixed(&self.object, &quad.object)
            && (self.contexts.is_empty() || self.contexts.contains(&quad.context))
    }
}

/// A namespace prefix declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    /// Prefix, e.g. `ex`
    pub prefix: String,
    /// Namespace IRI
    pub name: String,
}

impl Namespace {
    /// Create a namespace declaration
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(s: &str, p: &str, o: &str, ctx: Option<&str>) -> Quad {
        Quad {
            subject: Term::iri(s),
            predicate: Term::iri(p),
            object: Term::literal(o),
            context: ctx.map(Term::iri),
        }
    }

    #[test]
    fn test_term_display() {
        assert_eq!(Term::iri("urn:a").to_string(), "<urn:a>");
        assert_eq!(Term::blank("b0").to_string(), "_:b0");
        assert_eq!(Term::literal("x").to_string(), "\"x\"");
        assert_eq!(Term::lang_literal("chat", "FR").to_string(), "\"chat\"@fr");
        assert_eq!(
            Term::integer(3).to_string(),
            format!("\"3\"^^<{}>", XSD_INTEGER)
        );
    }

    #[test]
    fn test_literal_coercion() {
        assert_eq!(Term::integer(42).as_literal().unwrap().as_f64(), Some(42.0));
        assert_eq!(Term::literal("42").as_literal().unwrap().as_f64(), None);
        assert_eq!(Term::boolean(true).as_literal().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_pattern_wildcard_contexts() {
        let pattern = QuadPattern::new(Some(Term::iri("urn:s")), None, None);
        assert!(pattern.matches(&quad("urn:s", "urn:p", "x", None)));
        assert!(pattern.matches(&quad("urn:s", "urn:p", "x", Some("urn:g"))));
        assert!(!pattern.matches(&quad("urn:t", "urn:p", "x", None)));
    }

    #[test]
    fn test_pattern_default_graph_only() {
        let pattern = QuadPattern::any().with_contexts(vec![None]);
        assert!(pattern.matches(&quad("urn:s", "urn:p", "x", None)));
        assert!(!pattern.matches(&quad("urn:s", "urn:p", "x", Some("urn:g"))));
    }

    #[test]
    fn test_exact_pattern() {
        let q = quad("urn:s", "urn:p", "x", Some("urn:g"));
        let pattern = QuadPattern::exact(&q);
        assert!(pattern.matches(&q));
        assert!(!pattern.matches(&quad("urn:s", "urn:p", "x", None)));
    }
}
