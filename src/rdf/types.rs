//! RDF type definitions
//!
//! Terms are immutable and cheap to clone: every payload is an `Arc<str>`,
//! so a term interned by the store can be handed out to any number of
//! solutions without copying its text.

use super::lexical;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Well-known IRIs
pub mod vocab {
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
    pub const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
    pub const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
    pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
}

/// Term construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TermError {
    /// Invalid IRI
    #[error("Invalid IRI: {0}")]
    InvalidIri(String),

    /// Invalid blank node label
    #[error("Invalid blank node label: {0}")]
    InvalidBlankNodeLabel(String),

    /// Unknown escape sequence or escaped surrogate
    #[error("Invalid escape sequence in literal: {0}")]
    InvalidLiteralEscape(String),

    /// Quoted literal that does not follow the N-Triples literal syntax
    #[error("Malformed literal: {0}")]
    MalformedLiteral(String),

    /// Datatype that cannot be written with `^^`
    #[error("Invalid literal datatype: {0}")]
    InvalidDatatype(String),

    /// Invalid BCP47 language tag
    #[error("Invalid language tag: {0}")]
    InvalidLanguageTag(String),

    /// Term kind not allowed in this triple position
    #[error("{term} is not allowed as {position}")]
    InvalidPosition { term: String, position: &'static str },
}

pub type TermResult<T> = Result<T, TermError>;

/// Named node (IRI)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamedNode(Arc<str>);

impl NamedNode {
    /// Create a named node from an absolute IRI
    pub fn new(iri: &str) -> TermResult<Self> {
        lexical::validate_iri(iri)?;
        if !lexical::is_absolute_iri(iri) {
            return Err(TermError::InvalidIri(iri.to_string()));
        }
        Ok(Self(Arc::from(iri)))
    }

    /// Create a named node without validation
    ///
    /// The caller guarantees `iri` is an absolute IRI free of forbidden characters.
    pub fn new_unchecked(iri: impl Into<Arc<str>>) -> Self {
        Self(iri.into())
    }

    /// Get the IRI string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.as_str())
    }
}

/// Blank node
///
/// Labels are scoped to the store that holds them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlankNode(Arc<str>);

impl BlankNode {
    /// Create a blank node from a label (without the `_:` prefix)
    pub fn new(label: &str) -> TermResult<Self> {
        lexical::validate_blank_node_label(label)?;
        Ok(Self(Arc::from(label)))
    }

    pub(crate) fn new_unchecked(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }

    /// Get the blank node label
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum LiteralKind {
    Simple,
    LanguageTagged(Arc<str>),
    Typed(NamedNode),
}

/// RDF literal value
///
/// Kept in canonical form: `xsd:string` typed literals are simple literals
/// and language tags are lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    value: Arc<str>,
    kind: LiteralKind,
}

impl Literal {
    /// Create a simple literal (plain string)
    pub fn new_simple_literal(value: impl Into<Arc<str>>) -> Self {
        Self {
            value: value.into(),
            kind: LiteralKind::Simple,
        }
    }

    /// Create a literal with language tag
    pub fn new_language_tagged_literal(
        value: impl Into<Arc<str>>,
        language: &str,
    ) -> TermResult<Self> {
        lexical::validate_language_tag(language)?;
        Ok(Self {
            value: value.into(),
            kind: LiteralKind::LanguageTagged(Arc::from(language.to_ascii_lowercase())),
        })
    }

    /// Create a typed literal from parsed input
    ///
    /// `rdf:langString` needs a language tag, so it is rejected here.
    pub fn try_typed_literal(value: impl Into<Arc<str>>, datatype: NamedNode) -> TermResult<Self> {
        if datatype.as_str() == vocab::RDF_LANG_STRING {
            return Err(TermError::InvalidDatatype(datatype.as_str().to_string()));
        }
        Ok(Self::new_typed_literal(value, datatype))
    }

    /// Create a typed literal
    pub fn new_typed_literal(value: impl Into<Arc<str>>, datatype: NamedNode) -> Self {
        let kind = if datatype.as_str() == vocab::XSD_STRING {
            LiteralKind::Simple
        } else {
            LiteralKind::Typed(datatype)
        };
        Self {
            value: value.into(),
            kind,
        }
    }

    /// `xsd:boolean` literal
    pub fn from_bool(value: bool) -> Self {
        Self::new_typed_literal(
            if value { "true" } else { "false" },
            NamedNode::new_unchecked(vocab::XSD_BOOLEAN),
        )
    }

    /// `xsd:integer` literal
    pub fn from_integer(value: i64) -> Self {
        Self::new_typed_literal(value.to_string(), NamedNode::new_unchecked(vocab::XSD_INTEGER))
    }

    /// Get the lexical value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the language tag if present
    pub fn language(&self) -> Option<&str> {
        match &self.kind {
            LiteralKind::LanguageTagged(lang) => Some(lang),
            _ => None,
        }
    }

    /// Datatype IRI (`xsd:string` for simple literals, `rdf:langString` for tagged ones)
    pub fn datatype_iri(&self) -> &str {
        match &self.kind {
            LiteralKind::Simple => vocab::XSD_STRING,
            LiteralKind::LanguageTagged(_) => vocab::RDF_LANG_STRING,
            LiteralKind::Typed(dt) => dt.as_str(),
        }
    }

    /// Get the datatype
    pub fn datatype(&self) -> NamedNode {
        match &self.kind {
            LiteralKind::Typed(dt) => dt.clone(),
            _ => NamedNode::new_unchecked(self.datatype_iri()),
        }
    }

    /// Simple literal, no language and no datatype other than `xsd:string`
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, LiteralKind::Simple)
    }

    /// Simple or language-tagged
    pub fn is_plain(&self) -> bool {
        !matches!(self.kind, LiteralKind::Typed(_))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", lexical::escape_literal(self.value()))?;
        match &self.kind {
            LiteralKind::Simple => Ok(()),
            LiteralKind::LanguageTagged(lang) => write!(f, "@{}", lang),
            LiteralKind::Typed(dt) => write!(f, "^^{}", dt),
        }
    }
}

/// RDF subject (NamedNode or BlankNode)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RdfSubject {
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Blank node
    BlankNode(BlankNode),
}

impl RdfSubject {
    /// Check if this is a named node
    pub fn is_named_node(&self) -> bool {
        matches!(self, RdfSubject::NamedNode(_))
    }

    /// Check if this is a blank node
    pub fn is_blank_node(&self) -> bool {
        matches!(self, RdfSubject::BlankNode(_))
    }
}

impl fmt::Display for RdfSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdfSubject::NamedNode(n) => write!(f, "{}", n),
            RdfSubject::BlankNode(b) => write!(f, "{}", b),
        }
    }
}

impl From<NamedNode> for RdfSubject {
    fn from(node: NamedNode) -> Self {
        RdfSubject::NamedNode(node)
    }
}

impl From<BlankNode> for RdfSubject {
    fn from(node: BlankNode) -> Self {
        RdfSubject::BlankNode(node)
    }
}

impl TryFrom<RdfTerm> for RdfSubject {
    type Error = TermError;

    fn try_from(term: RdfTerm) -> TermResult<Self> {
        match term {
            RdfTerm::NamedNode(n) => Ok(RdfSubject::NamedNode(n)),
            RdfTerm::BlankNode(b) => Ok(RdfSubject::BlankNode(b)),
            RdfTerm::Literal(l) => Err(TermError::InvalidPosition {
                term: l.to_string(),
                position: "subject",
            }),
        }
    }
}

/// RDF predicate (always a NamedNode)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RdfPredicate(NamedNode);

impl RdfPredicate {
    /// Create a new predicate from an IRI
    pub fn new(iri: &str) -> TermResult<Self> {
        Ok(Self(NamedNode::new(iri)?))
    }

    /// Get the underlying named node
    pub fn as_named_node(&self) -> &NamedNode {
        &self.0
    }

    /// Get the IRI string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RdfPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<NamedNode> for RdfPredicate {
    fn from(node: NamedNode) -> Self {
        RdfPredicate(node)
    }
}

impl From<RdfPredicate> for NamedNode {
    fn from(pred: RdfPredicate) -> Self {
        pred.0
    }
}

impl TryFrom<RdfTerm> for RdfPredicate {
    type Error = TermError;

    fn try_from(term: RdfTerm) -> TermResult<Self> {
        match term {
            RdfTerm::NamedNode(n) => Ok(RdfPredicate(n)),
            other => Err(TermError::InvalidPosition {
                term: other.to_string(),
                position: "predicate",
            }),
        }
    }
}

/// RDF object (NamedNode, BlankNode, or Literal)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RdfObject {
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Blank node
    BlankNode(BlankNode),
    /// Literal value
    Literal(Literal),
}

impl RdfObject {
    /// Check if this is a named node
    pub fn is_named_node(&self) -> bool {
        matches!(self, RdfObject::NamedNode(_))
    }

    /// Check if this is a blank node
    pub fn is_blank_node(&self) -> bool {
        matches!(self, RdfObject::BlankNode(_))
    }

    /// Check if this is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, RdfObject::Literal(_))
    }
}

impl fmt::Display for RdfObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdfObject::NamedNode(n) => write!(f, "{}", n),
            RdfObject::BlankNode(b) => write!(f, "{}", b),
            RdfObject::Literal(l) => write!(f, "{}", l),
        }
    }
}

impl From<NamedNode> for RdfObject {
    fn from(node: NamedNode) -> Self {
        RdfObject::NamedNode(node)
    }
}

impl From<BlankNode> for RdfObject {
    fn from(node: BlankNode) -> Self {
        RdfObject::BlankNode(node)
    }
}

impl From<Literal> for RdfObject {
    fn from(lit: Literal) -> Self {
        RdfObject::Literal(lit)
    }
}

impl From<RdfSubject> for RdfObject {
    fn from(subject: RdfSubject) -> Self {
        match subject {
            RdfSubject::NamedNode(n) => RdfObject::NamedNode(n),
            RdfSubject::BlankNode(b) => RdfObject::BlankNode(b),
        }
    }
}

impl From<RdfTerm> for RdfObject {
    fn from(term: RdfTerm) -> Self {
        match term {
            RdfTerm::NamedNode(n) => RdfObject::NamedNode(n),
            RdfTerm::BlankNode(b) => RdfObject::BlankNode(b),
            RdfTerm::Literal(l) => RdfObject::Literal(l),
        }
    }
}

/// RDF term (any RDF value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RdfTerm {
    /// Named node (IRI)
    NamedNode(NamedNode),
    /// Blank node
    BlankNode(BlankNode),
    /// Literal value
    Literal(Literal),
}

impl RdfTerm {
    /// Check if this is a named node
    pub fn is_named_node(&self) -> bool {
        matches!(self, RdfTerm::NamedNode(_))
    }

    /// Check if this is a blank node
    pub fn is_blank_node(&self) -> bool {
        matches!(self, RdfTerm::BlankNode(_))
    }

    /// Check if this is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, RdfTerm::Literal(_))
    }

    /// Borrow the literal, if this is one
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            RdfTerm::Literal(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for RdfTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdfTerm::NamedNode(n) => write!(f, "{}", n),
            RdfTerm::BlankNode(b) => write!(f, "{}", b),
            RdfTerm::Literal(l) => write!(f, "{}", l),
        }
    }
}

impl From<NamedNode> for RdfTerm {
    fn from(node: NamedNode) -> Self {
        RdfTerm::NamedNode(node)
    }
}

impl From<BlankNode> for RdfTerm {
    fn from(node: BlankNode) -> Self {
        RdfTerm::BlankNode(node)
    }
}

impl From<Literal> for RdfTerm {
    fn from(lit: Literal) -> Self {
        RdfTerm::Literal(lit)
    }
}

impl From<RdfSubject> for RdfTerm {
    fn from(subject: RdfSubject) -> Self {
        match subject {
            RdfSubject::NamedNode(n) => RdfTerm::NamedNode(n),
            RdfSubject::BlankNode(b) => RdfTerm::BlankNode(b),
        }
    }
}

impl From<RdfPredicate> for RdfTerm {
    fn from(predicate: RdfPredicate) -> Self {
        RdfTerm::NamedNode(predicate.0)
    }
}

impl From<RdfObject> for RdfTerm {
    fn from(object: RdfObject) -> Self {
        match object {
            RdfObject::NamedNode(n) => RdfTerm::NamedNode(n),
            RdfObject::BlankNode(b) => RdfTerm::BlankNode(b),
            RdfObject::Literal(l) => RdfTerm::Literal(l),
        }
    }
}

/// RDF triple (subject-predicate-object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    /// Subject
    pub subject: RdfSubject,
    /// Predicate
    pub predicate: RdfPredicate,
    /// Object
    pub object: RdfObject,
}

impl Triple {
    /// Create a new triple
    pub fn new(subject: RdfSubject, predicate: RdfPredicate, object: RdfObject) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Build a triple from arbitrary terms, checking each position
    pub fn from_terms(subject: RdfTerm, predicate: RdfTerm, object: RdfTerm) -> TermResult<Self> {
        Ok(Self {
            subject: subject.try_into()?,
            predicate: predicate.try_into()?,
            object: object.into(),
        })
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Triple pattern for lookups (with optional positions)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriplePattern {
    /// Subject (None = any)
    pub subject: Option<RdfSubject>,
    /// Predicate (None = any)
    pub predicate: Option<RdfPredicate>,
    /// Object (None = any)
    pub object: Option<RdfObject>,
}

impl TriplePattern {
    /// Create a new triple pattern
    pub fn new(
        subject: Option<RdfSubject>,
        predicate: Option<RdfPredicate>,
        object: Option<RdfObject>,
    ) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Check if a triple matches this pattern
    pub fn matches(&self, triple: &Triple) -> bool {
        if let Some(ref s) = self.subject {
            if s != &triple.subject {
                return false;
            }
        }
        if let Some(ref p) = self.predicate {
            if p != &triple.predicate {
                return false;
            }
        }
        if let Some(ref o) = self.object {
            if o != &triple.object {
                return false;
            }
        }
        true
    }
}
