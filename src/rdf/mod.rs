//! RDF (Resource Description Framework) support for Trellis
//!
//! This module implements the storage half of the database:
//! - RDF terms and triples (subject-predicate-object)
//! - Textual term format and IRI resolution
//! - An interned, triple-indexed store (SPO/POS/OSP)
//! - Turtle and N-Triples serialization formats
//!
//! # Example
//!
//! ```rust
//! use trellis::rdf::{Store, Triple, NamedNode, Literal, RdfPredicate};
//!
//! let store = Store::new();
//!
//! // Create a triple
//! let subject = NamedNode::new("http://example.org/alice").unwrap();
//! let predicate = RdfPredicate::new("http://xmlns.com/foaf/0.1/name").unwrap();
//! let object = Literal::new_simple_literal("Alice");
//!
//! let triple = Triple::new(subject.clone().into(), predicate, object.into());
//! assert!(store.add(&triple));
//!
//! // Query triples
//! let results = store.matching(Some(&subject.into()), None, None);
//! assert_eq!(results.len(), 1);
//! ```

pub mod lexical;
mod namespace;
mod serialization;
mod store;
mod types;

pub use types::{
    vocab, BlankNode, Literal, NamedNode, RdfObject, RdfPredicate, RdfSubject, RdfTerm,
    TermError, TermResult, Triple, TriplePattern,
};

pub use lexical::{parse_object, parse_predicate, parse_subject, parse_term, resolve_iri};

pub use store::{IndexOrder, Store, TermId, TermMatches, TripleStore};

pub use namespace::{Namespace, NamespaceManager, PrefixError, PrefixResult, DEFAULT_PREFIXES};

pub use serialization::{
    parse_turtle, serialize_ntriples, serialize_turtle, ParseError, ParseResult, RdfFormat,
    RdfParser, RdfSerializer, SerializeError, SerializeResult, TurtleError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdf_module_exports() {
        // Verify all main types are exported
        let _store: Store = Store::new();
        let _ns_mgr = NamespaceManager::new();
        let _format = RdfFormat::Turtle;
        assert!(parse_term("_:b").unwrap().is_blank_node());
    }
}
