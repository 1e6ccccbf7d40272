//! Trellis RDF Database
//!
//! An embeddable, in-memory RDF triple store with Turtle import/export and
//! a SPARQL 1.1 query engine, built to run inside sandboxed hosts.
//!
//! # Architecture
//!
//! - [`rdf`]: term model, SPO/POS/OSP-indexed store, Turtle and N-Triples codec
//! - [`sparql`]: query parser, join planner and Volcano-style executor
//! - [`clock`]: injectable deterministic/monotonic tick source
//! - [`api`]: the host call contract with status codes and output buffers
//! - [`config`]: YAML configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use trellis::rdf::Store;
//! use trellis::sparql::{QueryResults, ResultFormat, SparqlEngine};
//!
//! let store = Store::new();
//! store
//!     .load_turtle(
//!         r#"@prefix ex: <http://example.org/> .
//!            ex:alice ex:knows ex:bob ."#,
//!         None,
//!     )
//!     .unwrap();
//!
//! let results = SparqlEngine::new(&store)
//!     .query("SELECT ?who WHERE { <http://example.org/alice> <http://example.org/knows> ?who }")
//!     .unwrap();
//! assert_eq!(
//!     results.serialize(ResultFormat::Text).unwrap(),
//!     "who=<http://example.org/bob>"
//! );
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod rdf;
pub mod sparql;

// Re-export main types for convenience
pub use api::{Database, ErrorCode};

pub use clock::{Clock, ClockKind, DeterministicClock, MonotonicClock};

pub use config::{ConfigError, TrellisConfig};

pub use error::{Error, ErrorKind, Result};

pub use rdf::{
    BlankNode, Literal, NamedNode, NamespaceManager, RdfObject, RdfPredicate, RdfSubject, RdfTerm,
    Store, TermError, Triple, TripleStore, TurtleError,
};

pub use sparql::{
    parse_query, QueryResults, QuerySolution, ResultFormat, SparqlEngine, SparqlError,
    SparqlResult,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate version string
pub fn version() -> &'static str {
    VERSION
}
