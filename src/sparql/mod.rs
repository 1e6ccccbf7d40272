//! SPARQL 1.1 query language support
//!
//! This module implements SPARQL query parsing and execution over a
//! [`Store`]: SELECT, ASK and CONSTRUCT with basic graph patterns,
//! OPTIONAL, UNION, MINUS, BIND, VALUES, FILTER (including EXISTS) and the
//! ORDER BY / LIMIT / OFFSET modifiers.
//!
//! # Example
//!
//! ```rust
//! use trellis::rdf::Store;
//! use trellis::sparql::{QueryResults, SparqlEngine};
//!
//! let store = Store::new();
//! store
//!     .load_turtle("<http://example.org/alice> <http://xmlns.com/foaf/0.1/name> \"Alice\" .", None)
//!     .unwrap();
//!
//! let query = r#"
//!     PREFIX foaf: <http://xmlns.com/foaf/0.1/>
//!     SELECT ?name WHERE {
//!         ?person foaf:name ?name .
//!     }
//! "#;
//!
//! let results = SparqlEngine::new(&store).query(query).unwrap();
//! assert_eq!(results.len(), 1);
//! ```

pub mod ast;
pub mod executor;
mod expression;
mod optimizer;
mod parser;
mod results;

pub use executor::{ExecutionError, SparqlExecutor};
pub use parser::parse_query;
pub use results::{QueryResults, QuerySolution, ResultFormat};

use crate::rdf::{Store, TripleStore};
use thiserror::Error;
use tracing::debug;

/// SPARQL errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SparqlError {
    /// Malformed query text
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// Byte offset into the query
        position: usize,
        line: usize,
        column: usize,
        message: String,
    },

    /// Recognised but not evaluated
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Projected or ordered variable never bound by the pattern
    #[error("Unknown variable: ?{0}")]
    UnknownVariable(String),

    /// Execution error
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type SparqlResult<T> = Result<T, SparqlError>;

/// Parse and run a query against an already locked store
pub fn execute_query(store: &TripleStore, query_str: &str) -> SparqlResult<QueryResults> {
    let query = parse_query(query_str)?;
    Ok(SparqlExecutor::new(store).execute(&query)?)
}

/// SPARQL query engine
///
/// Each query holds the store's read lock for its whole run.
pub struct SparqlEngine<'a> {
    store: &'a Store,
}

impl<'a> SparqlEngine<'a> {
    /// Create a new SPARQL engine
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Execute a SPARQL query
    pub fn query(&self, query_str: &str) -> SparqlResult<QueryResults> {
        let query = parse_query(query_str)?;
        let guard = self.store.read();
        debug!("Executing query over {} triples", guard.count());
        Ok(SparqlExecutor::new(&guard).execute(&query)?)
    }
}
