//! RDF serialization formats
//!
//! Supports:
//! - Turtle (TTL)
//! - N-Triples (NT), read through the Turtle parser

mod turtle;

pub use turtle::{parse_turtle, serialize_ntriples, serialize_turtle};

use super::namespace::NamespaceManager;
use super::Triple;
use std::path::Path;
use thiserror::Error;

/// RDF serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    /// Turtle format (.ttl)
    Turtle,
    /// N-Triples format (.nt)
    NTriples,
}

impl RdfFormat {
    /// Guess the format from a file extension, defaulting to Turtle
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("nt") => RdfFormat::NTriples,
            _ => RdfFormat::Turtle,
        }
    }
}

/// Turtle syntax or semantic error, positioned in the input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Turtle error at line {line}, column {column}: {message}")]
pub struct TurtleError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Parse errors
#[derive(Error, Debug)]
pub enum ParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Syntax error
    #[error(transparent)]
    Syntax(#[from] TurtleError),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Serialization errors
#[derive(Error, Debug)]
pub enum SerializeError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Formatter error
    #[error("Serialization error: {0}")]
    Format(#[from] std::fmt::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SerializeResult<T> = Result<T, SerializeError>;

/// RDF parser
pub struct RdfParser;

impl RdfParser {
    /// Parse RDF data from a string
    pub fn parse(input: &str, format: RdfFormat, base_iri: Option<&str>) -> ParseResult<Vec<Triple>> {
        match format {
            // N-Triples is a subset of Turtle
            RdfFormat::Turtle | RdfFormat::NTriples => Ok(parse_turtle(input, base_iri)?),
        }
    }

    /// Parse RDF data from a file
    pub fn parse_file(path: &Path, base_iri: Option<&str>) -> ParseResult<Vec<Triple>> {
        let input = std::fs::read_to_string(path)?;
        Self::parse(&input, RdfFormat::from_path(path), base_iri)
    }
}

/// RDF serializer
pub struct RdfSerializer;

impl RdfSerializer {
    /// Serialize triples to a string
    pub fn serialize<I>(
        triples: I,
        format: RdfFormat,
        namespaces: &NamespaceManager,
    ) -> SerializeResult<String>
    where
        I: IntoIterator<Item = Triple>,
    {
        match format {
            RdfFormat::Turtle => serialize_turtle(triples, namespaces),
            RdfFormat::NTriples => serialize_ntriples(triples),
        }
    }

    /// Serialize triples to a file
    pub fn serialize_file<I>(
        triples: I,
        path: &Path,
        format: RdfFormat,
        namespaces: &NamespaceManager,
    ) -> SerializeResult<()>
    where
        I: IntoIterator<Item = Triple>,
    {
        let text = Self::serialize(triples, format, namespaces)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
