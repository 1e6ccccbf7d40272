//! Crate-level error type
//!
//! Module errors stay specific ([`TermError`], [`TurtleError`],
//! [`SparqlError`], ...). [`Error`] unifies them for callers that drive
//! the whole database, and [`ErrorKind`] groups them the way the host
//! boundary reports them.

use crate::config::ConfigError;
use crate::rdf::{ParseError, SerializeError, TermError, TurtleError};
use crate::sparql::{ExecutionError, SparqlError};
use thiserror::Error;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed argument
    Input,
    /// Bytes that are not valid UTF-8
    Encoding,
    /// Term text that is not a valid N-Triples term
    TermFormat,
    /// Turtle or SPARQL syntax error, or a reference that cannot be resolved
    Grammar,
    /// Recognised construct the engine does not evaluate
    UnsupportedFeature,
    /// Failure while evaluating a query
    Execution,
    /// Failure while writing output
    Serialization,
    /// Output does not fit in the caller's buffer
    Capacity,
}

/// Trellis errors
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid UTF-8 input
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Term format error
    #[error(transparent)]
    Term(#[from] TermError),

    /// Turtle parse error
    #[error(transparent)]
    Turtle(#[from] TurtleError),

    /// RDF file read error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// SPARQL error
    #[error(transparent)]
    Sparql(#[from] SparqlError),

    /// Serialization error
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Output larger than the destination buffer
    #[error("Buffer too small: need {required} bytes, have {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ExecutionError> for Error {
    fn from(e: ExecutionError) -> Self {
        Error::Sparql(SparqlError::Execution(e))
    }
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) | Error::Config(_) => ErrorKind::Input,
            Error::InvalidUtf8(_) => ErrorKind::Encoding,
            Error::Term(_) => ErrorKind::TermFormat,
            Error::Turtle(_) => ErrorKind::Grammar,
            Error::Parse(ParseError::Syntax(_)) => ErrorKind::Grammar,
            Error::Parse(ParseError::Io(_)) => ErrorKind::Input,
            Error::Sparql(SparqlError::Syntax { .. } | SparqlError::UnknownVariable(_)) => {
                ErrorKind::Grammar
            }
            Error::Sparql(SparqlError::UnsupportedFeature(_)) => ErrorKind::UnsupportedFeature,
            Error::Sparql(SparqlError::Execution(_)) => ErrorKind::Execution,
            Error::Serialize(_) => ErrorKind::Serialization,
            Error::BufferTooSmall { .. } => ErrorKind::Capacity,
        }
    }

    /// Whether retrying with different arguments can succeed without any
    /// cleanup
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Capacity
    }
}
