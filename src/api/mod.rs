//! Host call contract
//!
//! [`Database`] is the surface an embedding host drives: byte-slice inputs,
//! caller-owned output buffers and a fixed set of numeric status codes.
//! Inputs may carry a trailing NUL terminator; bytes from the first NUL on
//! are ignored. Outputs are written NUL-terminated, and only when the whole
//! text plus terminator fits, so a buffer never holds a truncated UTF-8
//! sequence.
//!
//! # Example
//!
//! ```rust
//! use trellis::api::{Database, ErrorCode};
//!
//! let db = Database::new();
//! db.add_triple(b"<http://example.org/s>", b"<http://example.org/p>", b"\"o\"")
//!     .unwrap();
//!
//! let mut out = [0u8; 256];
//! let written = db
//!     .query_sparql(b"SELECT ?o WHERE { ?s ?p ?o }", &mut out)
//!     .unwrap();
//! assert_eq!(&out[..written], b"o=\"o\"");
//! assert_eq!(out[written], 0);
//!
//! let mut tiny = [0u8; 2];
//! let result = db.serialize_turtle(&mut tiny);
//! assert_eq!(Database::status(&result), ErrorCode::BufferTooSmall as i64);
//! ```

use crate::config::TrellisConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::rdf::{parse_object, parse_predicate, parse_subject, serialize_turtle, Store, Triple};
use crate::sparql::SparqlEngine;
use tracing::debug;

/// Negative status codes reported to the host
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Missing or empty argument, zero-capacity buffer
    InvalidArgument = -1,
    InvalidUtf8 = -2,
    /// Turtle/SPARQL syntax, term format, unsupported feature, unknown variable
    Parse = -3,
    Execution = -4,
    Serialization = -5,
    BufferTooSmall = -6,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Input => ErrorCode::InvalidArgument,
            ErrorKind::Encoding => ErrorCode::InvalidUtf8,
            ErrorKind::TermFormat | ErrorKind::Grammar | ErrorKind::UnsupportedFeature => {
                ErrorCode::Parse
            }
            ErrorKind::Execution => ErrorCode::Execution,
            ErrorKind::Serialization => ErrorCode::Serialization,
            ErrorKind::Capacity => ErrorCode::BufferTooSmall,
        }
    }
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        err.kind().into()
    }
}

/// Non-negative status for a successful call
pub trait StatusValue {
    fn status_value(&self) -> i64;
}

impl StatusValue for () {
    fn status_value(&self) -> i64 {
        0
    }
}

impl StatusValue for bool {
    fn status_value(&self) -> i64 {
        i64::from(*self)
    }
}

impl StatusValue for usize {
    fn status_value(&self) -> i64 {
        i64::try_from(*self).unwrap_or(i64::MAX)
    }
}

impl StatusValue for u64 {
    fn status_value(&self) -> i64 {
        i64::try_from(*self).unwrap_or(i64::MAX)
    }
}

/// Embeddable RDF database handle
///
/// Dropping the handle releases the store. All methods take `&self`; the
/// store serializes writers internally.
pub struct Database {
    store: Store,
    config: TrellisConfig,
}

impl Database {
    /// Create a database with the default configuration and the
    /// process-wide clock
    pub fn new() -> Self {
        Self {
            store: Store::new(),
            config: TrellisConfig::default(),
        }
    }

    /// Create a database whose store runs on the configured clock
    pub fn with_config(config: TrellisConfig) -> Self {
        Self {
            store: Store::with_clock(config.clock.build()),
            config,
        }
    }

    /// Signed status code for any call result
    pub fn status<T: StatusValue>(result: &Result<T>) -> i64 {
        match result {
            Ok(value) => value.status_value(),
            Err(err) => ErrorCode::from(err) as i64,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    /// Remove every triple
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of triples
    pub fn count(&self) -> u64 {
        self.store.count()
    }

    /// Add one triple given in N-Triples term syntax; `true` if it was new
    pub fn add_triple(&self, subject: &[u8], predicate: &[u8], object: &[u8]) -> Result<bool> {
        let triple = parse_triple(subject, predicate, object)?;
        Ok(self.store.add(&triple))
    }

    /// Whether the triple is stored
    pub fn contains_triple(&self, subject: &[u8], predicate: &[u8], object: &[u8]) -> Result<bool> {
        let triple = parse_triple(subject, predicate, object)?;
        Ok(self.store.contains(&triple))
    }

    /// Run a query and write the results in the configured default format
    ///
    /// Returns the number of bytes written, without the terminator.
    pub fn query_sparql(&self, query: &[u8], out: &mut [u8]) -> Result<usize> {
        require_capacity(out)?;
        let query = text("query", query)?;
        let results = SparqlEngine::new(&self.store).query(query)?;
        let rendered = results.serialize_with(
            self.config.query.default_format,
            &self.config.serializer.namespaces(),
        )?;
        write_output(&rendered, out)
    }

    /// Load a Turtle document, all or nothing; returns the triples added
    pub fn load_turtle(&self, data: &[u8], base_iri: Option<&[u8]>) -> Result<usize> {
        let data = text("turtle data", data)?;
        let base = match base_iri.map(until_nul) {
            Some(bytes) if !bytes.is_empty() => Some(std::str::from_utf8(bytes)?),
            _ => None,
        };
        Ok(self.store.load_turtle(data, base)?)
    }

    /// Write the whole store as Turtle
    pub fn serialize_turtle(&self, out: &mut [u8]) -> Result<usize> {
        require_capacity(out)?;
        let turtle = {
            let store = self.store.read();
            serialize_turtle(store.iter(), &self.config.serializer.namespaces())?
        };
        write_output(&turtle, out)
    }

    /// Current tick of the store clock
    pub fn now(&self) -> u64 {
        self.store.now()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Required text argument
fn text<'b>(name: &str, bytes: &'b [u8]) -> Result<&'b str> {
    let bytes = until_nul(bytes);
    if bytes.is_empty() {
        debug!("Rejected call: empty {}", name);
        return Err(Error::InvalidArgument(format!("{} is empty", name)));
    }
    Ok(std::str::from_utf8(bytes)?)
}

fn parse_triple(subject: &[u8], predicate: &[u8], object: &[u8]) -> Result<Triple> {
    let subject = text("subject", subject)?;
    let predicate = text("predicate", predicate)?;
    let object = text("object", object)?;
    Ok(Triple::new(
        parse_subject(subject)?,
        parse_predicate(predicate)?,
        parse_object(object)?,
    ))
}

fn require_capacity(out: &[u8]) -> Result<()> {
    if out.is_empty() {
        return Err(Error::InvalidArgument("output buffer has no capacity".into()));
    }
    Ok(())
}

/// Copy `text` and a NUL terminator into `out`, or nothing at all
fn write_output(text: &str, out: &mut [u8]) -> Result<usize> {
    let bytes = text.as_bytes();
    let required = bytes.len() + 1;
    if required > out.len() {
        debug!("Output of {} bytes does not fit in {}", required, out.len());
        return Err(Error::BufferTooSmall {
            required,
            capacity: out.len(),
        });
    }
    out[..bytes.len()].copy_from_slice(bytes);
    out[bytes.len()] = 0;
    Ok(bytes.len())
}
