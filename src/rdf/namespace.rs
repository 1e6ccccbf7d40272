//! RDF namespace and prefix management
//!
//! This module handles namespace prefixes for compact IRI notation. The
//! Turtle serializer uses it to abbreviate IRIs; the CLI uses it to print
//! compact terms.

use indexmap::IndexMap;
use thiserror::Error;

/// Prefix errors
#[derive(Error, Debug)]
pub enum PrefixError {
    /// Unknown prefix
    #[error("Unknown prefix: {0}")]
    UnknownPrefix(String),

    /// Invalid IRI
    #[error("Invalid IRI: {0}")]
    InvalidIri(String),
}

pub type PrefixResult<T> = Result<T, PrefixError>;

/// Prefixes registered by [`NamespaceManager::new`]
pub const DEFAULT_PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("dcterms", "http://purl.org/dc/terms/"),
];

/// Namespace (prefix → IRI mapping)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Prefix
    pub prefix: String,
    /// IRI
    pub iri: String,
}

impl Namespace {
    /// Create a new namespace
    pub fn new(prefix: impl Into<String>, iri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            iri: iri.into(),
        }
    }
}

/// Namespace manager, iteration follows registration order
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    /// Prefix → IRI mappings
    prefixes: IndexMap<String, String>,
}

impl NamespaceManager {
    /// Create a new namespace manager with common prefixes
    pub fn new() -> Self {
        let mut mgr = Self::empty();
        for (prefix, iri) in DEFAULT_PREFIXES {
            mgr.add_prefix(*prefix, *iri);
        }
        mgr
    }

    /// Create a namespace manager without any prefix
    pub fn empty() -> Self {
        Self {
            prefixes: IndexMap::new(),
        }
    }

    /// Add a prefix, replacing an existing binding
    pub fn add_prefix(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), iri.into());
    }

    /// Get IRI for a prefix
    pub fn get_iri(&self, prefix: &str) -> PrefixResult<&str> {
        self.prefixes
            .get(prefix)
            .map(|s| s.as_str())
            .ok_or_else(|| PrefixError::UnknownPrefix(prefix.to_string()))
    }

    /// Expand a compact IRI (prefix:local) to full IRI
    pub fn expand(&self, compact_iri: &str) -> PrefixResult<String> {
        match compact_iri.split_once(':') {
            Some((prefix, local)) => Ok(format!("{}{}", self.get_iri(prefix)?, local)),
            None => Err(PrefixError::InvalidIri(compact_iri.to_string())),
        }
    }

    /// Split an IRI into `(prefix, local)` using the longest matching namespace
    ///
    /// Only local names made of `[A-Za-z_][A-Za-z0-9_-]*` (or empty) are
    /// produced, so the result is always a valid prefixed name.
    pub fn compact_parts<'a>(&'a self, iri: &'a str) -> Option<(&'a str, &'a str)> {
        self.prefixes
            .iter()
            .filter_map(|(prefix, ns)| {
                iri.strip_prefix(ns.as_str())
                    .filter(|local| is_simple_local_name(local))
                    .map(|local| (prefix.as_str(), ns.len(), local))
            })
            .max_by_key(|(_, ns_len, _)| *ns_len)
            .map(|(prefix, _, local)| (prefix, local))
    }

    /// Compact an IRI using known prefixes
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.compact_parts(iri)
            .map(|(prefix, local)| format!("{}:{}", prefix, local))
    }

    /// Get all registered prefixes
    pub fn prefixes(&self) -> Vec<Namespace> {
        self.prefixes
            .iter()
            .map(|(prefix, iri)| Namespace::new(prefix.clone(), iri.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn is_simple_local_name(local: &str) -> bool {
    let mut chars = local.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        Some(_) => false,
    }
}
