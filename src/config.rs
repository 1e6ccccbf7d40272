//! Database configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration:
//!
//! ```yaml
//! clock:
//!   kind: deterministic
//!   start: 0
//!   step: 1
//! query:
//!   default_format: json
//! serializer:
//!   use_default_prefixes: true
//!   prefixes:
//!     ex: http://example.org/
//! log_level: debug
//! ```

use crate::clock::ClockKind;
use crate::rdf::NamespaceManager;
use crate::sparql::ResultFormat;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid YAML or unknown field value
    #[error("Invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Query settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Format used when a caller does not pick one
    pub default_format: ResultFormat,
}

/// Turtle output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Start from the built-in prefixes (rdf, rdfs, xsd, ...)
    pub use_default_prefixes: bool,
    /// Extra prefixes, declared in this order
    pub prefixes: IndexMap<String, String>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            use_default_prefixes: true,
            prefixes: IndexMap::new(),
        }
    }
}

impl SerializerConfig {
    /// Namespace manager for Turtle output
    pub fn namespaces(&self) -> NamespaceManager {
        let mut namespaces = if self.use_default_prefixes {
            NamespaceManager::new()
        } else {
            NamespaceManager::empty()
        };
        for (prefix, iri) in &self.prefixes {
            namespaces.add_prefix(prefix.as_str(), iri.as_str());
        }
        namespaces
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    /// Clock injected into new stores
    pub clock: ClockKind,
    pub query: QueryConfig,
    pub serializer: SerializerConfig,
    /// `tracing` level filter used by the CLI
    pub log_level: String,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            clock: ClockKind::default(),
            query: QueryConfig::default(),
            serializer: SerializerConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl TrellisConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a YAML file
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
