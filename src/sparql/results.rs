//! SPARQL query results

use crate::rdf::{serialize_turtle, NamespaceManager, RdfTerm, SerializeResult, Triple};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;

/// SPARQL result format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// `name=<term>` lines; an all-unbound row is an empty line
    #[default]
    Text,
    /// SPARQL 1.1 Query Results JSON
    Json,
    /// SPARQL 1.1 Query Results CSV
    Csv,
    /// SPARQL 1.1 Query Results TSV
    Tsv,
}

impl FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ResultFormat::Text),
            "json" => Ok(ResultFormat::Json),
            "csv" => Ok(ResultFormat::Csv),
            "tsv" => Ok(ResultFormat::Tsv),
            other => Err(format!("unknown result format '{}'", other)),
        }
    }
}

/// Query solution (variable bindings)
///
/// Values are stored in the order of the result's variable list.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySolution {
    variables: Arc<[String]>,
    values: Vec<Option<RdfTerm>>,
}

impl QuerySolution {
    pub(crate) fn new(variables: Arc<[String]>, values: Vec<Option<RdfTerm>>) -> Self {
        Self { variables, values }
    }

    /// Get a binding by variable name (without `?`)
    pub fn get(&self, variable: &str) -> Option<&RdfTerm> {
        let index = self.variables.iter().position(|v| v == variable)?;
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Bound variables with their values, in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RdfTerm)> {
        self.variables
            .iter()
            .zip(&self.values)
            .filter_map(|(name, value)| value.as_ref().map(|term| (name.as_str(), term)))
    }

    /// Values in declared variable order, `None` when unbound
    pub fn values(&self) -> &[Option<RdfTerm>] {
        &self.values
    }
}

/// SPARQL query results
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResults {
    /// Bindings from SELECT query
    Solutions {
        /// Projected variables
        variables: Vec<String>,
        /// Solutions
        rows: Vec<QuerySolution>,
    },

    /// Boolean result from ASK query
    Boolean(bool),

    /// Graph from CONSTRUCT query
    Graph(Vec<Triple>),
}

impl QueryResults {
    /// Number of solutions, triples, or 1 for a boolean
    pub fn len(&self) -> usize {
        match self {
            QueryResults::Solutions { rows, .. } => rows.len(),
            QueryResults::Boolean(_) => 1,
            QueryResults::Graph(triples) => triples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize with the default prefixes for graph results
    pub fn serialize(&self, format: ResultFormat) -> SerializeResult<String> {
        self.serialize_with(format, &NamespaceManager::new())
    }

    /// Serialize results to string
    ///
    /// Graph results are always written as Turtle, compacted with
    /// `namespaces`.
    pub fn serialize_with(
        &self,
        format: ResultFormat,
        namespaces: &NamespaceManager,
    ) -> SerializeResult<String> {
        match self {
            QueryResults::Graph(triples) => serialize_turtle(triples.iter().cloned(), namespaces),
            QueryResults::Boolean(value) => match format {
                ResultFormat::Json => Ok(serde_json::to_string(&json!({
                    "head": {},
                    "boolean": value,
                }))?),
                _ => Ok(value.to_string()),
            },
            QueryResults::Solutions { variables, rows } => match format {
                ResultFormat::Text => Ok(write_text(rows)),
                ResultFormat::Json => write_json(variables, rows),
                ResultFormat::Csv => write_csv(variables, rows),
                ResultFormat::Tsv => write_tsv(variables, rows),
            },
        }
    }
}

/// One line per row of `name=term` pairs, unbound variables left out
///
/// A row that binds nothing is an empty line, so a single such row prints
/// the same empty string as no rows at all. Use `len()` or the JSON format
/// to tell them apart.
fn write_text(rows: &[QuerySolution]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|(name, term)| format!("{}={}", name, term))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn json_term(term: &RdfTerm) -> Value {
    match term {
        RdfTerm::NamedNode(node) => json!({ "type": "uri", "value": node.as_str() }),
        RdfTerm::BlankNode(node) => json!({ "type": "bnode", "value": node.as_str() }),
        RdfTerm::Literal(literal) => {
            let mut object = Map::new();
            object.insert("type".into(), "literal".into());
            object.insert("value".into(), literal.value().into());
            if let Some(language) = literal.language() {
                object.insert("xml:lang".into(), language.into());
            } else if !literal.is_simple() {
                object.insert("datatype".into(), literal.datatype_iri().into());
            }
            Value::Object(object)
        }
    }
}

fn write_json(variables: &[String], rows: &[QuerySolution]) -> SerializeResult<String> {
    let bindings: Vec<Value> = rows
        .iter()
        .map(|row| {
            Value::Object(
                row.iter()
                    .map(|(name, term)| (name.to_string(), json_term(term)))
                    .collect(),
            )
        })
        .collect();
    let document = json!({
        "head": { "vars": variables },
        "results": { "bindings": bindings },
    });
    Ok(serde_json::to_string(&document)?)
}

fn csv_field(term: &RdfTerm) -> String {
    let raw = match term {
        RdfTerm::NamedNode(node) => node.as_str().to_string(),
        RdfTerm::BlankNode(node) => node.to_string(),
        RdfTerm::Literal(literal) => literal.value().to_string(),
    };
    if raw.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw
    }
}

fn write_csv(variables: &[String], rows: &[QuerySolution]) -> SerializeResult<String> {
    let mut out = String::new();
    write!(out, "{}\r\n", variables.join(","))?;
    for row in rows {
        let fields: Vec<String> = row
            .values()
            .iter()
            .map(|value| value.as_ref().map(csv_field).unwrap_or_default())
            .collect();
        write!(out, "{}\r\n", fields.join(","))?;
    }
    Ok(out)
}

fn write_tsv(variables: &[String], rows: &[QuerySolution]) -> SerializeResult<String> {
    let mut out = String::new();
    let header: Vec<String> = variables.iter().map(|v| format!("?{}", v)).collect();
    writeln!(out, "{}", header.join("\t"))?;
    for row in rows {
        let fields: Vec<String> = row
            .values()
            .iter()
            .map(|value| value.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect();
        writeln!(out, "{}", fields.join("\t"))?;
    }
    Ok(out)
}
