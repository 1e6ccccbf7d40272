//! Turtle format implementation
//!
//! The reader is a pest grammar plus a small tree walker that keeps the
//! prefix table, the base IRI and the parse-scoped blank node labels. The
//! writer groups triples by subject and abbreviates IRIs with the prefixes
//! of a [`NamespaceManager`].

use super::{SerializeResult, TurtleError};
use crate::rdf::lexical::{self, is_absolute_iri, resolve_iri, unescape, unescape_iri};
use crate::rdf::namespace::NamespaceManager;
use crate::rdf::types::{
    vocab, BlankNode, Literal, NamedNode, RdfObject, RdfPredicate, RdfSubject, RdfTerm, Triple,
};
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write;
use tracing::debug;

#[derive(Parser)]
#[grammar = "rdf/serialization/turtle.pest"]
struct TurtleGrammar;

impl From<pest::error::Error<Rule>> for TurtleError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        let message = err.variant.message().into_owned();
        TurtleError {
            line,
            column,
            message,
        }
    }
}

impl TurtleError {
    fn at(pair: &Pair<'_, Rule>, message: impl Into<String>) -> Self {
        let (line, column) = pair.as_span().start_pos().line_col();
        TurtleError {
            line,
            column,
            message: message.into(),
        }
    }
}

type TurtleResult<T> = Result<T, TurtleError>;

/// Parse a Turtle (or N-Triples) document
///
/// Relative IRIs are resolved against `base_iri` and later `@base`
/// directives; without a base they are an error. Blank node labels are
/// scoped to this call.
pub fn parse_turtle(input: &str, base_iri: Option<&str>) -> TurtleResult<Vec<Triple>> {
    let document = TurtleGrammar::parse(Rule::turtle_doc, input)
        .map_err(TurtleError::from)?
        .next()
        .ok_or_else(|| TurtleError {
            line: 1,
            column: 1,
            message: "empty document".to_string(),
        })?;

    let mut reader = TurtleReader::new(base_iri)?;
    for statement in document.into_inner() {
        reader.statement(statement)?;
    }
    debug!("Parsed {} Turtle triples", reader.triples.len());
    Ok(reader.triples)
}

struct TurtleReader {
    base: Option<String>,
    prefixes: FxHashMap<String, String>,
    labels: FxHashMap<String, BlankNode>,
    next_blank: usize,
    triples: Vec<Triple>,
}

impl TurtleReader {
    fn new(base_iri: Option<&str>) -> TurtleResult<Self> {
        if let Some(base) = base_iri {
            if !is_absolute_iri(base) || lexical::validate_iri(base).is_err() {
                return Err(TurtleError {
                    line: 1,
                    column: 1,
                    message: format!("base IRI <{}> is not an absolute IRI", base),
                });
            }
        }
        Ok(Self {
            base: base_iri.map(str::to_string),
            prefixes: FxHashMap::default(),
            labels: FxHashMap::default(),
            next_blank: 0,
            triples: Vec::new(),
        })
    }

    fn statement(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<()> {
        match pair.as_rule() {
            Rule::prefix_id | Rule::sparql_prefix => {
                let mut inner = pair.into_inner();
                let (Some(ns), Some(iri)) = (inner.next(), inner.next()) else {
                    return Ok(());
                };
                let prefix = ns.as_str().trim_end_matches(':').to_string();
                let namespace = self.iri_ref(&iri)?;
                self.prefixes.insert(prefix, namespace.as_str().to_string());
            }
            Rule::base | Rule::sparql_base => {
                if let Some(iri) = pair.into_inner().next() {
                    let resolved = self.iri_ref(&iri)?;
                    self.base = Some(resolved.as_str().to_string());
                }
            }
            Rule::triples => self.triples_block(pair)?,
            _ => {}
        }
        Ok(())
    }

    fn triples_block(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<()> {
        let mut inner = pair.into_inner();
        let Some(first) = inner.next() else {
            return Ok(());
        };
        let subject = match first.as_rule() {
            Rule::blank_node_property_list => self.blank_node_property_list(first)?,
            _ => self.subject(first)?,
        };
        if let Some(list) = inner.next() {
            self.predicate_object_list(&subject, list)?;
        }
        Ok(())
    }

    fn predicate_object_list(
        &mut self,
        subject: &RdfSubject,
        pair: Pair<'_, Rule>,
    ) -> TurtleResult<()> {
        let mut predicate: Option<RdfPredicate> = None;
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::object_list => {
                    let Some(p) = predicate.clone() else {
                        return Err(TurtleError::at(&item, "object list without predicate"));
                    };
                    for object in item.into_inner() {
                        let object = self.object(object)?;
                        self.emit(subject.clone(), p.clone(), object);
                    }
                }
                Rule::rdf_type => {
                    predicate = Some(RdfPredicate::from(NamedNode::new_unchecked(vocab::RDF_TYPE)))
                }
                _ => predicate = Some(RdfPredicate::from(self.iri(&item)?)),
            }
        }
        Ok(())
    }

    fn subject(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<RdfSubject> {
        match self.object(pair.clone())? {
            RdfObject::NamedNode(n) => Ok(n.into()),
            RdfObject::BlankNode(b) => Ok(b.into()),
            RdfObject::Literal(_) => Err(TurtleError::at(&pair, "literal in subject position")),
        }
    }

    fn object(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<RdfObject> {
        let object = match pair.as_rule() {
            Rule::IRIREF | Rule::PNAME_LN | Rule::PNAME_NS => self.iri(&pair)?.into(),
            Rule::BLANK_NODE_LABEL => {
                let label = pair.as_str().trim_start_matches("_:").to_string();
                self.labelled_blank(label).into()
            }
            Rule::ANON => self.fresh_blank().into(),
            Rule::blank_node_property_list => RdfObject::from(self.blank_node_property_list(pair)?),
            Rule::collection => self.collection(pair)?,
            Rule::rdf_literal => self.rdf_literal(pair)?.into(),
            Rule::INTEGER => typed(pair.as_str(), vocab::XSD_INTEGER).into(),
            Rule::DECIMAL => typed(pair.as_str(), vocab::XSD_DECIMAL).into(),
            Rule::DOUBLE => typed(pair.as_str(), vocab::XSD_DOUBLE).into(),
            Rule::boolean_literal => typed(pair.as_str(), vocab::XSD_BOOLEAN).into(),
            other => {
                return Err(TurtleError::at(&pair, format!("unexpected {:?}", other)));
            }
        };
        Ok(object)
    }

    fn blank_node_property_list(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<RdfSubject> {
        let node: RdfSubject = self.fresh_blank().into();
        if let Some(list) = pair.into_inner().next() {
            self.predicate_object_list(&node, list)?;
        }
        Ok(node)
    }

    fn collection(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<RdfObject> {
        let items = pair
            .into_inner()
            .map(|item| self.object(item))
            .collect::<TurtleResult<Vec<_>>>()?;
        let first = RdfPredicate::from(NamedNode::new_unchecked(vocab::RDF_FIRST));
        let rest = RdfPredicate::from(NamedNode::new_unchecked(vocab::RDF_REST));

        let mut head: RdfObject = NamedNode::new_unchecked(vocab::RDF_NIL).into();
        for item in items.into_iter().rev() {
            let cell = self.fresh_blank();
            self.emit(cell.clone().into(), first.clone(), item);
            self.emit(cell.clone().into(), rest.clone(), head);
            head = cell.into();
        }
        Ok(head)
    }

    fn rdf_literal(&mut self, pair: Pair<'_, Rule>) -> TurtleResult<Literal> {
        let mut inner = pair.into_inner();
        let Some(string) = inner.next() else {
            return Ok(Literal::new_simple_literal(""));
        };
        let raw = string.clone().into_inner().next().map_or("", |c| c.as_str());
        let value = unescape(raw).map_err(|e| TurtleError::at(&string, e.to_string()))?;

        match inner.next() {
            None => Ok(Literal::new_simple_literal(value.as_ref())),
            Some(tag) if tag.as_rule() == Rule::LANGTAG => {
                Literal::new_language_tagged_literal(value.as_ref(), &tag.as_str()[1..])
                    .map_err(|e| TurtleError::at(&tag, e.to_string()))
            }
            Some(datatype) => {
                let iri = self.iri(&datatype)?;
                Literal::try_typed_literal(value.as_ref(), iri)
                    .map_err(|e| TurtleError::at(&datatype, e.to_string()))
            }
        }
    }

    fn iri(&self, pair: &Pair<'_, Rule>) -> TurtleResult<NamedNode> {
        match pair.as_rule() {
            Rule::IRIREF => self.iri_ref(pair),
            Rule::PNAME_NS | Rule::PNAME_LN => self.prefixed_name(pair),
            other => Err(TurtleError::at(pair, format!("expected IRI, found {:?}", other))),
        }
    }

    fn iri_ref(&self, pair: &Pair<'_, Rule>) -> TurtleResult<NamedNode> {
        let raw = pair.clone().into_inner().next().map_or("", |c| c.as_str());
        let iri = unescape_iri(raw).map_err(|e| TurtleError::at(pair, e.to_string()))?;
        let resolved = if is_absolute_iri(&iri) {
            iri.into_owned()
        } else {
            let Some(base) = &self.base else {
                return Err(TurtleError::at(
                    pair,
                    format!("relative IRI <{}> without a base IRI", iri),
                ));
            };
            resolve_iri(base, &iri).map_err(|e| TurtleError::at(pair, e.to_string()))?
        };
        NamedNode::new(&resolved).map_err(|e| TurtleError::at(pair, e.to_string()))
    }

    fn prefixed_name(&self, pair: &Pair<'_, Rule>) -> TurtleResult<NamedNode> {
        let text = pair.as_str();
        let (prefix, local) = text.split_once(':').unwrap_or((text, ""));
        let Some(namespace) = self.prefixes.get(prefix) else {
            return Err(TurtleError::at(pair, format!("undefined prefix '{}:'", prefix)));
        };
        let iri = format!("{}{}", namespace, unescape_local_name(local));
        NamedNode::new(&iri).map_err(|e| TurtleError::at(pair, e.to_string()))
    }

    fn labelled_blank(&mut self, label: String) -> BlankNode {
        if let Some(node) = self.labels.get(&label) {
            return node.clone();
        }
        let node = self.fresh_blank();
        self.labels.insert(label, node.clone());
        node
    }

    fn fresh_blank(&mut self) -> BlankNode {
        let node = BlankNode::new_unchecked(format!("b{}", self.next_blank));
        self.next_blank += 1;
        node
    }

    fn emit(&mut self, subject: RdfSubject, predicate: RdfPredicate, object: RdfObject) {
        self.triples.push(Triple::new(subject, predicate, object));
    }
}

fn typed(lexical_form: &str, datatype: &'static str) -> Literal {
    Literal::new_typed_literal(lexical_form, NamedNode::new_unchecked(datatype))
}

/// Drop the backslash of `PN_LOCAL_ESC` sequences; `%XX` stays encoded
fn unescape_local_name(local: &str) -> std::borrow::Cow<'_, str> {
    if !local.contains('\\') {
        return local.into();
    }
    let mut out = String::with_capacity(local.len());
    let mut chars = local.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out.into()
}

/// Serialize triples as Turtle
///
/// Output is sorted and grouped by subject, so the same triple set always
/// produces the same text. Only prefixes that are actually used are
/// declared.
pub fn serialize_turtle<I>(triples: I, namespaces: &NamespaceManager) -> SerializeResult<String>
where
    I: IntoIterator<Item = Triple>,
{
    let mut triples: Vec<Triple> = triples.into_iter().collect();
    triples.sort();
    triples.dedup();

    let writer = TermWriter { namespaces };
    let mut used: FxHashSet<String> = FxHashSet::default();
    for triple in &triples {
        writer.collect_prefixes(&RdfTerm::from(triple.subject.clone()), &mut used);
        if triple.predicate.as_str() != vocab::RDF_TYPE {
            writer.collect_prefixes(&RdfTerm::from(triple.predicate.clone()), &mut used);
        }
        writer.collect_prefixes(&RdfTerm::from(triple.object.clone()), &mut used);
    }

    let mut out = String::new();
    for ns in namespaces.prefixes() {
        if used.contains(ns.prefix.as_str()) {
            writeln!(out, "@prefix {}: <{}> .", ns.prefix, ns.iri)?;
        }
    }
    if !used.is_empty() && !triples.is_empty() {
        out.push('\n');
    }

    let mut index = 0;
    while index < triples.len() {
        let subject = &triples[index].subject;
        let end = triples[index..]
            .iter()
            .position(|t| &t.subject != subject)
            .map_or(triples.len(), |offset| index + offset);

        writer.write_term(&mut out, &RdfTerm::from(subject.clone()))?;
        let group = &triples[index..end];
        let mut first_predicate = true;
        let mut position = 0;
        while position < group.len() {
            let predicate = &group[position].predicate;
            if first_predicate {
                out.push(' ');
                first_predicate = false;
            } else {
                out.push_str(" ;\n    ");
            }
            if predicate.as_str() == vocab::RDF_TYPE {
                out.push('a');
            } else {
                writer.write_term(&mut out, &RdfTerm::from(predicate.clone()))?;
            }
            out.push(' ');
            let mut first_object = true;
            while position < group.len() && &group[position].predicate == predicate {
                if !first_object {
                    out.push_str(", ");
                }
                first_object = false;
                writer.write_term(&mut out, &RdfTerm::from(group[position].object.clone()))?;
                position += 1;
            }
        }
        out.push_str(" .\n");
        index = end;
    }
    Ok(out)
}

/// Serialize triples as N-Triples, one sorted line per triple
pub fn serialize_ntriples<I>(triples: I) -> SerializeResult<String>
where
    I: IntoIterator<Item = Triple>,
{
    let mut triples: Vec<Triple> = triples.into_iter().collect();
    triples.sort();
    triples.dedup();
    let mut out = String::new();
    for triple in &triples {
        writeln!(out, "{}", triple)?;
    }
    Ok(out)
}

struct TermWriter<'a> {
    namespaces: &'a NamespaceManager,
}

impl TermWriter<'_> {
    fn compact<'i>(&'i self, iri: &'i str) -> Option<(&'i str, &'i str)> {
        self.namespaces
            .compact_parts(iri)
            .filter(|(prefix, _)| is_writable_prefix(prefix))
    }

    fn collect_prefixes(&self, term: &RdfTerm, used: &mut FxHashSet<String>) {
        let iri = match term {
            RdfTerm::NamedNode(n) => n.as_str(),
            RdfTerm::Literal(l) if !l.is_plain() => l.datatype_iri(),
            _ => return,
        };
        if let Some((prefix, _)) = self.compact(iri) {
            if !used.contains(prefix) {
                used.insert(prefix.to_string());
            }
        }
    }

    fn write_iri(&self, out: &mut String, iri: &str) -> SerializeResult<()> {
        match self.compact(iri) {
            Some((prefix, local)) => write!(out, "{}:{}", prefix, local)?,
            None => write!(out, "<{}>", iri)?,
        }
        Ok(())
    }

    fn write_term(&self, out: &mut String, term: &RdfTerm) -> SerializeResult<()> {
        match term {
            RdfTerm::NamedNode(n) => self.write_iri(out, n.as_str())?,
            RdfTerm::BlankNode(b) => write!(out, "{}", b)?,
            RdfTerm::Literal(l) => {
                write!(out, "\"{}\"", lexical::escape_literal(l.value()))?;
                if let Some(lang) = l.language() {
                    write!(out, "@{}", lang)?;
                } else if !l.is_simple() {
                    out.push_str("^^");
                    self.write_iri(out, l.datatype_iri())?;
                }
            }
        }
        Ok(())
    }
}

/// Prefix names the reader accepts back: empty or `[A-Za-z][A-Za-z0-9_-]*`
fn is_writable_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        Some(_) => false,
    }
}
