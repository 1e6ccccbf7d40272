//! SPARQL query parser using Pest
//!
//! Turns query text into the [`Query`] AST and validates variable scoping.
//! Everything the grammar recognises but the engine does not evaluate is
//! reported as [`SparqlError::UnsupportedFeature`].

use super::ast::*;
use super::{SparqlError, SparqlResult};
use crate::rdf::lexical::{is_absolute_iri, resolve_iri, unescape, unescape_iri};
use crate::rdf::{vocab, Literal, NamedNode, RdfTerm};
use pest::error::{InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use rustc_hash::FxHashMap;
use std::cell::Cell;
use std::sync::LazyLock;
use tracing::debug;

#[derive(Parser)]
#[grammar = "sparql/sparql.pest"]
struct SparqlGrammar;

static PRATT_PARSER: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::infix(Rule::eq_op, Assoc::Left)
            | Op::infix(Rule::ne_op, Assoc::Left)
            | Op::infix(Rule::lt_op, Assoc::Left)
            | Op::infix(Rule::gt_op, Assoc::Left)
            | Op::infix(Rule::le_op, Assoc::Left)
            | Op::infix(Rule::ge_op, Assoc::Left)
            | Op::postfix(Rule::in_op)
            | Op::postfix(Rule::not_in_op))
        .op(Op::infix(Rule::add_op, Assoc::Left) | Op::infix(Rule::sub_op, Assoc::Left))
        .op(Op::infix(Rule::mul_op, Assoc::Left) | Op::infix(Rule::div_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op) | Op::prefix(Rule::neg_op) | Op::prefix(Rule::pos_op))
});

impl From<pest::error::Error<Rule>> for SparqlError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let position = match err.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        SparqlError::Syntax {
            position,
            line,
            column,
            message: err.variant.message().into_owned(),
        }
    }
}

impl SparqlError {
    fn at(pair: &Pair<'_, Rule>, message: impl Into<String>) -> Self {
        let start = pair.as_span().start_pos();
        let (line, column) = start.line_col();
        SparqlError::Syntax {
            position: start.pos(),
            line,
            column,
            message: message.into(),
        }
    }

    fn unsupported(feature: impl Into<String>) -> Self {
        SparqlError::UnsupportedFeature(feature.into())
    }
}

/// Parse and validate a SPARQL query
pub fn parse_query(input: &str) -> SparqlResult<Query> {
    let unit = SparqlGrammar::parse(Rule::query_unit, input)
        .map_err(|e| {
            let err = SparqlError::from(e);
            debug!("Rejected query: {}", err);
            err
        })?
        .next()
        .ok_or_else(|| SparqlError::Syntax {
            position: 0,
            line: 1,
            column: 1,
            message: "empty query".to_string(),
        })?;

    let query = QueryWalker::default().query_unit(unit)?;
    debug!(
        "Parsed {} query with {} pattern elements",
        match query.form {
            QueryForm::Select { .. } => "SELECT",
            QueryForm::Ask => "ASK",
            QueryForm::Construct { .. } => "CONSTRUCT",
        },
        query.pattern.elements.len()
    );
    Ok(query)
}

/// Tree walker holding the prologue state
///
/// Methods take `&self` so that the Pratt parser callbacks can share it;
/// the anonymous node counter is a `Cell`.
#[derive(Default)]
struct QueryWalker {
    base: Option<String>,
    prefixes: FxHashMap<String, String>,
    next_anon: Cell<usize>,
}

type Triples = Vec<PatternTriple>;

impl QueryWalker {
    fn query_unit(mut self, unit: Pair<'_, Rule>) -> SparqlResult<Query> {
        let mut form_pair = None;
        let mut values = None;
        for inner in unit.into_inner() {
            match inner.as_rule() {
                Rule::prologue => self.prologue(inner)?,
                Rule::values_clause => values = Some(self.values_clause(inner)?),
                Rule::EOI => {}
                _ => form_pair = Some(inner),
            }
        }
        let Some(form_pair) = form_pair else {
            return Err(SparqlError::unsupported("empty query"));
        };

        let (form, pattern, modifiers) = match form_pair.as_rule() {
            Rule::select_query => self.select_query(form_pair, values.as_ref())?,
            Rule::ask_query => self.ask_query(form_pair)?,
            Rule::construct_query => self.construct_query(form_pair)?,
            Rule::describe_query => return Err(SparqlError::unsupported("DESCRIBE queries")),
            Rule::update_request => return Err(SparqlError::unsupported("SPARQL Update")),
            other => {
                return Err(SparqlError::at(
                    &form_pair,
                    format!("unexpected {:?}", other),
                ))
            }
        };

        let query = Query {
            form,
            pattern,
            modifiers,
            values,
        };
        check_order_variables(&query)?;
        Ok(query)
    }

    // Prologue

    fn prologue(&mut self, pair: Pair<'_, Rule>) -> SparqlResult<()> {
        for decl in pair.into_inner() {
            match decl.as_rule() {
                Rule::base_decl => {
                    let Some(iri) = decl.into_inner().next() else { continue };
                    let base = self.iri_ref(&iri)?;
                    self.base = Some(base.as_str().to_string());
                }
                Rule::prefix_decl => {
                    let mut inner = decl.into_inner();
                    let (Some(name), Some(iri)) = (inner.next(), inner.next()) else {
                        continue;
                    };
                    let prefix = name.as_str().trim_end_matches(':').to_string();
                    let namespace = self.iri_ref(&iri)?;
                    self.prefixes.insert(prefix, namespace.as_str().to_string());
                }
                _ => {}
            }
        }
        Ok(())
    }

    // Query forms

    fn select_query(
        &self,
        pair: Pair<'_, Rule>,
        values: Option<&ValuesBlock>,
    ) -> SparqlResult<(QueryForm, GroupPattern, SolutionModifiers)> {
        let mut select = None;
        let mut pattern = GroupPattern::default();
        let mut modifiers = SolutionModifiers::default();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::select_clause => select = Some(inner),
                Rule::dataset_clause => return Err(dataset_unsupported()),
                Rule::where_clause => pattern = self.where_clause(inner)?,
                Rule::solution_modifier => modifiers = self.solution_modifier(inner)?,
                _ => {}
            }
        }

        let mut scope = Vec::new();
        collect_group_variables(&pattern, &mut scope);
        if let Some(values) = values {
            scope.extend(values.variables.iter().cloned());
        }

        let mut modifier = SelectModifier::None;
        let mut items = Vec::new();
        let mut star = false;
        if let Some(select) = select {
            for inner in select.into_inner() {
                match inner.as_rule() {
                    Rule::select_modifier => {
                        modifier = if inner.as_str().eq_ignore_ascii_case("DISTINCT") {
                            SelectModifier::Distinct
                        } else {
                            SelectModifier::Reduced
                        };
                    }
                    Rule::select_all => star = true,
                    Rule::select_item => items.push(self.select_item(inner, &mut scope)?),
                    _ => {}
                }
            }
        }

        let projection = if star {
            Projection::All
        } else {
            Projection::Items(items)
        };
        Ok((
            QueryForm::Select {
                modifier,
                projection,
            },
            pattern,
            modifiers,
        ))
    }

    fn select_item(&self, pair: Pair<'_, Rule>, scope: &mut Vec<String>) -> SparqlResult<SelectItem> {
        let mut inner = pair.into_inner();
        let first = inner.next().ok_or_else(|| SparqlError::unsupported("empty select item"))?;
        if first.as_rule() == Rule::var {
            let name = var_name(&first);
            if !scope.iter().any(|v| v == name) {
                return Err(SparqlError::UnknownVariable(name.to_string()));
            }
            return Ok(SelectItem::Variable(name.to_string()));
        }

        let expression = self.expression(first)?;
        let Some(var) = inner.next() else {
            return Err(SparqlError::unsupported("select expression without alias"));
        };
        let name = var_name(&var);
        if scope.iter().any(|v| v == name) {
            return Err(SparqlError::at(
                &var,
                format!("variable ?{} is already in scope", name),
            ));
        }
        scope.push(name.to_string());
        Ok(SelectItem::Expression {
            expression,
            variable: name.to_string(),
        })
    }

    fn ask_query(
        &self,
        pair: Pair<'_, Rule>,
    ) -> SparqlResult<(QueryForm, GroupPattern, SolutionModifiers)> {
        let mut pattern = GroupPattern::default();
        let mut modifiers = SolutionModifiers::default();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::dataset_clause => return Err(dataset_unsupported()),
                Rule::where_clause => pattern = self.where_clause(inner)?,
                Rule::solution_modifier => modifiers = self.solution_modifier(inner)?,
                _ => {}
            }
        }
        Ok((QueryForm::Ask, pattern, modifiers))
    }

    fn construct_query(
        &self,
        pair: Pair<'_, Rule>,
    ) -> SparqlResult<(QueryForm, GroupPattern, SolutionModifiers)> {
        let mut template = Vec::new();
        let mut pattern = GroupPattern::default();
        let mut modifiers = SolutionModifiers::default();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::construct_template => {
                    if let Some(triples) = inner.into_inner().next() {
                        template = self.triples_template(triples, true)?;
                    }
                }
                Rule::construct_where => {
                    // the short form uses its template as the WHERE clause
                    if let Some(triples) = inner.into_inner().next() {
                        template = self.triples_template(triples, false)?;
                    }
                    if !template.is_empty() {
                        pattern = GroupPattern::new(vec![PatternElement::Triples(template.clone())]);
                    }
                }
                Rule::dataset_clause => return Err(dataset_unsupported()),
                Rule::where_clause => pattern = self.where_clause(inner)?,
                Rule::solution_modifier => modifiers = self.solution_modifier(inner)?,
                _ => {}
            }
        }
        Ok((QueryForm::Construct { template }, pattern, modifiers))
    }

    fn triples_template(&self, pair: Pair<'_, Rule>, template: bool) -> SparqlResult<Triples> {
        let mut out = Vec::new();
        for triples in pair.into_inner() {
            self.triples_same_subject(triples, template, &mut out)?;
        }
        Ok(out)
    }

    fn where_clause(&self, pair: Pair<'_, Rule>) -> SparqlResult<GroupPattern> {
        match pair.into_inner().next() {
            Some(group) => self.group_graph_pattern(group),
            None => Ok(GroupPattern::default()),
        }
    }

    // Solution modifiers

    fn solution_modifier(&self, pair: Pair<'_, Rule>) -> SparqlResult<SolutionModifiers> {
        let mut modifiers = SolutionModifiers::default();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::group_clause => return Err(SparqlError::unsupported("GROUP BY")),
                Rule::having_clause => return Err(SparqlError::unsupported("HAVING")),
                Rule::order_clause => {
                    for condition in inner.into_inner() {
                        modifiers.order_by.push(self.order_condition(condition)?);
                    }
                }
                Rule::limit_clause => modifiers.limit = Some(unsigned(inner)?),
                Rule::offset_clause => modifiers.offset = unsigned(inner)?,
                _ => {}
            }
        }
        Ok(modifiers)
    }

    fn order_condition(&self, pair: Pair<'_, Rule>) -> SparqlResult<OrderCondition> {
        let mut ascending = true;
        let mut expression = None;
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::order_direction {
                ascending = inner.as_str().eq_ignore_ascii_case("ASC");
            } else {
                expression = Some(self.primary(inner)?);
            }
        }
        let expression =
            expression.ok_or_else(|| SparqlError::unsupported("empty ORDER BY condition"))?;
        Ok(OrderCondition {
            expression,
            ascending,
        })
    }

    // VALUES

    fn values_clause(&self, pair: Pair<'_, Rule>) -> SparqlResult<ValuesBlock> {
        match pair.into_inner().next() {
            Some(block) => self.data_block(block),
            None => Ok(ValuesBlock {
                variables: Vec::new(),
                rows: Vec::new(),
            }),
        }
    }

    fn data_block(&self, pair: Pair<'_, Rule>) -> SparqlResult<ValuesBlock> {
        let one_var = pair.as_rule() == Rule::inline_data_one_var;
        let mut variables = Vec::new();
        let mut rows = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::var => variables.push(var_name(&inner).to_string()),
                Rule::values_row => {
                    let row_pair = inner.clone();
                    let row = inner
                        .into_inner()
                        .map(|value| self.data_value(value))
                        .collect::<SparqlResult<Vec<_>>>()?;
                    if row.len() != variables.len() {
                        return Err(SparqlError::at(
                            &row_pair,
                            format!(
                                "VALUES row has {} values for {} variables",
                                row.len(),
                                variables.len()
                            ),
                        ));
                    }
                    rows.push(row);
                }
                _ if one_var => rows.push(vec![self.data_value(inner)?]),
                _ => {}
            }
        }
        Ok(ValuesBlock { variables, rows })
    }

    fn data_value(&self, pair: Pair<'_, Rule>) -> SparqlResult<Option<RdfTerm>> {
        if pair.as_rule() == Rule::undef {
            return Ok(None);
        }
        self.term(&pair).map(Some)
    }

    // Graph patterns

    fn group_graph_pattern(&self, pair: Pair<'_, Rule>) -> SparqlResult<GroupPattern> {
        let Some(inner) = pair.into_inner().next() else {
            return Ok(GroupPattern::default());
        };
        if inner.as_rule() == Rule::sub_select {
            return Err(SparqlError::unsupported("sub-queries"));
        }

        let mut elements: Vec<PatternElement> = Vec::new();
        for part in inner.into_inner() {
            let element = match part.as_rule() {
                Rule::triples_block => {
                    let mut triples = Vec::new();
                    for same_subject in part.into_inner() {
                        self.triples_same_subject(same_subject, false, &mut triples)?;
                    }
                    if let Some(PatternElement::Triples(previous)) = elements.last_mut() {
                        previous.extend(triples);
                        continue;
                    }
                    PatternElement::Triples(triples)
                }
                Rule::group_or_union_graph_pattern => {
                    let mut branches = part
                        .into_inner()
                        .map(|group| self.group_graph_pattern(group))
                        .collect::<SparqlResult<Vec<_>>>()?;
                    if branches.len() == 1 {
                        PatternElement::Group(branches.remove(0))
                    } else {
                        PatternElement::Union(branches)
                    }
                }
                Rule::optional_graph_pattern => {
                    PatternElement::Optional(self.first_group(part)?)
                }
                Rule::minus_graph_pattern => PatternElement::Minus(self.first_group(part)?),
                Rule::graph_graph_pattern => {
                    return Err(SparqlError::unsupported("GRAPH patterns"))
                }
                Rule::service_graph_pattern => {
                    return Err(SparqlError::unsupported("SERVICE federation"))
                }
                Rule::filter => {
                    let Some(constraint) = part.into_inner().next() else { continue };
                    PatternElement::Filter(self.primary(constraint)?)
                }
                Rule::bind => {
                    let mut inner = part.into_inner();
                    let (Some(expr), Some(var)) = (inner.next(), inner.next()) else {
                        continue;
                    };
                    let expression = self.expression(expr)?;
                    let name = var_name(&var);
                    let mut bound = Vec::new();
                    collect_group_variables(&GroupPattern::new(elements.clone()), &mut bound);
                    if bound.iter().any(|v| v == name) {
                        return Err(SparqlError::at(
                            &var,
                            format!("BIND target ?{} is already in scope", name),
                        ));
                    }
                    PatternElement::Bind {
                        expression,
                        variable: name.to_string(),
                    }
                }
                Rule::inline_data => match part.into_inner().next() {
                    Some(block) => PatternElement::Values(self.data_block(block)?),
                    None => continue,
                },
                _ => continue,
            };
            elements.push(element);
        }
        Ok(GroupPattern::new(elements))
    }

    fn first_group(&self, pair: Pair<'_, Rule>) -> SparqlResult<GroupPattern> {
        match pair.into_inner().find(|p| p.as_rule() == Rule::group_graph_pattern) {
            Some(group) => self.group_graph_pattern(group),
            None => Ok(GroupPattern::default()),
        }
    }

    // Triples

    fn triples_same_subject(
        &self,
        pair: Pair<'_, Rule>,
        template: bool,
        out: &mut Triples,
    ) -> SparqlResult<()> {
        let mut inner = pair.into_inner();
        let Some(subject) = inner.next() else {
            return Ok(());
        };
        let subject = self.node(subject, template, out)?;
        if let Some(properties) = inner.next() {
            self.property_list(properties, &subject, template, out)?;
        }
        Ok(())
    }

    fn property_list(
        &self,
        pair: Pair<'_, Rule>,
        subject: &TermPattern,
        template: bool,
        out: &mut Triples,
    ) -> SparqlResult<()> {
        let mut inner = pair.into_inner();
        while let Some(verb) = inner.next() {
            let predicate = self.verb(verb)?;
            let Some(objects) = inner.next() else { break };
            for object in objects.into_inner() {
                let object = self.node(object, template, out)?;
                out.push(PatternTriple::new(
                    subject.clone(),
                    predicate.clone(),
                    object,
                ));
            }
        }
        Ok(())
    }

    fn verb(&self, pair: Pair<'_, Rule>) -> SparqlResult<TermPattern> {
        match pair.as_rule() {
            Rule::var => Ok(TermPattern::Variable(var_name(&pair).to_string())),
            Rule::path => self.simple_path(pair).map(|iri| TermPattern::Term(iri.into())),
            other => Err(SparqlError::at(&pair, format!("unexpected {:?}", other))),
        }
    }

    /// A path made of a single IRI (or `a`), anything else is a property path
    fn simple_path(&self, pair: Pair<'_, Rule>) -> SparqlResult<NamedNode> {
        let path_error = || SparqlError::unsupported("property paths");
        let mut sequences = pair.into_inner();
        let (Some(sequence), None) = (sequences.next(), sequences.next()) else {
            return Err(path_error());
        };
        let mut elements = sequence.into_inner();
        let (Some(element), None) = (elements.next(), elements.next()) else {
            return Err(path_error());
        };
        let mut parts = element.into_inner();
        let (Some(primary), None) = (parts.next(), parts.next()) else {
            return Err(path_error());
        };
        if primary.as_rule() != Rule::path_primary {
            return Err(path_error());
        }
        let Some(item) = primary.into_inner().next() else {
            return Err(path_error());
        };
        match item.as_rule() {
            Rule::rdf_type => Ok(NamedNode::new_unchecked(vocab::RDF_TYPE)),
            Rule::IRIREF | Rule::PNAME_LN | Rule::PNAME_NS => self.iri(&item),
            Rule::path => self.simple_path(item),
            _ => Err(path_error()),
        }
    }

    fn node(&self, pair: Pair<'_, Rule>, template: bool, out: &mut Triples) -> SparqlResult<TermPattern> {
        match pair.as_rule() {
            Rule::var => Ok(TermPattern::Variable(var_name(&pair).to_string())),
            Rule::BLANK_NODE_LABEL => {
                let label = pair.as_str().trim_start_matches("_:");
                Ok(self.blank(label, template))
            }
            Rule::ANON => Ok(self.anonymous(template)),
            Rule::nil => Ok(TermPattern::Term(NamedNode::new_unchecked(vocab::RDF_NIL).into())),
            Rule::blank_node_property_list => {
                let node = self.anonymous(template);
                if let Some(properties) = pair.into_inner().next() {
                    self.property_list(properties, &node, template, out)?;
                }
                Ok(node)
            }
            Rule::collection => {
                let items = pair
                    .into_inner()
                    .map(|item| self.node(item, template, out))
                    .collect::<SparqlResult<Vec<_>>>()?;
                let first = TermPattern::Term(NamedNode::new_unchecked(vocab::RDF_FIRST).into());
                let rest = TermPattern::Term(NamedNode::new_unchecked(vocab::RDF_REST).into());
                let mut tail = TermPattern::Term(NamedNode::new_unchecked(vocab::RDF_NIL).into());
                // cells are linked back to front
                let cells: Vec<TermPattern> = items.iter().map(|_| self.anonymous(template)).collect();
                for (cell, item) in cells.iter().zip(items).rev() {
                    out.push(PatternTriple::new(cell.clone(), first.clone(), item));
                    out.push(PatternTriple::new(cell.clone(), rest.clone(), tail));
                    tail = cell.clone();
                }
                Ok(tail)
            }
            _ => self.term(&pair).map(TermPattern::Term),
        }
    }

    fn blank(&self, label: &str, template: bool) -> TermPattern {
        if template {
            TermPattern::BlankNode(label.to_string())
        } else {
            TermPattern::Variable(format!("_:{}", label))
        }
    }

    fn anonymous(&self, template: bool) -> TermPattern {
        let n = self.next_anon.get();
        self.next_anon.set(n + 1);
        // `~` cannot appear in a written label
        self.blank(&format!("~{}", n), template)
    }

    // Expressions

    fn expression(&self, pair: Pair<'_, Rule>) -> SparqlResult<Expression> {
        PRATT_PARSER
            .map_primary(|primary| self.primary(primary))
            .map_prefix(|op, expr| {
                let op = match op.as_rule() {
                    Rule::not_op => UnaryOp::Not,
                    Rule::neg_op => UnaryOp::Minus,
                    _ => UnaryOp::Plus,
                };
                Ok(Expression::unary(op, expr?))
            })
            .map_postfix(|expr, op| {
                let negated = op.as_rule() == Rule::not_in_op;
                let list = match op.into_inner().next() {
                    Some(list) => list
                        .into_inner()
                        .filter(|p| p.as_rule() == Rule::expression)
                        .map(|p| self.expression(p))
                        .collect::<SparqlResult<Vec<_>>>()?,
                    None => Vec::new(),
                };
                Ok(Expression::In {
                    expr: Box::new(expr?),
                    list,
                    negated,
                })
            })
            .map_infix(|left, op, right| {
                let op = match op.as_rule() {
                    Rule::or_op => BinaryOp::Or,
                    Rule::and_op => BinaryOp::And,
                    Rule::eq_op => BinaryOp::Eq,
                    Rule::ne_op => BinaryOp::Ne,
                    Rule::lt_op => BinaryOp::Lt,
                    Rule::gt_op => BinaryOp::Gt,
                    Rule::le_op => BinaryOp::Le,
                    Rule::ge_op => BinaryOp::Ge,
                    Rule::add_op => BinaryOp::Add,
                    Rule::sub_op => BinaryOp::Sub,
                    Rule::mul_op => BinaryOp::Mul,
                    Rule::div_op => BinaryOp::Div,
                    other => {
                        return Err(SparqlError::at(&op, format!("unexpected operator {:?}", other)))
                    }
                };
                Ok(Expression::binary(left?, op, right?))
            })
            .parse(pair.into_inner())
    }

    fn primary(&self, pair: Pair<'_, Rule>) -> SparqlResult<Expression> {
        match pair.as_rule() {
            Rule::expression => self.expression(pair),
            Rule::var => Ok(Expression::Variable(var_name(&pair).to_string())),
            Rule::exists_func | Rule::not_exists_func => {
                let negated = pair.as_rule() == Rule::not_exists_func;
                Ok(Expression::Exists {
                    pattern: self.first_group(pair)?,
                    negated,
                })
            }
            Rule::aggregate => Err(SparqlError::unsupported("aggregate functions")),
            Rule::builtin_call => self.builtin_call(pair),
            Rule::iri_or_function => self.iri_or_function(pair),
            _ => self.term(&pair).map(Expression::Constant),
        }
    }

    fn builtin_call(&self, pair: Pair<'_, Rule>) -> SparqlResult<Expression> {
        let call = pair.clone();
        let mut inner = pair.into_inner();
        let name = inner.next().map_or("", |n| n.as_str());
        let function = Function::from_name(name)
            .ok_or_else(|| SparqlError::unsupported(format!("function {}", name.to_uppercase())))?;
        let args = inner
            .filter(|p| p.as_rule() == Rule::expression)
            .map(|p| self.expression(p))
            .collect::<SparqlResult<Vec<_>>>()?;

        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(SparqlError::at(
                &call,
                format!("wrong number of arguments for {}", name.to_uppercase()),
            ));
        }
        if function == Function::Bound && !matches!(args[0], Expression::Variable(_)) {
            return Err(SparqlError::at(&call, "BOUND expects a variable"));
        }
        Ok(Expression::Function { function, args })
    }

    fn iri_or_function(&self, pair: Pair<'_, Rule>) -> SparqlResult<Expression> {
        let call = pair.clone();
        let mut inner = pair.into_inner();
        let Some(iri) = inner.next() else {
            return Err(SparqlError::at(&call, "expected IRI"));
        };
        let iri = self.iri(&iri)?;
        let Some(arg_list) = inner.next() else {
            return Ok(Expression::Constant(iri.into()));
        };

        let target = match iri.as_str() {
            vocab::XSD_STRING => CastTarget::String,
            vocab::XSD_INTEGER => CastTarget::Integer,
            vocab::XSD_DECIMAL => CastTarget::Decimal,
            vocab::XSD_DOUBLE => CastTarget::Double,
            vocab::XSD_BOOLEAN => CastTarget::Boolean,
            other => return Err(SparqlError::unsupported(format!("function <{}>", other))),
        };
        let args = arg_list
            .into_inner()
            .filter(|p| p.as_rule() == Rule::expression)
            .map(|p| self.expression(p))
            .collect::<SparqlResult<Vec<_>>>()?;
        if args.len() != 1 {
            return Err(SparqlError::at(&call, "cast functions take one argument"));
        }
        Ok(Expression::Function {
            function: Function::Cast(target),
            args,
        })
    }

    // Terms

    fn term(&self, pair: &Pair<'_, Rule>) -> SparqlResult<RdfTerm> {
        let text = pair.as_str();
        let term = match pair.as_rule() {
            Rule::IRIREF | Rule::PNAME_LN | Rule::PNAME_NS => self.iri(pair)?.into(),
            Rule::rdf_literal => self.rdf_literal(pair)?.into(),
            Rule::INTEGER => typed(text, vocab::XSD_INTEGER).into(),
            Rule::DECIMAL => typed(text, vocab::XSD_DECIMAL).into(),
            Rule::DOUBLE => typed(text, vocab::XSD_DOUBLE).into(),
            Rule::boolean_literal => Literal::from_bool(text.eq_ignore_ascii_case("true")).into(),
            other => return Err(SparqlError::at(pair, format!("expected a term, found {:?}", other))),
        };
        Ok(term)
    }

    fn rdf_literal(&self, pair: &Pair<'_, Rule>) -> SparqlResult<Literal> {
        let mut inner = pair.clone().into_inner();
        let Some(string) = inner.next() else {
            return Ok(Literal::new_simple_literal(""));
        };
        let raw = string.clone().into_inner().next().map_or("", |c| c.as_str());
        let value = unescape(raw).map_err(|e| SparqlError::at(&string, e.to_string()))?;

        match inner.next() {
            None => Ok(Literal::new_simple_literal(value.as_ref())),
            Some(tag) if tag.as_rule() == Rule::LANGTAG => {
                Literal::new_language_tagged_literal(value.as_ref(), &tag.as_str()[1..])
                    .map_err(|e| SparqlError::at(&tag, e.to_string()))
            }
            Some(datatype) => Literal::try_typed_literal(value.as_ref(), self.iri(&datatype)?)
                .map_err(|e| SparqlError::at(&datatype, e.to_string())),
        }
    }

    fn iri(&self, pair: &Pair<'_, Rule>) -> SparqlResult<NamedNode> {
        match pair.as_rule() {
            Rule::IRIREF => self.iri_ref(pair),
            Rule::PNAME_LN | Rule::PNAME_NS => self.prefixed_name(pair),
            other => Err(SparqlError::at(pair, format!("expected IRI, found {:?}", other))),
        }
    }

    fn iri_ref(&self, pair: &Pair<'_, Rule>) -> SparqlResult<NamedNode> {
        let raw = pair.clone().into_inner().next().map_or("", |c| c.as_str());
        let iri = unescape_iri(raw).map_err(|e| SparqlError::at(pair, e.to_string()))?;
        let resolved = if is_absolute_iri(&iri) {
            iri.into_owned()
        } else {
            let Some(base) = &self.base else {
                return Err(SparqlError::at(
                    pair,
                    format!("relative IRI <{}> without a base IRI", iri),
                ));
            };
            resolve_iri(base, &iri).map_err(|e| SparqlError::at(pair, e.to_string()))?
        };
        NamedNode::new(&resolved).map_err(|e| SparqlError::at(pair, e.to_string()))
    }

    fn prefixed_name(&self, pair: &Pair<'_, Rule>) -> SparqlResult<NamedNode> {
        let text = pair.as_str();
        let (prefix, local) = text.split_once(':').unwrap_or((text, ""));
        let Some(namespace) = self.prefixes.get(prefix) else {
            return Err(SparqlError::at(pair, format!("undefined prefix '{}:'", prefix)));
        };
        let iri = format!("{}{}", namespace, unescape_local_name(local));
        NamedNode::new(&iri).map_err(|e| SparqlError::at(pair, e.to_string()))
    }
}

fn var_name<'i>(pair: &Pair<'i, Rule>) -> &'i str {
    let text = pair.as_str();
    text.get(1..).unwrap_or(text)
}

fn unsigned(pair: Pair<'_, Rule>) -> SparqlResult<usize> {
    let Some(number) = pair.clone().into_inner().next() else {
        return Err(SparqlError::at(&pair, "expected a number"));
    };
    number
        .as_str()
        .parse()
        .map_err(|_| SparqlError::at(&number, "number out of range"))
}

fn typed(lexical_form: &str, datatype: &'static str) -> Literal {
    Literal::new_typed_literal(lexical_form, NamedNode::new_unchecked(datatype))
}

fn dataset_unsupported() -> SparqlError {
    SparqlError::unsupported("FROM / FROM NAMED dataset clauses")
}

fn unescape_local_name(local: &str) -> String {
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
    out
}

/// ORDER BY may only use variables the pattern or a SELECT expression binds
fn check_order_variables(query: &Query) -> SparqlResult<()> {
    if query.modifiers.order_by.is_empty() {
        return Ok(());
    }
    let mut scope = Vec::new();
    collect_group_variables(&query.pattern, &mut scope);
    if let Some(values) = &query.values {
        scope.extend(values.variables.iter().cloned());
    }
    if let QueryForm::Select {
        projection: Projection::Items(items),
        ..
    } = &query.form
    {
        scope.extend(items.iter().map(|item| item.variable().to_string()));
    }

    let mut unknown = None;
    for condition in &query.modifiers.order_by {
        condition.expression.visit_variables(&mut |name| {
            if unknown.is_none() && !scope.iter().any(|v| v == name) {
                unknown = Some(name.to_string());
            }
        });
    }
    match unknown {
        Some(name) => Err(SparqlError::UnknownVariable(name)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_items(query: &Query) -> Vec<String> {
        match &query.form {
            QueryForm::Select {
                projection: Projection::Items(items),
                ..
            } => items.iter().map(|i| i.variable().to_string()).collect(),
            _ => Vec::new(),
        }
    }

    fn triples(query: &Query) -> Vec<PatternTriple> {
        match query.pattern.elements.first() {
            Some(PatternElement::Triples(triples)) => triples.clone(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_parse_simple_select() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/>\nSELECT ?s ?o WHERE { ?s ex:knows ?o . }",
        )
        .unwrap();
        assert_eq!(select_items(&query), vec!["s", "o"]);
        let bgp = triples(&query);
        assert_eq!(bgp.len(), 1);
        assert_eq!(
            bgp[0].predicate,
            TermPattern::Term(NamedNode::new_unchecked("http://example.org/knows").into())
        );
    }

    #[test]
    fn test_parse_property_and_object_lists() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/>
             SELECT * { ?s a ex:Person ; ex:name ?n , ?m }",
        )
        .unwrap();
        let bgp = triples(&query);
        assert_eq!(bgp.len(), 3);
        assert_eq!(
            bgp[0].predicate,
            TermPattern::Term(NamedNode::new_unchecked(vocab::RDF_TYPE).into())
        );
        assert_eq!(query.projected_variables(), vec!["s", "n", "m"]);
    }

    #[test]
    fn test_blank_nodes_become_hidden_variables() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/>
             SELECT * WHERE { _:x ex:p ?o . [ ex:q ?v ] ex:r ( 1 2 ) }",
        )
        .unwrap();
        assert_eq!(query.projected_variables(), vec!["o", "v"]);
        // 1 + 1 + 1 + two list cells
        assert_eq!(triples(&query).len(), 7);
    }

    #[test]
    fn test_expression_precedence() {
        let query = parse_query("SELECT ?x WHERE { ?x ?p ?v FILTER(?v > 1 + 2 * 3 || !BOUND(?x)) }")
            .unwrap();
        let Some(PatternElement::Filter(Expression::Binary { op, left, .. })) =
            query.pattern.elements.get(1)
        else {
            panic!("expected filter");
        };
        assert_eq!(*op, BinaryOp::Or);
        let Expression::Binary { op: cmp, right, .. } = left.as_ref() else {
            panic!("expected comparison");
        };
        assert_eq!(*cmp, BinaryOp::Gt);
        assert!(matches!(right.as_ref(), Expression::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_in_and_exists() {
        let query = parse_query(
            "SELECT ?x WHERE { ?x ?p ?o FILTER(?o NOT IN (1, 2)) FILTER NOT EXISTS { ?o ?p ?x } }",
        )
        .unwrap();
        assert!(matches!(
            query.pattern.elements[1],
            PatternElement::Filter(Expression::In { negated: true, .. })
        ));
        assert!(matches!(
            query.pattern.elements[2],
            PatternElement::Filter(Expression::Exists { negated: true, .. })
        ));
    }

    #[test]
    fn test_parse_modifiers() {
        let query =
            parse_query("SELECT DISTINCT ?x WHERE { ?x ?p ?o } ORDER BY DESC(?o) ?x LIMIT 5 OFFSET 2")
                .unwrap();
        assert_eq!(query.modifiers.limit, Some(5));
        assert_eq!(query.modifiers.offset, 2);
        assert_eq!(query.modifiers.order_by.len(), 2);
        assert!(!query.modifiers.order_by[0].ascending);
        assert!(matches!(
            query.form,
            QueryForm::Select {
                modifier: SelectModifier::Distinct,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_construct_and_ask() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/>
             CONSTRUCT { ?s ex:linked _:n . _:n ex:to ?o } WHERE { ?s ex:p ?o }",
        )
        .unwrap();
        let QueryForm::Construct { template } = &query.form else {
            panic!("expected CONSTRUCT");
        };
        assert_eq!(template[0].object, TermPattern::BlankNode("n".into()));

        let short = parse_query("CONSTRUCT WHERE { ?s ?p ?o }").unwrap();
        assert_eq!(triples(&short).len(), 1);

        let ask = parse_query("ASK { ?s ?p ?o }").unwrap();
        assert_eq!(ask.form, QueryForm::Ask);
    }

    #[test]
    fn test_parse_optional_union_minus_bind_values() {
        let query = parse_query(
            "PREFIX ex: <http://example.org/>
             SELECT ?s ?label ?kind WHERE {
                 ?s ex:p ?o .
                 OPTIONAL { ?s ex:label ?label }
                 { ?s a ex:A } UNION { ?s a ex:B }
                 MINUS { ?s ex:hidden true }
                 BIND(STR(?o) AS ?kind)
                 VALUES ?o { 1 2 UNDEF }
             }",
        )
        .unwrap();
        let kinds: Vec<_> = query
            .pattern
            .elements
            .iter()
            .map(std::mem::discriminant)
            .collect();
        assert_eq!(kinds.len(), 6);
        let Some(PatternElement::Values(values)) = query.pattern.elements.last() else {
            panic!("expected VALUES");
        };
        assert_eq!(values.rows.len(), 3);
        assert_eq!(values.rows[2], vec![None]);
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_query("SELECT ?x WHERE {\n  ?x ?p }").unwrap_err();
        match err {
            SparqlError::Syntax { line, column, .. } => {
                assert_eq!(line, 2);
                assert!(column > 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_variables() {
        assert!(matches!(
            parse_query("SELECT ?y WHERE { ?x ?p ?o }"),
            Err(SparqlError::UnknownVariable(name)) if name == "y"
        ));
        assert!(matches!(
            parse_query("SELECT ?x WHERE { ?x ?p ?o } ORDER BY ?z"),
            Err(SparqlError::UnknownVariable(name)) if name == "z"
        ));
        // aliases are visible to ORDER BY
        assert!(parse_query("SELECT (STR(?o) AS ?t) WHERE { ?x ?p ?o } ORDER BY ?t").is_ok());
    }

    #[test]
    fn test_unsupported_features() {
        let cases = [
            "SELECT ?s WHERE { ?s <http://example.org/p>+ ?o }",
            "SELECT ?s WHERE { ?s <http://example.org/p>/<http://example.org/q> ?o }",
            "SELECT ?s FROM <http://example.org/g> WHERE { ?s ?p ?o }",
            "SELECT ?s WHERE { GRAPH ?g { ?s ?p ?o } }",
            "SELECT ?s WHERE { SERVICE <http://example.org/sparql> { ?s ?p ?o } }",
            "DESCRIBE <http://example.org/s>",
            "INSERT DATA { <http://example.org/s> <http://example.org/p> 1 }",
            "SELECT ?s WHERE { ?s ?p ?o } GROUP BY ?s",
            "SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }",
            "SELECT ?s WHERE { { SELECT ?s WHERE { ?s ?p ?o } } }",
            "SELECT ?s WHERE { ?s ?p ?o FILTER(NOW() > 1) }",
        ];
        for case in cases {
            assert!(
                matches!(parse_query(case), Err(SparqlError::UnsupportedFeature(_))),
                "{case}"
            );
        }
    }

    #[test]
    fn test_relative_iris_and_prefixes() {
        let query = parse_query("BASE <http://example.org/a/>\nSELECT ?s WHERE { ?s <../p> ?o }").unwrap();
        assert_eq!(
            triples(&query)[0].predicate,
            TermPattern::Term(NamedNode::new_unchecked("http://example.org/p").into())
        );

        assert!(matches!(
            parse_query("SELECT ?s WHERE { ?s <p> ?o }"),
            Err(SparqlError::Syntax { .. })
        ));
        assert!(matches!(
            parse_query("SELECT ?s WHERE { ?s ex:p ?o }"),
            Err(SparqlError::Syntax { message, .. }) if message.contains("undefined prefix")
        ));
    }

    #[test]
    fn test_bind_target_must_be_fresh() {
        assert!(matches!(
            parse_query("SELECT ?o WHERE { ?s ?p ?o BIND(1 AS ?o) }"),
            Err(SparqlError::Syntax { .. })
        ));
    }
}
