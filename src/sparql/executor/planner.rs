//! Query planner - converts a parsed query into a physical operator tree
//!
//! Group patterns are planned left to right. Adjacent triple patterns form
//! a basic graph pattern that the optimizer reorders; filters of a group
//! apply to the whole group, so they are placed on top of it.

use crate::sparql::ast::*;
use crate::sparql::executor::operator::*;
use crate::sparql::executor::{ExecutionError, ExecutionResult, Solution, VariableTable};
use crate::sparql::optimizer::SparqlOptimizer;
use rustc_hash::FxHashSet;
use tracing::debug;

/// Execution plan: the root operator plus the columns it produces
pub struct ExecutionPlan<'q> {
    pub root: OperatorBox<'q>,
    /// Projected variable names, in result order
    pub output_columns: Vec<String>,
    /// Slot of each output column
    pub output_slots: Vec<usize>,
}

/// Query planner
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build the operator tree for a whole query
    pub fn plan<'q>(
        &self,
        query: &'q Query,
        variables: &'q VariableTable,
    ) -> ExecutionResult<ExecutionPlan<'q>> {
        let seed = Solution::new(variables.len());
        let mut root = plan_group(&query.pattern, seed, variables)?;

        if let Some(values) = &query.values {
            root = Box::new(ValuesOperator::new(root, values_rows(values, variables)?));
        }

        let output_columns: Vec<String> = match &query.form {
            QueryForm::Select { .. } => query.projected_variables(),
            QueryForm::Ask | QueryForm::Construct { .. } => Vec::new(),
        };
        let output_slots = output_columns
            .iter()
            .map(|name| slot_of(variables, name))
            .collect::<ExecutionResult<Vec<_>>>()?;

        match &query.form {
            QueryForm::Ask => {
                debug!("Planned ASK query");
            }
            QueryForm::Select {
                modifier,
                projection,
            } => {
                if let Projection::Items(items) = projection {
                    for item in items {
                        if let SelectItem::Expression {
                            expression,
                            variable,
                        } = item
                        {
                            let slot = slot_of(variables, variable)?;
                            root = Box::new(ExtendOperator::new(root, expression, slot));
                        }
                    }
                }
                if !query.modifiers.order_by.is_empty() {
                    root = Box::new(SortOperator::new(root, &query.modifiers.order_by));
                }
                root = Box::new(ProjectOperator::new(root, output_slots.clone()));
                if *modifier != SelectModifier::None {
                    root = Box::new(DistinctOperator::new(root));
                }
                root = slice(root, &query.modifiers);
                debug!(
                    "Planned SELECT query with {} output columns ({:?})",
                    output_columns.len(),
                    modifier
                );
            }
            QueryForm::Construct { template } => {
                if !query.modifiers.order_by.is_empty() {
                    root = Box::new(SortOperator::new(root, &query.modifiers.order_by));
                }
                root = slice(root, &query.modifiers);
                debug!("Planned CONSTRUCT query with {} template triples", template.len());
            }
        }

        Ok(ExecutionPlan {
            root,
            output_columns,
            output_slots,
        })
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

fn slice<'q>(mut root: OperatorBox<'q>, modifiers: &SolutionModifiers) -> OperatorBox<'q> {
    if modifiers.offset > 0 {
        root = Box::new(SkipOperator::new(root, modifiers.offset));
    }
    if let Some(limit) = modifiers.limit {
        root = Box::new(LimitOperator::new(root, limit));
    }
    root
}

fn slot_of(variables: &VariableTable, name: &str) -> ExecutionResult<usize> {
    variables
        .slot(name)
        .ok_or_else(|| ExecutionError::VariableNotFound(name.to_string()))
}

fn values_rows(values: &ValuesBlock, variables: &VariableTable) -> ExecutionResult<Vec<Solution>> {
    let slots = values
        .variables
        .iter()
        .map(|name| slot_of(variables, name))
        .collect::<ExecutionResult<Vec<_>>>()?;
    Ok(values
        .rows
        .iter()
        .map(|row| {
            let mut solution = Solution::new(variables.len());
            for (slot, value) in slots.iter().zip(row) {
                if let Some(term) = value {
                    solution.set(*slot, term.clone());
                }
            }
            solution
        })
        .collect())
}

/// Plan one group graph pattern, starting from `seed`
///
/// Variables bound in the seed count as fixed when the basic graph
/// patterns of the group are ordered.
pub fn plan_group<'q>(
    group: &'q GroupPattern,
    seed: Solution,
    variables: &'q VariableTable,
) -> ExecutionResult<OperatorBox<'q>> {
    let mut bound: FxHashSet<&'q str> = seed
        .bound_slots()
        .filter_map(|slot| variables.name(slot))
        .collect();
    let mut root: OperatorBox<'q> = Box::new(SeedOperator::new(vec![seed]));
    let mut pending: Vec<&'q PatternTriple> = Vec::new();
    let mut filters: Vec<&'q Expression> = Vec::new();

    for element in &group.elements {
        if let PatternElement::Triples(triples) = element {
            pending.extend(triples);
            continue;
        }
        if let PatternElement::Filter(expression) = element {
            filters.push(expression);
            continue;
        }
        root = flush_bgp(root, &mut pending, &mut bound, variables)?;

        root = match element {
            PatternElement::Optional(inner) => {
                add_bindings(inner, &mut bound);
                Box::new(OptionalOperator::new(root, inner))
            }
            PatternElement::Union(branches) => {
                for branch in branches {
                    add_bindings(branch, &mut bound);
                }
                Box::new(UnionOperator::new(root, branches.iter().collect()))
            }
            PatternElement::Group(inner) => {
                add_bindings(inner, &mut bound);
                Box::new(UnionOperator::new(root, vec![inner]))
            }
            PatternElement::Minus(inner) => Box::new(MinusOperator::new(root, inner)),
            PatternElement::Bind {
                expression,
                variable,
            } => {
                let slot = slot_of(variables, variable)?;
                bound.insert(variable.as_str());
                Box::new(ExtendOperator::new(root, expression, slot))
            }
            PatternElement::Values(values) => {
                for name in &values.variables {
                    bound.insert(name.as_str());
                }
                Box::new(ValuesOperator::new(root, values_rows(values, variables)?))
            }
            PatternElement::Triples(_) | PatternElement::Filter(_) => root,
        };
    }
    root = flush_bgp(root, &mut pending, &mut bound, variables)?;

    for expression in filters {
        root = Box::new(FilterOperator::new(root, expression));
    }
    Ok(root)
}

fn flush_bgp<'q>(
    mut root: OperatorBox<'q>,
    pending: &mut Vec<&'q PatternTriple>,
    bound: &mut FxHashSet<&'q str>,
    variables: &VariableTable,
) -> ExecutionResult<OperatorBox<'q>> {
    if pending.is_empty() {
        return Ok(root);
    }
    let ordered = SparqlOptimizer::new().order_patterns(pending, bound);
    pending.clear();
    for pattern in ordered {
        for position in pattern.positions() {
            if let TermPattern::Variable(name) = position {
                bound.insert(name.as_str());
            }
        }
        root = Box::new(TripleScanOperator::new(root, pattern, variables)?);
    }
    Ok(root)
}

/// Record the variables a nested pattern may bind, for later join ordering
fn add_bindings<'q>(group: &'q GroupPattern, bound: &mut FxHashSet<&'q str>) {
    for element in &group.elements {
        match element {
            PatternElement::Triples(triples) => {
                for triple in triples {
                    for position in triple.positions() {
                        if let TermPattern::Variable(name) = position {
                            bound.insert(name.as_str());
                        }
                    }
                }
            }
            PatternElement::Optional(inner) | PatternElement::Group(inner) => {
                add_bindings(inner, bound)
            }
            PatternElement::Union(branches) => {
                for branch in branches {
                    add_bindings(branch, bound);
                }
            }
            PatternElement::Bind { variable, .. } => {
                bound.insert(variable.as_str());
            }
            PatternElement::Values(values) => {
                bound.extend(values.variables.iter().map(String::as_str));
            }
            PatternElement::Filter(_) | PatternElement::Minus(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{Literal, NamedNode, RdfTerm, Triple, TripleStore};
    use crate::sparql::executor::QueryContext;
    use crate::sparql::parse_query;

    fn ex(local: &str) -> RdfTerm {
        NamedNode::new_unchecked(format!("http://example.org/{}", local)).into()
    }

    fn store() -> TripleStore {
        let mut store = TripleStore::new();
        let triples = [
            (ex("alice"), ex("knows"), ex("bob")),
            (ex("bob"), ex("knows"), ex("carol")),
            (ex("alice"), ex("age"), Literal::from_integer(30).into()),
            (ex("bob"), ex("age"), Literal::from_integer(25).into()),
        ];
        for (s, p, o) in triples {
            store.add(&Triple::from_terms(s, p, o).unwrap());
        }
        store
    }

    fn run(store: &TripleStore, text: &str) -> Vec<Vec<Option<RdfTerm>>> {
        let query = parse_query(text).unwrap();
        let variables = VariableTable::from_query(&query);
        let mut plan = QueryPlanner::new().plan(&query, &variables).unwrap();
        let ctx = QueryContext::new(store, &variables);
        drain(&mut plan.root, &ctx)
            .unwrap()
            .into_iter()
            .map(|row| plan.output_slots.iter().map(|&slot| row.get(slot).cloned()).collect())
            .collect()
    }

    #[test]
    fn test_join_and_order() {
        let store = store();
        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?a ?c WHERE { ?a ex:knows ?b . ?b ex:knows ?c }",
        );
        assert_eq!(rows, vec![vec![Some(ex("alice")), Some(ex("carol"))]]);

        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { ?p ex:age ?age } ORDER BY DESC(?age) LIMIT 1",
        );
        assert_eq!(rows, vec![vec![Some(ex("alice"))]]);
    }

    #[test]
    fn test_optional_keeps_unmatched() {
        let store = store();
        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p ?friend WHERE { ?p ex:age ?age OPTIONAL { ?p ex:knows ?friend } } ORDER BY ?p",
        );
        assert_eq!(
            rows,
            vec![
                vec![Some(ex("alice")), Some(ex("bob"))],
                vec![Some(ex("bob")), Some(ex("carol"))],
            ]
        );

        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p ?friend WHERE { ?p ex:knows ?x OPTIONAL { ?x ex:knows ?friend } } ORDER BY ?p",
        );
        assert_eq!(
            rows,
            vec![
                vec![Some(ex("alice")), Some(ex("carol"))],
                vec![Some(ex("bob")), None],
            ]
        );
    }

    #[test]
    fn test_filter_applies_to_whole_group() {
        let store = store();
        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { FILTER(?age > 26) ?p ex:age ?age }",
        );
        assert_eq!(rows, vec![vec![Some(ex("alice"))]]);
    }

    #[test]
    fn test_nested_group_sees_only_its_own_bindings() {
        let store = store();
        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { ?p ex:age ?age { FILTER(?age > 0) } }",
        );
        assert!(rows.is_empty());

        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p ?copy WHERE { ?p ex:age ?age { BIND(?age AS ?copy) } } ORDER BY ?p",
        );
        assert_eq!(
            rows,
            vec![vec![Some(ex("alice")), None], vec![Some(ex("bob")), None]]
        );

        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { ?p ex:age ?age { ?p ex:knows ?f FILTER(?f = ex:carol) } }",
        );
        assert_eq!(rows, vec![vec![Some(ex("bob"))]]);
    }

    #[test]
    fn test_minus_without_shared_variables_keeps_rows() {
        let store = store();
        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { ?p ex:age ?age MINUS { ?x ex:knows ?y } }",
        );
        assert_eq!(rows.len(), 2);

        let rows = run(
            &store,
            "PREFIX ex: <http://example.org/> \
             SELECT ?p WHERE { ?p ex:age ?age MINUS { ?p ex:knows ex:carol } }",
        );
        assert_eq!(rows, vec![vec![Some(ex("alice"))]]);
    }

    #[test]
    fn test_offset_past_end() {
        let store = store();
        let rows = run(&store, "SELECT * WHERE { ?s ?p ?o } OFFSET 10");
        assert!(rows.is_empty());
    }
}
