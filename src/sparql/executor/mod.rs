//! SPARQL query executor
//!
//! Volcano-style execution over a read-locked [`TripleStore`]. The planner
//! turns the parsed query into a tree of physical operators borrowing the
//! query; the executor pulls solutions from the root and shapes them into
//! [`QueryResults`].

pub mod operator;
pub mod planner;
pub mod solution;

pub use operator::{OperatorBox, PhysicalOperator};
pub use planner::{ExecutionPlan, QueryPlanner};
pub use solution::{Solution, VariableTable};

use crate::rdf::{BlankNode, RdfTerm, Triple, TripleStore};
use crate::sparql::ast::{PatternTriple, Query, QueryForm, TermPattern};
use crate::sparql::results::{QueryResults, QuerySolution};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Planning error
    #[error("Planning error: {0}")]
    PlanningError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Variable not found
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Everything an operator needs besides its own state
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub store: &'a TripleStore,
    pub variables: &'a VariableTable,
}

impl<'a> QueryContext<'a> {
    pub fn new(store: &'a TripleStore, variables: &'a VariableTable) -> Self {
        Self { store, variables }
    }
}

/// SPARQL query executor
pub struct SparqlExecutor<'a> {
    store: &'a TripleStore,
    planner: QueryPlanner,
}

impl<'a> SparqlExecutor<'a> {
    /// Create a new executor over a locked store
    pub fn new(store: &'a TripleStore) -> Self {
        Self {
            store,
            planner: QueryPlanner::new(),
        }
    }

    /// Execute a parsed query
    pub fn execute(&self, query: &Query) -> ExecutionResult<QueryResults> {
        let variables = VariableTable::from_query(query);
        let mut plan = self.planner.plan(query, &variables)?;
        let ctx = QueryContext::new(self.store, &variables);

        let results = match &query.form {
            QueryForm::Select { .. } => {
                let names: Arc<[String]> = plan.output_columns.clone().into();
                let mut rows = Vec::new();
                while let Some(row) = plan.root.next(&ctx)? {
                    let values = plan
                        .output_slots
                        .iter()
                        .map(|&slot| row.get(slot).cloned())
                        .collect();
                    rows.push(QuerySolution::new(names.clone(), values));
                }
                QueryResults::Solutions {
                    variables: plan.output_columns,
                    rows,
                }
            }
            QueryForm::Ask => QueryResults::Boolean(plan.root.next(&ctx)?.is_some()),
            QueryForm::Construct { template } => {
                QueryResults::Graph(self.construct(&mut plan, template, &ctx)?)
            }
        };
        debug!("Query produced {} results", results.len());
        Ok(results)
    }

    /// Instantiate the template once per solution
    ///
    /// Template blank nodes get fresh labels per solution. Triples with an
    /// unbound variable or a term that cannot occupy its position are left
    /// out; duplicates are dropped, keeping first occurrence order.
    fn construct(
        &self,
        plan: &mut ExecutionPlan<'_>,
        template: &[PatternTriple],
        ctx: &QueryContext<'_>,
    ) -> ExecutionResult<Vec<Triple>> {
        let mut counter = 0u64;
        let mut seen = FxHashSet::default();
        let mut graph = Vec::new();

        while let Some(row) = plan.root.next(ctx)? {
            let mut blanks: FxHashMap<&str, BlankNode> = FxHashMap::default();
            for pattern in template {
                let mut terms = Vec::with_capacity(3);
                for position in pattern.positions() {
                    let term = match position {
                        TermPattern::Term(term) => Some(term.clone()),
                        TermPattern::Variable(name) => ctx
                            .variables
                            .slot(name)
                            .and_then(|slot| row.get(slot))
                            .cloned(),
                        TermPattern::BlankNode(label) => Some(RdfTerm::BlankNode(
                            blanks
                                .entry(label.as_str())
                                .or_insert_with(|| fresh_construct_blank(&mut counter, ctx))
                                .clone(),
                        )),
                    };
                    match term {
                        Some(term) => terms.push(term),
                        None => break,
                    }
                }
                let [s, p, o]: [RdfTerm; 3] = match terms.try_into() {
                    Ok(terms) => terms,
                    Err(_) => continue,
                };
                if let Ok(triple) = Triple::from_terms(s, p, o) {
                    if seen.insert(triple.clone()) {
                        graph.push(triple);
                    }
                }
            }
        }
        Ok(graph)
    }
}

/// A blank node label not used by the store
pub(crate) fn fresh_construct_blank(counter: &mut u64, ctx: &QueryContext<'_>) -> BlankNode {
    loop {
        let node = BlankNode::new_unchecked(format!("c{}", *counter));
        *counter += 1;
        if !ctx.store.contains_term(&RdfTerm::BlankNode(node.clone())) {
            return node;
        }
    }
}
