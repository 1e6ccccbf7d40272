//! Physical operators for query execution (Volcano iterator model)
//!
//! Each operator pulls solutions from its input one at a time. OPTIONAL
//! plans its group per incoming solution, seeded with that solution, so its
//! FILTER can see the outer bindings. UNION branches, nested groups and the
//! right side of MINUS are evaluated once on their own and joined.

use crate::rdf::RdfTerm;
use crate::sparql::ast::{Expression, GroupPattern, OrderCondition, PatternTriple, TermPattern};
use crate::sparql::executor::planner::plan_group;
use crate::sparql::executor::{ExecutionError, ExecutionResult, QueryContext, Solution, VariableTable};
use crate::sparql::expression::{evaluate, filter_passes, order_terms};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::trace;

/// Physical operator trait (Volcano iterator model)
pub trait PhysicalOperator: Send {
    /// Get next solution
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>>;

    /// Reset operator state
    fn reset(&mut self);
}

pub type OperatorBox<'q> = Box<dyn PhysicalOperator + 'q>;

/// Pull every remaining solution out of an operator
pub fn drain(operator: &mut OperatorBox<'_>, ctx: &QueryContext<'_>) -> ExecutionResult<Vec<Solution>> {
    let mut rows = Vec::new();
    while let Some(row) = operator.next(ctx)? {
        rows.push(row);
    }
    Ok(rows)
}

/// Emits a fixed list of solutions; the leaf of every plan
pub struct SeedOperator {
    rows: Vec<Solution>,
    current: usize,
}

impl SeedOperator {
    pub fn new(rows: Vec<Solution>) -> Self {
        Self { rows, current: 0 }
    }
}

impl PhysicalOperator for SeedOperator {
    fn next(&mut self, _ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        let row = self.rows.get(self.current).cloned();
        if row.is_some() {
            self.current += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) {
        self.current = 0;
    }
}

#[derive(Debug, Clone, Copy)]
enum Position<'q> {
    Constant(&'q RdfTerm),
    Variable(usize),
}

/// Index nested loop join of one triple pattern
///
/// For every incoming solution the bound variables are substituted and the
/// store is asked for the matching triples.
pub struct TripleScanOperator<'q> {
    input: OperatorBox<'q>,
    positions: [Position<'q>; 3],
    buffer: VecDeque<Solution>,
}

impl<'q> TripleScanOperator<'q> {
    pub fn new(
        input: OperatorBox<'q>,
        pattern: &'q PatternTriple,
        variables: &VariableTable,
    ) -> ExecutionResult<Self> {
        let resolve = |position: &'q TermPattern| match position {
            TermPattern::Term(term) => Ok(Position::Constant(term)),
            TermPattern::Variable(name) => variables
                .slot(name)
                .map(Position::Variable)
                .ok_or_else(|| ExecutionError::VariableNotFound(name.clone())),
            TermPattern::BlankNode(label) => Err(ExecutionError::PlanningError(format!(
                "blank node _:{} outside of a template",
                label
            ))),
        };
        Ok(Self {
            input,
            positions: [
                resolve(&pattern.subject)?,
                resolve(&pattern.predicate)?,
                resolve(&pattern.object)?,
            ],
            buffer: VecDeque::new(),
        })
    }

    fn expand(&mut self, row: Solution, ctx: &QueryContext<'_>) {
        let bound = self.positions.map(|position| match position {
            Position::Constant(term) => Some(term),
            Position::Variable(slot) => row.get(slot),
        });
        for (s, p, o) in ctx.store.matching_terms(bound[0], bound[1], bound[2]) {
            let mut next = row.clone();
            // a variable repeated in the pattern must match the same term
            let consistent = [s, p, o]
                .into_iter()
                .zip(self.positions)
                .all(|(term, position)| match position {
                    Position::Constant(_) => true,
                    Position::Variable(slot) => match next.get(slot) {
                        Some(existing) => existing == term,
                        None => {
                            next.set(slot, term.clone());
                            true
                        }
                    },
                });
            if consistent {
                self.buffer.push_back(next);
            }
        }
    }
}

impl PhysicalOperator for TripleScanOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            let Some(row) = self.input.next(ctx)? else {
                return Ok(None);
            };
            self.expand(row, ctx);
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.buffer.clear();
    }
}

/// Filter operator: keeps solutions whose condition is true
pub struct FilterOperator<'q> {
    input: OperatorBox<'q>,
    predicate: &'q Expression,
}

impl<'q> FilterOperator<'q> {
    pub fn new(input: OperatorBox<'q>, predicate: &'q Expression) -> Self {
        Self { input, predicate }
    }
}

impl PhysicalOperator for FilterOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        while let Some(row) = self.input.next(ctx)? {
            if filter_passes(self.predicate, &row, ctx) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

/// OPTIONAL: extends each solution with the group's matches, or keeps it
pub struct OptionalOperator<'q> {
    input: OperatorBox<'q>,
    group: &'q GroupPattern,
    buffer: VecDeque<Solution>,
}

impl<'q> OptionalOperator<'q> {
    pub fn new(input: OperatorBox<'q>, group: &'q GroupPattern) -> Self {
        Self {
            input,
            group,
            buffer: VecDeque::new(),
        }
    }
}

impl PhysicalOperator for OptionalOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            let Some(row) = self.input.next(ctx)? else {
                return Ok(None);
            };
            let mut inner = plan_group(self.group, row.clone(), ctx.variables)?;
            let extended = drain(&mut inner, ctx)?;
            if extended.is_empty() {
                self.buffer.push_back(row);
            } else {
                self.buffer.extend(extended);
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.buffer.clear();
    }
}

/// UNION: joins each solution with the matches of every branch
///
/// Branches are evaluated once, on their own, and their solutions are
/// merged with every compatible input solution. A nested `{ ... }` group is
/// planned as a union with a single branch, so a FILTER or BIND inside it
/// only sees what the group itself binds.
pub struct UnionOperator<'q> {
    input: OperatorBox<'q>,
    branches: Vec<&'q GroupPattern>,
    branch_rows: Option<Vec<Solution>>,
    buffer: VecDeque<Solution>,
}

impl<'q> UnionOperator<'q> {
    pub fn new(input: OperatorBox<'q>, branches: Vec<&'q GroupPattern>) -> Self {
        Self {
            input,
            branches,
            branch_rows: None,
            buffer: VecDeque::new(),
        }
    }

    fn evaluate_branches(&self, ctx: &QueryContext<'_>) -> ExecutionResult<Vec<Solution>> {
        let mut rows = Vec::new();
        for branch in &self.branches {
            let mut inner = plan_group(branch, Solution::new(ctx.variables.len()), ctx.variables)?;
            rows.extend(drain(&mut inner, ctx)?);
        }
        Ok(rows)
    }
}

impl PhysicalOperator for UnionOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        if self.branch_rows.is_none() {
            self.branch_rows = Some(self.evaluate_branches(ctx)?);
        }
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            let Some(row) = self.input.next(ctx)? else {
                return Ok(None);
            };
            let branch_rows = self.branch_rows.as_deref().unwrap_or_default();
            self.buffer
                .extend(branch_rows.iter().filter_map(|other| row.merge(other)));
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.branch_rows = None;
        self.buffer.clear();
    }
}

/// MINUS: drops solutions that agree with some right-hand solution on at
/// least one shared variable
///
/// The right side is evaluated once, independently of the left.
pub struct MinusOperator<'q> {
    input: OperatorBox<'q>,
    right: &'q GroupPattern,
    right_rows: Option<Vec<Solution>>,
}

impl<'q> MinusOperator<'q> {
    pub fn new(input: OperatorBox<'q>, right: &'q GroupPattern) -> Self {
        Self {
            input,
            right,
            right_rows: None,
        }
    }
}

impl PhysicalOperator for MinusOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        if self.right_rows.is_none() {
            let mut right = plan_group(self.right, Solution::new(ctx.variables.len()), ctx.variables)?;
            self.right_rows = Some(drain(&mut right, ctx)?);
        }
        let right_rows = self.right_rows.as_deref().unwrap_or_default();

        while let Some(row) = self.input.next(ctx)? {
            let excluded = right_rows
                .iter()
                .any(|other| row.shares_variable(other) && row.is_compatible(other));
            if !excluded {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.right_rows = None;
    }
}

/// BIND / SELECT expression: binds the value of an expression
///
/// An evaluation error leaves the variable unbound.
pub struct ExtendOperator<'q> {
    input: OperatorBox<'q>,
    expression: &'q Expression,
    slot: usize,
}

impl<'q> ExtendOperator<'q> {
    pub fn new(input: OperatorBox<'q>, expression: &'q Expression, slot: usize) -> Self {
        Self {
            input,
            expression,
            slot,
        }
    }
}

impl PhysicalOperator for ExtendOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        let Some(mut row) = self.input.next(ctx)? else {
            return Ok(None);
        };
        match evaluate(self.expression, &row, ctx) {
            Ok(term) => row.set(self.slot, term),
            Err(e) => trace!("Expression left ?{} unbound: {}", ctx.variables.name(self.slot).unwrap_or(""), e),
        }
        Ok(Some(row))
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

/// VALUES: joins each solution with the compatible data rows
pub struct ValuesOperator<'q> {
    input: OperatorBox<'q>,
    rows: Vec<Solution>,
    buffer: VecDeque<Solution>,
}

impl<'q> ValuesOperator<'q> {
    pub fn new(input: OperatorBox<'q>, rows: Vec<Solution>) -> Self {
        Self {
            input,
            rows,
            buffer: VecDeque::new(),
        }
    }
}

impl PhysicalOperator for ValuesOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            let Some(row) = self.input.next(ctx)? else {
                return Ok(None);
            };
            self.buffer
                .extend(self.rows.iter().filter_map(|data| row.merge(data)));
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.buffer.clear();
    }
}

/// ORDER BY: materializes and sorts its input
pub struct SortOperator<'q> {
    input: OperatorBox<'q>,
    conditions: &'q [OrderCondition],
    rows: VecDeque<Solution>,
    executed: bool,
}

impl<'q> SortOperator<'q> {
    pub fn new(input: OperatorBox<'q>, conditions: &'q [OrderCondition]) -> Self {
        Self {
            input,
            conditions,
            rows: VecDeque::new(),
            executed: false,
        }
    }
}

impl PhysicalOperator for SortOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        if !self.executed {
            // keys are computed once; an error sorts like an unbound value
            let mut keyed = Vec::new();
            while let Some(row) = self.input.next(ctx)? {
                let keys: Vec<Option<RdfTerm>> = self
                    .conditions
                    .iter()
                    .map(|condition| evaluate(&condition.expression, &row, ctx).ok())
                    .collect();
                keyed.push((keys, row));
            }

            let conditions = self.conditions;
            keyed.sort_by(|(a, _), (b, _)| {
                for (condition, (ka, kb)) in conditions.iter().zip(a.iter().zip(b)) {
                    let ord = order_terms(ka.as_ref(), kb.as_ref());
                    if ord != Ordering::Equal {
                        return if condition.ascending { ord } else { ord.reverse() };
                    }
                }
                Ordering::Equal
            });
            self.rows = keyed.into_iter().map(|(_, row)| row).collect();
            self.executed = true;
        }
        Ok(self.rows.pop_front())
    }

    fn reset(&mut self) {
        self.input.reset();
        self.rows.clear();
        self.executed = false;
    }
}

/// Projection: keeps only the selected variables
pub struct ProjectOperator<'q> {
    input: OperatorBox<'q>,
    slots: Vec<usize>,
}

impl<'q> ProjectOperator<'q> {
    pub fn new(input: OperatorBox<'q>, slots: Vec<usize>) -> Self {
        Self { input, slots }
    }
}

impl PhysicalOperator for ProjectOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        Ok(self.input.next(ctx)?.map(|row| row.project(&self.slots)))
    }

    fn reset(&mut self) {
        self.input.reset();
    }
}

/// DISTINCT / REDUCED: drops repeated solutions
pub struct DistinctOperator<'q> {
    input: OperatorBox<'q>,
    seen: FxHashSet<Solution>,
}

impl<'q> DistinctOperator<'q> {
    pub fn new(input: OperatorBox<'q>) -> Self {
        Self {
            input,
            seen: FxHashSet::default(),
        }
    }
}

impl PhysicalOperator for DistinctOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        while let Some(row) = self.input.next(ctx)? {
            if !self.seen.contains(&row) {
                self.seen.insert(row.clone());
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.seen.clear();
    }
}

/// OFFSET: skips the first solutions
pub struct SkipOperator<'q> {
    input: OperatorBox<'q>,
    skip: usize,
    skipped: usize,
}

impl<'q> SkipOperator<'q> {
    pub fn new(input: OperatorBox<'q>, skip: usize) -> Self {
        Self {
            input,
            skip,
            skipped: 0,
        }
    }
}

impl PhysicalOperator for SkipOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        while self.skipped < self.skip {
            if self.input.next(ctx)?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }
        self.input.next(ctx)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.skipped = 0;
    }
}

/// LIMIT: stops after a fixed number of solutions
pub struct LimitOperator<'q> {
    input: OperatorBox<'q>,
    limit: usize,
    count: usize,
}

impl<'q> LimitOperator<'q> {
    pub fn new(input: OperatorBox<'q>, limit: usize) -> Self {
        Self {
            input,
            limit,
            count: 0,
        }
    }
}

impl PhysicalOperator for LimitOperator<'_> {
    fn next(&mut self, ctx: &QueryContext<'_>) -> ExecutionResult<Option<Solution>> {
        if self.count >= self.limit {
            return Ok(None);
        }
        let row = self.input.next(ctx)?;
        if row.is_some() {
            self.count += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.count = 0;
    }
}
