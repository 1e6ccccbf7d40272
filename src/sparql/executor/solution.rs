//! Solutions flowing through the operator pipeline
//!
//! Every variable of a query gets a fixed slot when the query is planned, so
//! a solution is a dense vector of optional terms. Compatibility and merging
//! work slot by slot.

use crate::rdf::RdfTerm;
use crate::sparql::ast::*;
use rustc_hash::FxHashMap;

/// Variable name to slot mapping, shared by all solutions of one query
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    names: Vec<String>,
    slots: FxHashMap<String, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a slot to every variable mentioned anywhere in the query,
    /// including EXISTS patterns, SELECT aliases and templates
    pub fn from_query(query: &Query) -> Self {
        let mut table = Self::new();
        table.visit_group(&query.pattern);
        if let Some(values) = &query.values {
            for name in &values.variables {
                table.intern(name);
            }
        }
        match &query.form {
            QueryForm::Select {
                projection: Projection::Items(items),
                ..
            } => {
                for item in items {
                    if let SelectItem::Expression { expression, .. } = item {
                        table.visit_expression(expression);
                    }
                    table.intern(item.variable());
                }
            }
            QueryForm::Construct { template } => {
                for triple in template {
                    table.visit_triple(triple);
                }
            }
            _ => {}
        }
        for condition in &query.modifiers.order_by {
            table.visit_expression(&condition.expression);
        }
        table
    }

    pub fn intern(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.names.len();
        self.names.push(name.to_string());
        self.slots.insert(name.to_string(), slot);
        slot
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn visit_group(&mut self, group: &GroupPattern) {
        for element in &group.elements {
            match element {
                PatternElement::Triples(triples) => {
                    for triple in triples {
                        self.visit_triple(triple);
                    }
                }
                PatternElement::Filter(expression) => self.visit_expression(expression),
                PatternElement::Optional(inner)
                | PatternElement::Group(inner)
                | PatternElement::Minus(inner) => self.visit_group(inner),
                PatternElement::Union(branches) => {
                    for branch in branches {
                        self.visit_group(branch);
                    }
                }
                PatternElement::Bind {
                    expression,
                    variable,
                } => {
                    self.visit_expression(expression);
                    self.intern(variable);
                }
                PatternElement::Values(values) => {
                    for name in &values.variables {
                        self.intern(name);
                    }
                }
            }
        }
    }

    fn visit_triple(&mut self, triple: &PatternTriple) {
        for position in triple.positions() {
            if let TermPattern::Variable(name) = position {
                self.intern(name);
            }
        }
    }

    fn visit_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Variable(name) => {
                self.intern(name);
            }
            Expression::Constant(_) => {}
            Expression::Binary { left, right, .. } => {
                self.visit_expression(left);
                self.visit_expression(right);
            }
            Expression::Unary { expr, .. } => self.visit_expression(expr),
            Expression::Function { args, .. } => {
                for arg in args {
                    self.visit_expression(arg);
                }
            }
            Expression::In { expr, list, .. } => {
                self.visit_expression(expr);
                for item in list {
                    self.visit_expression(item);
                }
            }
            Expression::Exists { pattern, .. } => self.visit_group(pattern),
        }
    }
}

/// A single solution: one optional binding per variable slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Solution {
    values: Vec<Option<RdfTerm>>,
}

impl Solution {
    /// Create a solution with every slot unbound
    pub fn new(width: usize) -> Self {
        Self {
            values: vec![None; width],
        }
    }

    pub fn get(&self, slot: usize) -> Option<&RdfTerm> {
        self.values.get(slot).and_then(Option::as_ref)
    }

    pub fn is_bound(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    /// Bind a slot, growing the solution if needed
    pub fn set(&mut self, slot: usize, term: RdfTerm) {
        if slot >= self.values.len() {
            self.values.resize(slot + 1, None);
        }
        self.values[slot] = Some(term);
    }

    pub fn unset(&mut self, slot: usize) {
        if let Some(value) = self.values.get_mut(slot) {
            *value = None;
        }
    }

    /// Slots that carry a value
    pub fn bound_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_ref().map(|_| slot))
    }

    /// No variable is bound to different terms in the two solutions
    pub fn is_compatible(&self, other: &Solution) -> bool {
        self.values
            .iter()
            .zip(&other.values)
            .all(|pair| match pair {
                (Some(a), Some(b)) => a == b,
                _ => true,
            })
    }

    /// At least one variable is bound in both solutions
    pub fn shares_variable(&self, other: &Solution) -> bool {
        self.values
            .iter()
            .zip(&other.values)
            .any(|(a, b)| a.is_some() && b.is_some())
    }

    /// Union of two compatible solutions
    pub fn merge(&self, other: &Solution) -> Option<Solution> {
        if !self.is_compatible(other) {
            return None;
        }
        let mut merged = self.clone();
        for slot in other.bound_slots() {
            if !merged.is_bound(slot) {
                if let Some(term) = other.get(slot) {
                    merged.set(slot, term.clone());
                }
            }
        }
        Some(merged)
    }

    /// Keep only the given slots
    pub fn project(&self, slots: &[usize]) -> Solution {
        let mut projected = Solution::new(self.values.len());
        for &slot in slots {
            if let Some(term) = self.get(slot) {
                projected.set(slot, term.clone());
            }
        }
        projected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{Literal, NamedNode};

    fn iri(s: &str) -> RdfTerm {
        NamedNode::new_unchecked(s).into()
    }

    #[test]
    fn test_compatibility_and_merge() {
        let mut a = Solution::new(3);
        a.set(0, iri("http://example.org/x"));
        let mut b = Solution::new(3);
        b.set(0, iri("http://example.org/x"));
        b.set(1, Literal::new_simple_literal("v").into());

        assert!(a.is_compatible(&b));
        assert!(a.shares_variable(&b));
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.bound_slots().collect::<Vec<_>>(), vec![0, 1]);

        let mut c = Solution::new(3);
        c.set(0, iri("http://example.org/y"));
        assert!(!a.is_compatible(&c));
        assert!(a.merge(&c).is_none());

        let mut d = Solution::new(3);
        d.set(2, iri("http://example.org/z"));
        assert!(a.is_compatible(&d));
        assert!(!a.shares_variable(&d));
    }

    #[test]
    fn test_project() {
        let mut s = Solution::new(2);
        s.set(0, iri("http://example.org/a"));
        s.set(1, iri("http://example.org/b"));
        let p = s.project(&[1]);
        assert!(!p.is_bound(0));
        assert!(p.is_bound(1));
    }

    #[test]
    fn test_variable_table_covers_exists() {
        let query = crate::sparql::parse_query(
            "SELECT ?s WHERE { ?s ?p ?o FILTER EXISTS { ?o ?q ?hidden } }",
        )
        .unwrap();
        let table = VariableTable::from_query(&query);
        assert!(table.slot("hidden").is_some());
        assert_eq!(table.slot("s"), Some(0));
        assert_eq!(table.name(0), Some("s"));
    }
}
