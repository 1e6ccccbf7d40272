//! SPARQL query optimizer
//!
//! Join reordering for basic graph patterns. A pattern is cheaper the more
//! of its positions are fixed, either by a constant or by a variable that an
//! earlier pattern (or the incoming solution) already binds, because the
//! store can then use a longer index prefix.

use crate::sparql::ast::{PatternTriple, TermPattern};
use rustc_hash::FxHashSet;
use tracing::debug;

/// Greedy basic graph pattern reordering
pub struct SparqlOptimizer;

impl SparqlOptimizer {
    /// Create a new optimizer
    pub fn new() -> Self {
        Self
    }

    /// Order `patterns` so that each step has the most fixed positions
    ///
    /// `bound` holds the variables already bound when the first pattern
    /// runs. Ties keep the source order.
    pub fn order_patterns<'q>(
        &self,
        patterns: &[&'q PatternTriple],
        bound: &FxHashSet<&'q str>,
    ) -> Vec<&'q PatternTriple> {
        let mut bound = bound.clone();
        let mut remaining: Vec<&'q PatternTriple> = patterns.to_vec();
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let mut best = 0;
            let mut best_score = 0;
            for (index, pattern) in remaining.iter().enumerate() {
                let score = fixed_positions(pattern, &bound);
                if index == 0 || score > best_score {
                    best = index;
                    best_score = score;
                }
            }
            let chosen = remaining.remove(best);
            for position in chosen.positions() {
                if let TermPattern::Variable(name) = position {
                    bound.insert(name.as_str());
                }
            }
            ordered.push(chosen);
        }

        if ordered.len() > 1 {
            debug!(
                "Reordered basic graph pattern: {}",
                ordered
                    .iter()
                    .map(|p| describe(p))
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
        }
        ordered
    }
}

impl Default for SparqlOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

fn fixed_positions(pattern: &PatternTriple, bound: &FxHashSet<&str>) -> usize {
    pattern
        .positions()
        .into_iter()
        .filter(|position| match position {
            TermPattern::Variable(name) => bound.contains(name.as_str()),
            TermPattern::Term(_) | TermPattern::BlankNode(_) => true,
        })
        .count()
}

fn describe(pattern: &PatternTriple) -> String {
    pattern
        .positions()
        .into_iter()
        .map(|position| match position {
            TermPattern::Variable(name) => format!("?{}", name),
            TermPattern::Term(term) => term.to_string(),
            TermPattern::BlankNode(label) => format!("_:{}", label),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::NamedNode;

    fn var(name: &str) -> TermPattern {
        TermPattern::Variable(name.to_string())
    }

    fn iri(s: &str) -> TermPattern {
        TermPattern::Term(NamedNode::new_unchecked(s).into())
    }

    #[test]
    fn test_most_constrained_first() {
        let loose = PatternTriple::new(var("a"), var("p"), var("b"));
        let typed = PatternTriple::new(var("a"), iri("http://example.org/type"), iri("http://example.org/T"));
        let patterns = [&loose, &typed];

        let ordered = SparqlOptimizer::new().order_patterns(&patterns, &FxHashSet::default());
        assert_eq!(ordered, vec![&typed, &loose]);
    }

    #[test]
    fn test_bound_variables_count_and_ties_keep_order() {
        let first = PatternTriple::new(var("x"), iri("http://example.org/p"), var("y"));
        let second = PatternTriple::new(var("z"), iri("http://example.org/p"), var("w"));
        let patterns = [&first, &second];
        let optimizer = SparqlOptimizer::new();

        assert_eq!(
            optimizer.order_patterns(&patterns, &FxHashSet::default()),
            vec![&first, &second]
        );

        let bound: FxHashSet<&str> = ["w"].into_iter().collect();
        assert_eq!(optimizer.order_patterns(&patterns, &bound), vec![&second, &first]);
    }
}
