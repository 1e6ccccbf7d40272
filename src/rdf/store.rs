//! RDF triple store implementation
//!
//! Every term is interned once into a dense [`TermId`] dictionary and the
//! triples are kept as id tuples in three ordered indexes:
//!
//! - SPO index (Subject-Predicate-Object)
//! - POS index (Predicate-Object-Subject)
//! - OSP index (Object-Subject-Predicate)
//!
//! Each of the eight bound/unbound combinations of a lookup is a prefix
//! range scan over one of them.

use super::serialization::{parse_turtle, TurtleError};
use super::types::{BlankNode, RdfObject, RdfPredicate, RdfSubject, RdfTerm, Triple, TriplePattern};
use crate::clock::{self, Clock};
use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::FxHashMap;
use std::collections::btree_set::{self, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Dense identifier of an interned term
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(u64);

impl TermId {
    const MIN: TermId = TermId(0);
    const MAX: TermId = TermId(u64::MAX);
}

type IdTriple = (TermId, TermId, TermId);

/// Term ↔ id dictionary
#[derive(Debug, Default)]
struct TermDictionary {
    ids: FxHashMap<RdfTerm, TermId>,
    terms: Vec<RdfTerm>,
}

impl TermDictionary {
    fn intern(&mut self, term: RdfTerm) -> TermId {
        if let Some(id) = self.ids.get(&term) {
            return *id;
        }
        let id = TermId(self.terms.len() as u64);
        self.terms.push(term.clone());
        self.ids.insert(term, id);
        id
    }

    fn id(&self, term: &RdfTerm) -> Option<TermId> {
        self.ids.get(term).copied()
    }

    fn term(&self, id: TermId) -> &RdfTerm {
        &self.terms[id.0 as usize]
    }

    fn len(&self) -> usize {
        self.terms.len()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.terms.clear();
    }
}

/// Key order of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrder {
    Spo,
    Pos,
    Osp,
}

impl IndexOrder {
    /// Index and key prefix for a lookup, leading positions first
    ///
    /// The index whose leading key positions cover the most bound positions
    /// wins; ties go SPO, then POS, then OSP.
    fn select(
        s: Option<TermId>,
        p: Option<TermId>,
        o: Option<TermId>,
    ) -> (IndexOrder, Vec<TermId>) {
        match (s, p, o) {
            (None, None, None) => (IndexOrder::Spo, vec![]),
            (Some(s), None, None) => (IndexOrder::Spo, vec![s]),
            (None, Some(p), None) => (IndexOrder::Pos, vec![p]),
            (None, None, Some(o)) => (IndexOrder::Osp, vec![o]),
            (Some(s), Some(p), None) => (IndexOrder::Spo, vec![s, p]),
            (None, Some(p), Some(o)) => (IndexOrder::Pos, vec![p, o]),
            (Some(s), None, Some(o)) => (IndexOrder::Osp, vec![o, s]),
            (Some(s), Some(p), Some(o)) => (IndexOrder::Spo, vec![s, p, o]),
        }
    }

    /// Which index a lookup with these bound positions scans
    pub fn for_bound(subject: bool, predicate: bool, object: bool) -> IndexOrder {
        let bound = |b: bool| b.then_some(TermId::MIN);
        Self::select(bound(subject), bound(predicate), bound(object)).0
    }

    fn key(self, (s, p, o): IdTriple) -> IdTriple {
        match self {
            IndexOrder::Spo => (s, p, o),
            IndexOrder::Pos => (p, o, s),
            IndexOrder::Osp => (o, s, p),
        }
    }

    fn to_spo(self, (a, b, c): IdTriple) -> IdTriple {
        match self {
            IndexOrder::Spo => (a, b, c),
            IndexOrder::Pos => (c, a, b),
            IndexOrder::Osp => (b, c, a),
        }
    }
}

/// Lazy result of a pattern lookup
///
/// Cloning the iterator restarts nothing; a fresh call to
/// [`TripleStore::matching_terms`] yields the sequence from the start.
#[derive(Clone)]
pub struct TermMatches<'a> {
    range: btree_set::Range<'a, IdTriple>,
    order: IndexOrder,
    dictionary: &'a TermDictionary,
}

impl<'a> Iterator for TermMatches<'a> {
    type Item = (&'a RdfTerm, &'a RdfTerm, &'a RdfTerm);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.range.next()?;
        let (s, p, o) = self.order.to_spo(*key);
        Some((
            self.dictionary.term(s),
            self.dictionary.term(p),
            self.dictionary.term(o),
        ))
    }
}

/// RDF triple store with multiple indices for efficient queries
///
/// This is the unsynchronised core; share it through [`Store`].
pub struct TripleStore {
    dictionary: TermDictionary,
    spo: BTreeSet<IdTriple>,
    pos: BTreeSet<IdTriple>,
    osp: BTreeSet<IdTriple>,
    clock: Arc<dyn Clock>,
    blank_counter: u64,
}

impl TripleStore {
    /// Create a new empty store on the process-wide clock
    pub fn new() -> Self {
        Self::with_clock(clock::global())
    }

    /// Create a new empty store on an injected clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            dictionary: TermDictionary::default(),
            spo: BTreeSet::new(),
            pos: BTreeSet::new(),
            osp: BTreeSet::new(),
            clock,
            blank_counter: 0,
        }
    }

    /// Insert a triple; returns whether it was newly added
    pub fn add(&mut self, triple: &Triple) -> bool {
        let s = self.dictionary.intern(triple.subject.clone().into());
        let p = self.dictionary.intern(triple.predicate.clone().into());
        let o = self.dictionary.intern(triple.object.clone().into());
        let key = (s, p, o);
        if !self.spo.insert(key) {
            return false;
        }
        self.pos.insert(IndexOrder::Pos.key(key));
        self.osp.insert(IndexOrder::Osp.key(key));
        true
    }

    /// Insert many triples; returns the number of new ones
    pub fn extend<'t>(&mut self, triples: impl IntoIterator<Item = &'t Triple>) -> usize {
        triples.into_iter().filter(|t| self.add(t)).count()
    }

    /// Check if a triple exists in the store
    pub fn contains(&self, triple: &Triple) -> bool {
        let lookup = |term: RdfTerm| self.dictionary.id(&term);
        match (
            lookup(triple.subject.clone().into()),
            lookup(triple.predicate.clone().into()),
            lookup(triple.object.clone().into()),
        ) {
            (Some(s), Some(p), Some(o)) => self.spo.contains(&(s, p, o)),
            _ => false,
        }
    }

    /// Get the total number of triples
    pub fn count(&self) -> u64 {
        self.spo.len() as u64
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.spo.is_empty()
    }

    /// Number of distinct interned terms
    pub fn term_count(&self) -> usize {
        self.dictionary.len()
    }

    /// Remove every triple and every interned term
    pub fn clear(&mut self) {
        self.spo.clear();
        self.pos.clear();
        self.osp.clear();
        self.dictionary.clear();
    }

    /// Lazy lookup over raw terms; `None` positions are unconstrained
    ///
    /// A term in a position it can never occupy (a literal subject, say)
    /// simply matches nothing.
    pub fn matching_terms(
        &self,
        subject: Option<&RdfTerm>,
        predicate: Option<&RdfTerm>,
        object: Option<&RdfTerm>,
    ) -> TermMatches<'_> {
        let resolve = |term: Option<&RdfTerm>| match term {
            None => Ok(None),
            Some(t) => self.dictionary.id(t).map(Some).ok_or(()),
        };
        let ids = (resolve(subject), resolve(predicate), resolve(object));
        let (s, p, o) = match ids {
            (Ok(s), Ok(p), Ok(o)) => (s, p, o),
            _ => return self.empty_matches(),
        };

        let (order, prefix) = IndexOrder::select(s, p, o);
        let index = match order {
            IndexOrder::Spo => &self.spo,
            IndexOrder::Pos => &self.pos,
            IndexOrder::Osp => &self.osp,
        };
        let at = |i: usize, fill: TermId| prefix.get(i).copied().unwrap_or(fill);
        let low = (at(0, TermId::MIN), at(1, TermId::MIN), at(2, TermId::MIN));
        let high = (at(0, TermId::MAX), at(1, TermId::MAX), at(2, TermId::MAX));
        TermMatches {
            range: index.range(low..=high),
            order,
            dictionary: &self.dictionary,
        }
    }

    fn empty_matches(&self) -> TermMatches<'_> {
        let sentinel = (TermId::MAX, TermId::MAX, TermId::MAX);
        TermMatches {
            range: self.spo.range(sentinel..sentinel),
            order: IndexOrder::Spo,
            dictionary: &self.dictionary,
        }
    }

    /// Lazy lookup of triples; `None` positions are unconstrained
    pub fn matching<'a>(
        &'a self,
        subject: Option<&RdfSubject>,
        predicate: Option<&RdfPredicate>,
        object: Option<&RdfObject>,
    ) -> impl Iterator<Item = Triple> + Clone + 'a {
        let s = subject.cloned().map(RdfTerm::from);
        let p = predicate.cloned().map(RdfTerm::from);
        let o = object.cloned().map(RdfTerm::from);
        self.matching_terms(s.as_ref(), p.as_ref(), o.as_ref())
            .filter_map(|(s, p, o)| Triple::from_terms(s.clone(), p.clone(), o.clone()).ok())
    }

    /// Lookup by [`TriplePattern`]
    pub fn query<'a>(&'a self, pattern: &TriplePattern) -> impl Iterator<Item = Triple> + Clone + 'a {
        self.matching(
            pattern.subject.as_ref(),
            pattern.predicate.as_ref(),
            pattern.object.as_ref(),
        )
    }

    /// Get an iterator over all triples, in SPO id order
    pub fn iter(&self) -> impl Iterator<Item = Triple> + Clone + '_ {
        self.matching(None, None, None)
    }

    /// Distinct subjects in the store
    pub fn subjects(&self) -> Vec<RdfSubject> {
        self.distinct_leading(&self.spo)
            .filter_map(|t| RdfSubject::try_from(t.clone()).ok())
            .collect()
    }

    /// Distinct predicates in the store
    pub fn predicates(&self) -> Vec<RdfPredicate> {
        self.distinct_leading(&self.pos)
            .filter_map(|t| RdfPredicate::try_from(t.clone()).ok())
            .collect()
    }

    /// Distinct objects in the store
    pub fn objects(&self) -> Vec<RdfObject> {
        self.distinct_leading(&self.osp)
            .map(|t| RdfObject::from(t.clone()))
            .collect()
    }

    fn distinct_leading<'a>(
        &'a self,
        index: &'a BTreeSet<IdTriple>,
    ) -> impl Iterator<Item = &'a RdfTerm> + 'a {
        let mut last = None;
        index.iter().filter_map(move |(lead, _, _)| {
            if last == Some(*lead) {
                None
            } else {
                last = Some(*lead);
                Some(self.dictionary.term(*lead))
            }
        })
    }

    /// Allocate a blank node label that is not yet used by this store
    ///
    /// Labels are derived from the clock, so a deterministic clock yields
    /// the same labels for the same sequence of operations.
    pub fn fresh_blank_node(&mut self) -> BlankNode {
        loop {
            let label = format!("t{:x}n{}", self.clock.now(), self.blank_counter);
            self.blank_counter += 1;
            let candidate = BlankNode::new_unchecked(label);
            if self.dictionary.id(&RdfTerm::BlankNode(candidate.clone())).is_none() {
                return candidate;
            }
        }
    }

    /// Insert triples whose blank nodes are scoped to the batch
    ///
    /// Every distinct blank node of the batch is mapped to a fresh store
    /// label, so two batches never share a blank node by accident.
    pub fn insert_scoped(&mut self, triples: Vec<Triple>) -> usize {
        let mut relabelled: FxHashMap<BlankNode, BlankNode> = FxHashMap::default();
        let mut added = 0;
        for mut triple in triples {
            if let RdfSubject::BlankNode(b) = &triple.subject {
                triple.subject = RdfSubject::BlankNode(self.relabel(&mut relabelled, b));
            }
            if let RdfObject::BlankNode(b) = &triple.object {
                triple.object = RdfObject::BlankNode(self.relabel(&mut relabelled, b));
            }
            if self.add(&triple) {
                added += 1;
            }
        }
        added
    }

    fn relabel(
        &mut self,
        mapping: &mut FxHashMap<BlankNode, BlankNode>,
        blank: &BlankNode,
    ) -> BlankNode {
        if let Some(existing) = mapping.get(blank) {
            return existing.clone();
        }
        let fresh = self.fresh_blank_node();
        mapping.insert(blank.clone(), fresh.clone());
        fresh
    }

    /// Whether the term occurs in the dictionary
    pub fn contains_term(&self, term: &RdfTerm) -> bool {
        self.dictionary.id(term).is_some()
    }

    /// Current tick of the store clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

impl Default for TripleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared store handle: many readers or one writer
///
/// Every write holds the lock across all three index updates, so readers
/// never observe a partially indexed triple.
pub struct Store {
    inner: RwLock<TripleStore>,
}

impl Store {
    /// Create a new empty store on the process-wide clock
    pub fn new() -> Self {
        Self::with_clock(clock::global())
    }

    /// Create a new empty store on an injected clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(TripleStore::with_clock(clock)),
        }
    }

    /// Shared read access; held for the lifetime of the guard
    pub fn read(&self) -> RwLockReadGuard<'_, TripleStore> {
        self.inner.read()
    }

    pub fn add(&self, triple: &Triple) -> bool {
        self.inner.write().add(triple)
    }

    /// Insert many triples under a single write lock
    pub fn extend<'t>(&self, triples: impl IntoIterator<Item = &'t Triple>) -> usize {
        self.inner.write().extend(triples)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.inner.read().contains(triple)
    }

    pub fn count(&self) -> u64 {
        self.inner.read().count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        let mut store = self.inner.write();
        let removed = store.count();
        store.clear();
        debug!("Cleared store, removed {} triples", removed);
    }

    /// Snapshot of the triples matching a lookup
    pub fn matching(
        &self,
        subject: Option<&RdfSubject>,
        predicate: Option<&RdfPredicate>,
        object: Option<&RdfObject>,
    ) -> Vec<Triple> {
        self.inner.read().matching(subject, predicate, object).collect()
    }

    /// Parse a Turtle document and add its triples, all or nothing
    ///
    /// The document is parsed before the write lock is taken; on a parse
    /// error the store is left untouched.
    pub fn load_turtle(&self, text: &str, base_iri: Option<&str>) -> Result<usize, TurtleError> {
        let triples = parse_turtle(text, base_iri)?;
        let parsed = triples.len();
        let added = self.inner.write().insert_scoped(triples);
        info!("Loaded {} triples ({} parsed)", added, parsed);
        Ok(added)
    }

    /// Current tick of the store clock
    pub fn now(&self) -> u64 {
        self.inner.read().now()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
