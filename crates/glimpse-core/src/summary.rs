//! Bounded summaries of a parent graph and the set objective they maximize.
//!
//! The objective over a triple set `S` is
//!
//! ```text
//! f(S) = Σ_{e ∈ entities(S)} entity_value(e) + Σ_{t ∈ S} triple_value(t)
//! ```
//!
//! Each entity counts once no matter how many of its triples are in `S`.
//! That dedup is what makes `f` submodular.

use crate::graph::{GraphStore, GraphView, TripleIndex};
use crate::walk::ValueAnnotation;
use crate::{EntityId, RelationId, Triple};
use ahash::AHashSet;
use roaring::RoaringBitmap;

/// `f(S)` for an arbitrary triple set (duplicates counted once).
pub fn objective<'a, I>(values: &ValueAnnotation, triples: I) -> f64
where
    I: IntoIterator<Item = &'a Triple>,
{
    let mut seen: AHashSet<Triple> = AHashSet::new();
    let mut entities = RoaringBitmap::new();
    let mut total = 0.0;
    for triple in triples {
        if !seen.insert(*triple) {
            continue;
        }
        total += values.triple_value(triple);
        entities.insert(triple.subject);
        entities.insert(triple.object);
    }
    total + entities.iter().map(|e| values.entity_value(e)).sum::<f64>()
}

/// A subgraph of at most `budget` parent triples.
///
/// Shares the parent's entity and relation IDs; labels resolve through
/// [`Summary::parent`].
#[derive(Debug, Clone)]
pub struct Summary<'g> {
    parent: &'g GraphStore,
    values: &'g ValueAnnotation,
    index: TripleIndex,
    budget: usize,
}

impl<'g> Summary<'g> {
    pub fn new(parent: &'g GraphStore, values: &'g ValueAnnotation, budget: usize) -> Self {
        Self {
            parent,
            values,
            index: TripleIndex::new(),
            budget,
        }
    }

    pub fn parent(&self) -> &'g GraphStore {
        self.parent
    }

    pub fn values(&self) -> &'g ValueAnnotation {
        self.values
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.index.len() >= self.budget
    }

    /// Entities touched by the summary's triples.
    pub fn entities(&self) -> &RoaringBitmap {
        self.index.entities()
    }

    /// Add a parent triple.
    ///
    /// Returns `false` (and changes nothing) when the triple is already
    /// present, absent from the parent, or the budget is exhausted.
    pub fn add_triple(&mut self, triple: Triple) -> bool {
        if self.is_full() || !self.parent.has_triple(&triple) {
            return false;
        }
        self.index.insert(triple)
    }

    /// Increase in [`objective`] from adding `triple`.
    pub fn marginal_value(&self, triple: &Triple) -> f64 {
        if self.index.has_triple(triple) {
            return 0.0;
        }
        let mut total = self.values.triple_value(triple);
        if !self.index.contains_entity(triple.subject) {
            total += self.values.entity_value(triple.subject);
        }
        if triple.object != triple.subject && !self.index.contains_entity(triple.object) {
            total += self.values.entity_value(triple.object);
        }
        total
    }

    /// `f(S)` of the current contents.
    pub fn objective(&self) -> f64 {
        objective(self.values, self.index.triples())
    }

    /// Add triples in order until the budget is reached or `triples` ends.
    /// Returns how many were added.
    pub fn fill<'a, I>(&mut self, triples: I) -> usize
    where
        I: IntoIterator<Item = &'a Triple>,
    {
        let mut added = 0;
        for triple in triples {
            if self.is_full() {
                break;
            }
            if self.add_triple(*triple) {
                added += 1;
            }
        }
        added
    }

    /// Resolve the summary back to labels.
    pub fn labeled_triples(&self) -> Vec<(&'g str, &'g str, &'g str)> {
        self.index
            .triples()
            .iter()
            .filter_map(|t| self.parent.triple_labels(t).ok())
            .collect()
    }
}

impl GraphView for Summary<'_> {
    fn objects(&self, subject: EntityId, relation: RelationId) -> Option<&RoaringBitmap> {
        self.index.objects(subject, relation)
    }

    fn relations_of(&self, subject: EntityId) -> Vec<RelationId> {
        self.index.relations_of(subject)
    }

    fn has_triple(&self, triple: &Triple) -> bool {
        self.index.has_triple(triple)
    }

    fn contains_entity(&self, entity: EntityId) -> bool {
        self.index.contains_entity(entity)
    }

    fn contains_relation(&self, relation: RelationId) -> bool {
        self.index.contains_relation(relation)
    }

    fn number_of_triples(&self) -> usize {
        self.index.len()
    }

    fn triples(&self) -> &[Triple] {
        self.index.triples()
    }
}
