//! Triple storage: the shared read contract, the triple index, and the
//! label-interning [`GraphStore`].
//!
//! Both the full graph and a [`crate::Summary`] store triples in a
//! [`TripleIndex`] keyed by the *parent's* entity and relation IDs, so answer
//! sets computed against either one are directly comparable.

use crate::error::{GlimpseError, Result};
use crate::interner::StringInterner;
use crate::sparse::SparseMatrix;
use crate::{EntityId, RelationId, Triple};
use ahash::AHashMap;
use roaring::RoaringBitmap;

// ============================================================================
// Read Contract
// ============================================================================

/// Read-only view over an indexed set of triples.
///
/// Traversal, evaluation, and query generation are written against this
/// trait so that the full graph and a summary are interchangeable.
pub trait GraphView {
    /// Objects reachable from `subject` via `relation`, if any.
    fn objects(&self, subject: EntityId, relation: RelationId) -> Option<&RoaringBitmap>;

    /// Outgoing relations of `subject`, in ascending ID order.
    fn relations_of(&self, subject: EntityId) -> Vec<RelationId>;

    fn has_triple(&self, triple: &Triple) -> bool;

    /// Whether `entity` appears in at least one stored triple.
    fn contains_entity(&self, entity: EntityId) -> bool;

    fn contains_relation(&self, relation: RelationId) -> bool;

    fn number_of_triples(&self) -> usize;

    /// All triples in insertion order.
    fn triples(&self) -> &[Triple];

    /// Owned neighbor set; empty when `subject` has no `relation` edge.
    fn neighbors(&self, subject: EntityId, relation: RelationId) -> RoaringBitmap {
        self.objects(subject, relation).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Triple Index (Adjacency + Flat List)
// ============================================================================

/// Deduplicated triple set with a subject → relation → objects adjacency.
///
/// The adjacency and the flat insertion-ordered list are maintained together
/// and are always mutually derivable.
#[derive(Debug, Clone, Default)]
pub struct TripleIndex {
    adjacency: AHashMap<EntityId, AHashMap<RelationId, RoaringBitmap>>,
    triples: Vec<Triple>,
    entities: RoaringBitmap,
    relation_counts: AHashMap<RelationId, usize>,
}

impl TripleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Returns `false` if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        let inserted = self
            .adjacency
            .entry(triple.subject)
            .or_default()
            .entry(triple.relation)
            .or_default()
            .insert(triple.object);
        if !inserted {
            return false;
        }

        self.entities.insert(triple.subject);
        self.entities.insert(triple.object);
        *self.relation_counts.entry(triple.relation).or_insert(0) += 1;
        self.triples.push(triple);
        true
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Entities touched by at least one triple.
    pub fn entities(&self) -> &RoaringBitmap {
        &self.entities
    }

    pub fn number_of_relations(&self) -> usize {
        self.relation_counts.len()
    }
}

impl GraphView for TripleIndex {
    fn objects(&self, subject: EntityId, relation: RelationId) -> Option<&RoaringBitmap> {
        self.adjacency.get(&subject)?.get(&relation)
    }

    fn relations_of(&self, subject: EntityId) -> Vec<RelationId> {
        let Some(by_relation) = self.adjacency.get(&subject) else {
            return Vec::new();
        };
        let mut out: Vec<RelationId> = by_relation.keys().copied().collect();
        out.sort_unstable();
        out
    }

    fn has_triple(&self, triple: &Triple) -> bool {
        self.objects(triple.subject, triple.relation)
            .map(|objects| objects.contains(triple.object))
            .unwrap_or(false)
    }

    fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    fn contains_relation(&self, relation: RelationId) -> bool {
        self.relation_counts.contains_key(&relation)
    }

    fn number_of_triples(&self) -> usize {
        self.triples.len()
    }

    fn triples(&self) -> &[Triple] {
        &self.triples
    }
}

// ============================================================================
// GraphStore: labels + index
// ============================================================================

/// The full knowledge graph: interned entity/relation labels plus the
/// triple index.
///
/// Built once by bulk insertion, then read-only.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    entities: StringInterner,
    relations: StringInterner,
    index: TripleIndex,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from labelled triples.
    pub fn from_triples<'a, I>(triples: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut graph = Self::new();
        for (s, r, o) in triples {
            graph.add_triple(s, r, o);
        }
        graph
    }

    /// Add a labelled triple, allocating IDs for unseen entities.
    ///
    /// Idempotent: re-inserting an existing triple changes nothing and
    /// returns the same resolved [`Triple`].
    pub fn add_triple(&mut self, subject: &str, relation: &str, object: &str) -> Triple {
        let triple = Triple {
            subject: self.entities.intern(subject),
            relation: RelationId::new(self.relations.intern(relation)),
            object: self.entities.intern(object),
        };
        self.index.insert(triple);
        triple
    }

    pub fn has_entity(&self, label: &str) -> bool {
        self.entities.contains(label)
    }

    pub fn has_relation(&self, label: &str) -> bool {
        self.relations.contains(label)
    }

    /// Membership check by labels; unknown labels simply yield `false`.
    pub fn has_labeled_triple(&self, subject: &str, relation: &str, object: &str) -> bool {
        let (Some(s), Some(r), Some(o)) = (
            self.entities.id_of(subject),
            self.relations.id_of(relation),
            self.entities.id_of(object),
        ) else {
            return false;
        };
        self.index.has_triple(&Triple {
            subject: s,
            relation: RelationId::new(r),
            object: o,
        })
    }

    pub fn entity_id(&self, label: &str) -> Result<EntityId> {
        self.entities
            .id_of(label)
            .ok_or_else(|| GlimpseError::UnknownEntity(label.to_string()))
    }

    pub fn id_to_entity(&self, id: EntityId) -> Result<&str> {
        self.entities
            .lookup(id)
            .ok_or(GlimpseError::UnknownEntityId(id))
    }

    pub fn relation_id(&self, label: &str) -> Result<RelationId> {
        self.relations
            .id_of(label)
            .map(RelationId::new)
            .ok_or_else(|| GlimpseError::UnknownRelation(label.to_string()))
    }

    pub fn relation_label(&self, id: RelationId) -> Result<&str> {
        self.relations
            .lookup(id.raw())
            .ok_or_else(|| GlimpseError::UnknownRelation(format!("#{}", id.raw())))
    }

    /// Resolve a labelled triple without inserting anything.
    pub fn resolve_triple(&self, subject: &str, relation: &str, object: &str) -> Result<Triple> {
        Ok(Triple {
            subject: self.entity_id(subject)?,
            relation: self.relation_id(relation)?,
            object: self.entity_id(object)?,
        })
    }

    /// Render a triple as `(subject, relation, object)` labels.
    pub fn triple_labels(&self, triple: &Triple) -> Result<(&str, &str, &str)> {
        Ok((
            self.id_to_entity(triple.subject)?,
            self.relation_label(triple.relation)?,
            self.id_to_entity(triple.object)?,
        ))
    }

    pub fn number_of_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn number_of_relations(&self) -> usize {
        self.relations.len()
    }

    pub fn index(&self) -> &TripleIndex {
        &self.index
    }

    // ========================================================================
    // Matrix Views (value model only)
    // ========================================================================

    /// Entity × entity adjacency: `A[s][o] = 1.0` when any relation connects
    /// `s` to `o`. Parallel edges collapse to a single entry.
    pub fn adjacency_matrix(&self) -> SparseMatrix {
        let n = self.number_of_entities();
        let mut entries: Vec<(u32, u32, f64)> = Vec::with_capacity(self.index.len());
        for (&subject, by_relation) in &self.index.adjacency {
            let mut objects = RoaringBitmap::new();
            for targets in by_relation.values() {
                objects |= targets;
            }
            entries.extend(objects.iter().map(|object| (subject, object, 1.0)));
        }
        SparseMatrix::from_entries(n, n, entries)
    }

    /// Column-stochastic transition `T = Aᵀ · D⁻¹`.
    ///
    /// `D` is the out-degree diagonal of [`Self::adjacency_matrix`]. Entities
    /// with zero out-degree get an all-zero column.
    pub fn column_stochastic_transition(&self) -> SparseMatrix {
        let adjacency = self.adjacency_matrix();
        let inverse_degree: Vec<f64> = adjacency
            .row_sums()
            .into_iter()
            .map(|degree| if degree > 0.0 { 1.0 / degree } else { 0.0 })
            .collect();
        adjacency.transpose().scale_columns(&inverse_degree)
    }
}

impl GraphView for GraphStore {
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
        (entity as usize) < self.entities.len()
    }

    fn contains_relation(&self, relation: RelationId) -> bool {
        (relation.raw() as usize) < self.relations.len()
    }

    fn number_of_triples(&self) -> usize {
        self.index.len()
    }

    fn triples(&self) -> &[Triple] {
        self.index.triples()
    }
}
