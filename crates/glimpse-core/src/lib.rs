//! GLIMPSE: query-relevant knowledge-graph summarization.
//!
//! Given a knowledge graph and a log of structured queries, build a summary of
//! at most `K` triples that answers as many future queries as possible.
//!
//! Key pieces:
//! 1. **Graph store**: interned labels, dense IDs, and a subject → relation →
//!    objects adjacency of Roaring bitmaps ([`GraphStore`]).
//! 2. **Value model**: a personalized random walk seeded at query topics that
//!    scores entities and triples ([`RandomWalkValueModel`]).
//! 3. **Selection**: lazy-lazy-greedy maximization of a submodular coverage
//!    objective under stochastic sampling ([`LazyGreedySelector`]).
//! 4. **Traversal**: constrained multi-hop query answering over any
//!    [`GraphView`], plus synthetic query generation ([`answer`],
//!    [`generate`]).
//!
//! ## Module Organization
//!
//! - `graph`: the [`GraphView`] read contract, [`TripleIndex`], [`GraphStore`]
//! - `walk`: [`RandomWalkValueModel`] and its [`ValueAnnotation`] output
//! - `summary`, `candidates`, `selector`: the bounded summary and how it is filled
//! - `query`: [`Query`], [`answer`], [`generate`]
//! - `config`: [`SummarizeConfig`] and [`Budget`]

pub mod candidates;
pub mod config;
pub mod error;
pub mod graph;
mod interner;
pub mod query;
pub mod selector;
pub mod sparse;
pub mod summary;
pub mod walk;

use serde::{Deserialize, Serialize};

pub use candidates::{Candidate, CandidatePool};
pub use config::{Budget, SummarizeConfig};
pub use error::{GlimpseError, Result};
pub use graph::{GraphStore, GraphView, TripleIndex};
pub use interner::StringInterner;
pub use query::{answer, generate, satisfies, Constraint, GenerateOptions, Query};
pub use selector::LazyGreedySelector;
pub use sparse::SparseMatrix;
pub use summary::{objective, Summary};
pub use walk::{RandomWalkValueModel, ValueAnnotation};

// ============================================================================
// Core Identifiers
// ============================================================================

/// Dense entity ID, assigned in first-insertion order starting at 0.
pub type EntityId = u32;

/// Dense relation ID, assigned in first-insertion order starting at 0.
///
/// Kept distinct from [`EntityId`] so the two ID spaces can't be mixed up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct RelationId(u32);

impl RelationId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A directed labelled edge `(subject, relation, object)` over resolved IDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Triple {
    pub subject: EntityId,
    pub relation: RelationId,
    pub object: EntityId,
}
