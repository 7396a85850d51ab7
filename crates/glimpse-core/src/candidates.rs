//! Candidate pool for lazy greedy selection.
//!
//! Candidates live in an unordered array. Their scores are upper bounds on
//! the true marginal value and go stale as the summary grows; they are only
//! recomputed on demand. Selection moves the winner to the end of the array
//! ([`CandidatePool::promote`]) and removes it with [`CandidatePool::pop`].

use crate::graph::GraphView;
use crate::summary::Summary;
use crate::walk::ValueAnnotation;
use crate::Triple;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub triple: Triple,
    /// Last computed marginal value. Never below the current true value.
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    items: Vec<Candidate>,
}

impl CandidatePool {
    /// Score every triple of `graph` with [`ValueAnnotation::initial_score`],
    /// keeping only strictly positive scores.
    pub fn from_graph<G: GraphView + ?Sized>(graph: &G, values: &ValueAnnotation) -> Self {
        let items = graph
            .triples()
            .iter()
            .filter_map(|triple| {
                let score = values.initial_score(triple);
                (score > 0.0).then_some(Candidate {
                    triple: *triple,
                    score,
                })
            })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.items.get(index)
    }

    pub fn score(&self, index: usize) -> f64 {
        self.items[index].score
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    /// Recompute the true marginal value of candidate `index` against
    /// `summary` and store it.
    pub fn refresh(&mut self, index: usize, summary: &Summary<'_>) -> f64 {
        let item = &mut self.items[index];
        item.score = summary.marginal_value(&item.triple);
        item.score
    }

    /// Whether candidate `index` shares an entity with `summary`. A candidate
    /// that shares none still has its initial marginal value.
    pub fn touches(&self, index: usize, summary: &Summary<'_>) -> bool {
        let triple = &self.items[index].triple;
        summary.entities().contains(triple.subject) || summary.entities().contains(triple.object)
    }

    /// Swap candidate `index` into the last slot.
    pub fn promote(&mut self, index: usize) {
        let last = self.items.len() - 1;
        self.items.swap(index, last);
    }

    /// Remove and return the last candidate's triple.
    ///
    /// # Panics
    ///
    /// Panics if the pool is empty. Callers check [`Self::len`] first.
    pub fn pop(&mut self) -> Triple {
        let Some(candidate) = self.items.pop() else {
            panic!("pop from an empty candidate pool");
        };
        candidate.triple
    }
}
