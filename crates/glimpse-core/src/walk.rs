//! Personalized random-walk value model.
//!
//! A query workload is turned into a restart (seed) vector over entities. A
//! truncated series approximates `(I − (1−c)T)⁻¹ · c·x0`, and the resulting
//! walk mass gives a relevance value for every entity and triple.
//!
//! The walk vector is renormalized to sum to one after *every* series term,
//! not just at the end. Downstream rankings depend on this weighting, so it
//! is kept as is.

use crate::error::{GlimpseError, Result};
use crate::graph::{GraphStore, GraphView};
use crate::query::Query;
use crate::sparse::SparseMatrix;
use crate::{EntityId, Triple};
use ahash::AHashMap;

pub const DEFAULT_RESTART_PROBABILITY: f64 = 0.15;
pub const DEFAULT_POWER: usize = 1;

/// Walk parameters: restart probability `c` and number of series terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalkValueModel {
    restart_probability: f64,
    power: usize,
}

impl Default for RandomWalkValueModel {
    fn default() -> Self {
        Self {
            restart_probability: DEFAULT_RESTART_PROBABILITY,
            power: DEFAULT_POWER,
        }
    }
}

impl RandomWalkValueModel {
    /// `restart_probability` must lie in `(0, 1]`.
    pub fn new(restart_probability: f64, power: usize) -> Result<Self> {
        if !(restart_probability > 0.0 && restart_probability <= 1.0) {
            return Err(GlimpseError::InvalidParameter {
                name: "restart_probability",
                reason: format!("{restart_probability} is outside (0, 1]"),
            });
        }
        Ok(Self {
            restart_probability,
            power,
        })
    }

    pub fn restart_probability(&self) -> f64 {
        self.restart_probability
    }

    pub fn power(&self) -> usize {
        self.power
    }

    /// Seed vector over all entities: `+1` at each query's topic entity.
    pub fn seed_vector<I>(graph: &GraphStore, topics: I) -> Result<Vec<f64>>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let mut x = vec![0.0; graph.number_of_entities()];
        for topic in topics {
            let slot = x
                .get_mut(topic as usize)
                .ok_or(GlimpseError::UnknownEntityId(topic))?;
            *slot += 1.0;
        }
        Ok(x)
    }

    /// Run the restart-biased series from seed `x0`.
    ///
    /// `q = r = c·x0`, then `power` times: `q ← (1−c)·T·q`, `r ← r + q`,
    /// `r ← r / Σr`. A zero-sum vector is left as is.
    pub fn walk(&self, transition: &SparseMatrix, x0: &[f64]) -> Vec<f64> {
        let c = self.restart_probability;
        let mut q: Vec<f64> = x0.iter().map(|v| c * v).collect();
        let mut r = q.clone();

        for _ in 0..self.power {
            q = transition.mul_vec(&q);
            for v in &mut q {
                *v *= 1.0 - c;
            }
            for (acc, v) in r.iter_mut().zip(&q) {
                *acc += v;
            }
            let total: f64 = r.iter().sum();
            if total > 0.0 {
                for v in &mut r {
                    *v /= total;
                }
            }
        }
        r
    }

    /// Score every entity and triple of `graph` against `workload`.
    pub fn annotate(&self, graph: &GraphStore, workload: &[Query]) -> Result<ValueAnnotation> {
        let x0 = Self::seed_vector(graph, workload.iter().map(|q| q.topic))?;
        self.annotate_seed(graph, &x0)
    }

    /// Like [`Self::annotate`], from a precomputed seed vector.
    pub fn annotate_seed(&self, graph: &GraphStore, x0: &[f64]) -> Result<ValueAnnotation> {
        if x0.len() != graph.number_of_entities() {
            return Err(GlimpseError::InvalidParameter {
                name: "seed",
                reason: format!(
                    "seed has {} entries, graph has {} entities",
                    x0.len(),
                    graph.number_of_entities()
                ),
            });
        }

        let transition = graph.column_stochastic_transition();
        let walk = self.walk(&transition, x0);
        let annotation = ValueAnnotation::from_walk(graph, walk);

        tracing::debug!(
            entities = graph.number_of_entities(),
            triples = graph.number_of_triples(),
            seeded = x0.iter().filter(|v| **v > 0.0).count(),
            power = self.power,
            "computed random-walk values"
        );
        Ok(annotation)
    }
}

// ============================================================================
// Value Annotation
// ============================================================================

/// Per-run entity and triple values derived from one walk.
///
/// Values are non-negative. Entities and triples outside the annotated graph
/// are worth `0`.
#[derive(Debug, Clone, Default)]
pub struct ValueAnnotation {
    walk: Vec<f64>,
    entity_values: Vec<f64>,
    triple_values: AHashMap<Triple, f64>,
}

impl ValueAnnotation {
    /// `entity_value = ln(r[e] + 1)`, `triple_value = ln(r[s]·r[o] + 1)`.
    pub fn from_walk(graph: &GraphStore, walk: Vec<f64>) -> Self {
        let entity_values: Vec<f64> = walk.iter().map(|r| r.ln_1p()).collect();

        let mut triple_values = AHashMap::with_capacity(graph.number_of_triples());
        for triple in graph.triples() {
            let rs = walk.get(triple.subject as usize).copied().unwrap_or(0.0);
            let ro = walk.get(triple.object as usize).copied().unwrap_or(0.0);
            triple_values.insert(*triple, (rs * ro).ln_1p());
        }

        Self {
            walk,
            entity_values,
            triple_values,
        }
    }

    /// Raw (normalized) walk mass at `entity`.
    pub fn walk_score(&self, entity: EntityId) -> f64 {
        self.walk.get(entity as usize).copied().unwrap_or(0.0)
    }

    pub fn walk_vector(&self) -> &[f64] {
        &self.walk
    }

    pub fn entity_value(&self, entity: EntityId) -> f64 {
        self.entity_values.get(entity as usize).copied().unwrap_or(0.0)
    }

    pub fn triple_value(&self, triple: &Triple) -> f64 {
        self.triple_values.get(triple).copied().unwrap_or(0.0)
    }

    /// Upper bound on the marginal value of `triple` against any summary.
    pub fn initial_score(&self, triple: &Triple) -> f64 {
        self.entity_value(triple.subject)
            + self.entity_value(triple.object)
            + self.triple_value(triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain() -> GraphStore {
        GraphStore::from_triples([("A", "r", "B"), ("B", "r", "C")])
    }

    #[test]
    fn test_power_zero_is_scaled_seed() {
        let graph = chain();
        let model = RandomWalkValueModel::new(0.15, 0).unwrap();
        let x0 = RandomWalkValueModel::seed_vector(&graph, [0, 0]).unwrap();
        let r = model.walk(&graph.column_stochastic_transition(), &x0);
        assert_relative_eq!(r[0], 0.3);
        assert_eq!(r[1], 0.0);
        assert_eq!(r[2], 0.0);
    }

    #[test]
    fn test_single_term_is_renormalized() {
        let graph = chain();
        let model = RandomWalkValueModel::default();
        let x0 = RandomWalkValueModel::seed_vector(&graph, [0]).unwrap();
        let r = model.walk(&graph.column_stochastic_transition(), &x0);

        // q0 = 0.15 at A; q1 = 0.85 * 0.15 at B; r = (q0 + q1) / sum.
        let total = 0.15 + 0.85 * 0.15;
        assert_relative_eq!(r[0], 0.15 / total);
        assert_relative_eq!(r[1], 0.85 * 0.15 / total);
        assert_eq!(r[2], 0.0);
        assert_relative_eq!(r.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_empty_workload_yields_zero_values() {
        let graph = chain();
        let values = RandomWalkValueModel::default()
            .annotate(&graph, &[])
            .unwrap();
        for e in 0..3 {
            assert_eq!(values.entity_value(e), 0.0);
            assert!(!values.entity_value(e).is_nan());
        }
        for t in graph.triples() {
            assert_eq!(values.triple_value(t), 0.0);
        }
    }

    #[test]
    fn test_unknown_topic_is_rejected() {
        let graph = chain();
        assert_eq!(
            RandomWalkValueModel::seed_vector(&graph, [9]),
            Err(GlimpseError::UnknownEntityId(9))
        );
    }

    #[test]
    fn test_invalid_restart_probability() {
        assert!(RandomWalkValueModel::new(0.0, 1).is_err());
        assert!(RandomWalkValueModel::new(1.5, 1).is_err());
        assert!(RandomWalkValueModel::new(f64::NAN, 1).is_err());
        assert!(RandomWalkValueModel::new(1.0, 3).is_ok());
    }

    #[test]
    fn test_values_use_log_transform() {
        let graph = chain();
        let values = RandomWalkValueModel::default()
            .annotate_seed(&graph, &[1.0, 0.0, 0.0])
            .unwrap();
        let ra = values.walk_score(0);
        let rb = values.walk_score(1);

        assert_relative_eq!(values.entity_value(0), (ra + 1.0).ln());
        let ab = graph.triples()[0];
        assert_relative_eq!(values.triple_value(&ab), (ra * rb + 1.0).ln());
        assert_relative_eq!(
            values.initial_score(&ab),
            values.entity_value(0) + values.entity_value(1) + values.triple_value(&ab)
        );
    }
}
