//! Lazy-lazy-greedy selection of a bounded summary.
//!
//! Each step samples candidates uniformly without replacement, trusts stale
//! upper-bound scores wherever submodularity allows, and recomputes true
//! marginal values only when the stale ranking could be wrong.

use crate::candidates::CandidatePool;
use crate::error::{GlimpseError, Result};
use crate::graph::{GraphStore, GraphView};
use crate::summary::Summary;
use crate::walk::ValueAnnotation;
use rand::seq::index;
use rand::Rng;

pub const DEFAULT_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LazyGreedySelector {
    epsilon: Option<f64>,
}

impl Default for LazyGreedySelector {
    fn default() -> Self {
        Self {
            epsilon: Some(DEFAULT_EPSILON),
        }
    }
}

impl LazyGreedySelector {
    /// `epsilon` must lie in `(0, 1]`; `None` samples the whole pool.
    pub fn new(epsilon: Option<f64>) -> Result<Self> {
        if let Some(eps) = epsilon {
            if !(eps > 0.0 && eps <= 1.0) {
                return Err(GlimpseError::InvalidParameter {
                    name: "epsilon",
                    reason: format!("{eps} is outside (0, 1]"),
                });
            }
        }
        Ok(Self { epsilon })
    }

    /// Plain greedy over the whole pool on every step.
    pub fn exhaustive() -> Self {
        Self { epsilon: None }
    }

    pub fn epsilon(&self) -> Option<f64> {
        self.epsilon
    }

    /// `min(n, ⌈n/k · ln(1/ε)⌉)`, at least one when `n > 0`.
    pub fn sample_size(&self, n: usize, k: usize) -> usize {
        let Some(eps) = self.epsilon else {
            return n;
        };
        if n == 0 || k == 0 {
            return n;
        }
        let m = (n as f64 / k as f64 * (1.0 / eps).ln()).ceil();
        (m as usize).clamp(1, n)
    }

    /// Select up to `k` triples of `graph` maximizing the summary objective.
    ///
    /// Returns exactly `min(k, |graph|)` triples: once the positive-value
    /// candidates are used up, the summary is padded with parent triples in
    /// insertion order.
    pub fn select<'g, R: Rng + ?Sized>(
        &self,
        graph: &'g GraphStore,
        values: &'g ValueAnnotation,
        k: usize,
        rng: &mut R,
    ) -> Summary<'g> {
        let mut summary = Summary::new(graph, values, k);
        if k == 0 || graph.number_of_triples() == 0 {
            return summary;
        }

        let mut candidates = CandidatePool::from_graph(graph, values);
        let pool_size = candidates.len();

        if candidates.len() <= k {
            summary.fill(candidates.iter().map(|c| &c.triple));
        } else {
            while !candidates.is_empty() && !summary.is_full() {
                let sample = self.draw(candidates.len(), k, rng);
                let winner = best_in_sample(&mut candidates, &sample, &summary);
                tracing::trace!(
                    pool = candidates.len(),
                    sample = sample.len(),
                    score = candidates.score(winner),
                    "accepted candidate"
                );
                candidates.promote(winner);
                let triple = candidates.pop();
                summary.add_triple(triple);
            }
        }

        let greedy = summary.len();
        let padded = summary.fill(graph.triples());
        tracing::debug!(
            k,
            candidates = pool_size,
            greedy,
            padded,
            objective = summary.objective(),
            "selected summary"
        );
        summary
    }

    fn draw<R: Rng + ?Sized>(&self, n: usize, k: usize, rng: &mut R) -> Vec<usize> {
        let m = self.sample_size(n, k);
        if m >= n {
            (0..n).collect()
        } else {
            index::sample(rng, n, m).into_vec()
        }
    }
}

/// Index of the true best candidate within `sample`.
///
/// Refreshes the stale leader first. If it still beats every other stale
/// score it wins outright; otherwise the sampled candidates that touch the
/// summary are refreshed and the maximum is taken again.
fn best_in_sample(
    candidates: &mut CandidatePool,
    sample: &[usize],
    summary: &Summary<'_>,
) -> usize {
    let (top, runner_up) = stale_leaders(candidates, sample);

    let refreshed = candidates.refresh(top, summary);
    if refreshed >= runner_up {
        return top;
    }

    for &i in sample {
        if i != top && candidates.touches(i, summary) {
            candidates.refresh(i, summary);
        }
    }
    argmax(candidates, sample)
}

/// Highest stale score in `sample` and the best score among the rest.
fn stale_leaders(candidates: &CandidatePool, sample: &[usize]) -> (usize, f64) {
    let top = argmax(candidates, sample);
    let runner_up = sample
        .iter()
        .filter(|&&i| i != top)
        .map(|&i| candidates.score(i))
        .fold(f64::NEG_INFINITY, f64::max);
    (top, runner_up)
}

/// First index in `sample` with the maximum score. `sample` is non-empty.
fn argmax(candidates: &CandidatePool, sample: &[usize]) -> usize {
    let mut best = sample[0];
    for &i in &sample[1..] {
        if candidates.score(i) > candidates.score(best) {
            best = i;
        }
    }
    best
}
