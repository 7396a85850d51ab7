//! Summarization parameters.
//!
//! Everything a summarization run needs besides the graph and the workload.
//! All fields have defaults, so a partial TOML/JSON table deserializes.

use crate::error::{GlimpseError, Result};
use crate::selector::{LazyGreedySelector, DEFAULT_EPSILON};
use crate::walk::{RandomWalkValueModel, DEFAULT_POWER, DEFAULT_RESTART_PROBABILITY};
use serde::{Deserialize, Serialize};

/// Default summary size as a fraction of the parent graph's triples.
pub const DEFAULT_BUDGET_FRACTION: f64 = 0.001;

/// Summary size: an absolute triple count or a fraction of the parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    Triples(i64),
    Fraction(f64),
}

impl Default for Budget {
    fn default() -> Self {
        Budget::Fraction(DEFAULT_BUDGET_FRACTION)
    }
}

impl Budget {
    /// `K` for a parent graph with `total_triples` triples. Fractions round
    /// down.
    pub fn resolve(&self, total_triples: usize) -> Result<usize> {
        match *self {
            Budget::Triples(k) => usize::try_from(k)
                .map_err(|_| GlimpseError::InvalidBudget(format!("{k} triples"))),
            Budget::Fraction(f) => {
                if !(0.0..=1.0).contains(&f) {
                    return Err(GlimpseError::InvalidBudget(format!(
                        "fraction {f} is outside [0, 1]"
                    )));
                }
                Ok((f * total_triples as f64).floor() as usize)
            }
        }
    }
}

/// One summarization method: value-model and selector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    pub budget: Budget,
    pub restart_probability: f64,
    pub power: usize,
    /// `None` disables sampling.
    pub epsilon: Option<f64>,
    pub seed: u64,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            budget: Budget::default(),
            restart_probability: DEFAULT_RESTART_PROBABILITY,
            power: DEFAULT_POWER,
            epsilon: Some(DEFAULT_EPSILON),
            seed: 0,
        }
    }
}

impl SummarizeConfig {
    pub fn validate(&self) -> Result<()> {
        self.budget.resolve(0)?;
        self.value_model()?;
        self.selector()?;
        Ok(())
    }

    pub fn value_model(&self) -> Result<RandomWalkValueModel> {
        RandomWalkValueModel::new(self.restart_probability, self.power)
    }

    pub fn selector(&self) -> Result<LazyGreedySelector> {
        LazyGreedySelector::new(self.epsilon)
    }
}
