//! Run configuration: an optional TOML file, overridden by flags.
//!
//! ```toml
//! [summarize]
//! budget = { fraction = 0.001 }
//! epsilon = 0.001
//! seed = 7
//!
//! [workload]
//! n_users = 5
//! n_queries = 200
//! n_topics = 3          # draw topic lists instead of topic entities
//! n_mids_per_topic = 20
//!
//! [[method]]
//! name = "glimpse-3"
//! power = 3
//! ```

use anyhow::{anyhow, Context, Result};
use glimpse_core::SummarizeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub n_users: usize,
    pub n_queries: usize,
    pub n_topic_mids: usize,
    /// Named topics per user. When set, logs are drawn from the
    /// `by-topic` question lists instead of from topic entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_topics: Option<usize>,
    /// Topic entities drawn (with replacement) from each named topic.
    pub n_mids_per_topic: usize,
    pub random_query_prob: f64,
    pub shuffle: bool,
    pub test_size: f64,
    pub max_chain_length: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            n_users: 5,
            n_queries: 200,
            n_topic_mids: 50,
            n_topics: None,
            n_mids_per_topic: 20,
            random_query_prob: 0.1,
            shuffle: false,
            test_size: 0.5,
            max_chain_length: 3,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("random_query_prob", self.random_query_prob),
            ("test_size", self.test_size),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{name} must be in [0, 1], got {value}"));
            }
        }
        if self.n_users == 0 || self.n_queries == 0 || self.n_topic_mids == 0 {
            return Err(anyhow!("n_users, n_queries and n_topic_mids must be positive"));
        }
        if self.max_chain_length == 0 {
            return Err(anyhow!("max_chain_length must be positive"));
        }
        if self.n_topics == Some(0) || self.n_mids_per_topic == 0 {
            return Err(anyhow!("n_topics and n_mids_per_topic must be positive"));
        }
        Ok(())
    }
}

/// A named summarization method; unset fields inherit from `[summarize]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub name: String,
    #[serde(default)]
    pub power: Option<usize>,
    #[serde(default)]
    pub restart_probability: Option<f64>,
    #[serde(default)]
    pub epsilon: Option<f64>,
    /// Disable sampling: plain lazy greedy over the whole pool.
    #[serde(default)]
    pub exhaustive: bool,
}

impl MethodConfig {
    fn with_power(name: &str, power: usize) -> Self {
        Self {
            name: name.to_string(),
            power: Some(power),
            ..Self::default()
        }
    }

    pub fn apply(&self, base: &SummarizeConfig) -> SummarizeConfig {
        let mut config = base.clone();
        if let Some(power) = self.power {
            config.power = power;
        }
        if let Some(c) = self.restart_probability {
            config.restart_probability = c;
        }
        if let Some(eps) = self.epsilon {
            config.epsilon = Some(eps);
        }
        if self.exhaustive {
            config.epsilon = None;
        }
        config
    }
}

pub fn builtin_methods() -> Vec<MethodConfig> {
    vec![
        MethodConfig::with_power("glimpse", 1),
        MethodConfig::with_power("glimpse-2", 2),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub summarize: SummarizeConfig,
    pub workload: WorkloadConfig,
    pub method: Vec<MethodConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Look up methods by name: file-defined methods shadow built-ins.
    pub fn methods(&self, names: &[String]) -> Result<Vec<(String, SummarizeConfig)>> {
        let builtins = builtin_methods();
        names
            .iter()
            .map(|name| {
                let method = self
                    .method
                    .iter()
                    .chain(builtins.iter())
                    .find(|m| &m.name == name)
                    .ok_or_else(|| anyhow!("unknown method `{name}`"))?;
                let config = method.apply(&self.summarize);
                config
                    .validate()
                    .with_context(|| format!("invalid parameters for method `{name}`"))?;
                Ok((name.clone(), config))
            })
            .collect()
    }
}
