//! Simulated query logs.
//!
//! A user's log concentrates on a handful of topic entities with a random
//! popularity distribution over them. Queries for a topic entity are
//! replayed from loaded question records when it has any, and synthesized
//! with [`generate`] otherwise.
//!
//! In topic mode the user first picks a few named topics (`by-topic` lists),
//! splits the log among them, and draws topic entities from each topic's
//! questions.

use crate::config::WorkloadConfig;
use anyhow::{Context, Result};
use glimpse_core::{generate, EntityId, GenerateOptions, GraphStore, GraphView, Query, RelationId};
use glimpse_ingest::{list_topics, load_topic_questions, QuestionRecord};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One entry of a query log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub qid: String,
    pub query: Query,
}

impl LoggedQuery {
    pub fn new(qid: impl Into<String>, query: Query) -> Self {
        Self {
            qid: qid.into(),
            query,
        }
    }
}

// ============================================================================
// Question Pool
// ============================================================================

/// Resolved question records, indexed by topic entity.
#[derive(Debug, Clone, Default)]
pub struct QuestionPool {
    all: Vec<LoggedQuery>,
    by_topic: BTreeMap<EntityId, Vec<usize>>,
}

impl QuestionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `records` against `graph`. Records that mention unknown
    /// labels are logged and skipped.
    pub fn from_records<'a, I>(graph: &GraphStore, records: I) -> Self
    where
        I: IntoIterator<Item = &'a QuestionRecord>,
    {
        let mut pool = Self::new();
        let mut skipped = 0usize;
        for record in records {
            match record.resolve(graph) {
                Ok(query) => pool.push(LoggedQuery::new(record.question_id.clone(), query)),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        qid = %record.question_id,
                        error = %e,
                        "skipping unresolvable question"
                    );
                }
            }
        }
        tracing::info!(resolved = pool.len(), skipped, "built question pool");
        pool
    }

    pub fn push(&mut self, entry: LoggedQuery) {
        self.by_topic
            .entry(entry.query.topic)
            .or_default()
            .push(self.all.len());
        self.all.push(entry);
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn all(&self) -> &[LoggedQuery] {
        &self.all
    }

    /// Topic entities with at least one question, ascending.
    pub fn topics(&self) -> Vec<EntityId> {
        self.by_topic.keys().copied().collect()
    }

    pub fn for_topic(&self, topic: EntityId) -> Vec<&LoggedQuery> {
        self.by_topic
            .get(&topic)
            .map(|positions| positions.iter().map(|&i| &self.all[i]).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Named Topics
// ============================================================================

/// A named topic and the topic entities of its listed questions, one entry
/// per question.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTopic {
    pub name: String,
    pub mids: Vec<EntityId>,
}

/// Every `by-topic` list under `query_dir` with at least one topic entity
/// in `graph`.
pub fn load_named_topics(graph: &GraphStore, query_dir: &Path) -> Result<Vec<NamedTopic>> {
    let names = list_topics(query_dir)
        .with_context(|| format!("failed to list topics in {}", query_dir.display()))?;
    let mut topics = Vec::with_capacity(names.len());
    for name in names {
        let records = load_topic_questions(query_dir, &name)
            .with_context(|| format!("failed to load questions of topic `{name}`"))?;
        let mids: Vec<EntityId> = records
            .values()
            .filter_map(|record| graph.entity_id(record.topic_label()).ok())
            .collect();
        if mids.is_empty() {
            tracing::warn!(topic = %name, "no topic entity of this topic is in the graph");
            continue;
        }
        topics.push(NamedTopic { name, mids });
    }
    tracing::info!(topics = topics.len(), "loaded topic lists");
    Ok(topics)
}

/// Draw up to `n` distinct named topics.
pub fn sample_named_topics<'a, R: Rng + ?Sized>(
    topics: &'a [NamedTopic],
    n: usize,
    rng: &mut R,
) -> Vec<&'a NamedTopic> {
    index::sample(rng, topics.len(), n.min(topics.len()))
        .into_iter()
        .map(|i| &topics[i])
        .collect()
}

// ============================================================================
// Log Simulation
// ============================================================================

/// Draw up to `n` distinct topic entities: pool topics when the pool is
/// non-empty, otherwise any entity with an outgoing relation.
pub fn sample_topics<R: Rng + ?Sized>(
    graph: &GraphStore,
    pool: &QuestionPool,
    n: usize,
    rng: &mut R,
) -> Vec<EntityId> {
    let candidates: Vec<EntityId> = if pool.is_empty() {
        let subjects: RoaringBitmap = graph.triples().iter().map(|t| t.subject).collect();
        subjects.iter().collect()
    } else {
        pool.topics()
    };
    let amount = n.min(candidates.len());
    index::sample(rng, candidates.len(), amount)
        .into_iter()
        .map(|i| candidates[i])
        .collect()
}

/// Simulate one user's query log over the topic entities `mids`.
pub fn query_log_by_mids<R: Rng + ?Sized>(
    graph: &GraphStore,
    mids: &[EntityId],
    pool: &QuestionPool,
    config: &WorkloadConfig,
    rng: &mut R,
) -> Vec<LoggedQuery> {
    let n = config.n_queries;
    if mids.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut log: Vec<LoggedQuery> = Vec::with_capacity(n);
    extend_by_mids(&mut log, graph, mids, n, pool, config, rng);
    finish_log(&mut log, pool, config, rng);
    log
}

/// Simulate one user's query log over named `topics`.
///
/// The log is split among the topics by random shares. Each topic then
/// draws `n_mids_per_topic` of its topic entities with replacement and
/// splits its part of the log among them.
pub fn query_log_by_topics<R: Rng + ?Sized>(
    graph: &GraphStore,
    topics: &[&NamedTopic],
    pool: &QuestionPool,
    config: &WorkloadConfig,
    rng: &mut R,
) -> Vec<LoggedQuery> {
    let n = config.n_queries;
    if topics.is_empty() || n == 0 {
        return Vec::new();
    }

    let shares = random_shares(topics.len(), rng);
    let mut log: Vec<LoggedQuery> = Vec::with_capacity(n);
    for (topic, share) in topics.iter().zip(shares) {
        let remaining = n - log.len();
        if remaining == 0 {
            break;
        }
        if topic.mids.is_empty() {
            continue;
        }
        let count = ((share * n as f64).ceil() as usize).min(remaining);
        let mids: Vec<EntityId> = (0..config.n_mids_per_topic)
            .map(|_| topic.mids[rng.gen_range(0..topic.mids.len())])
            .collect();
        tracing::debug!(topic = %topic.name, queries = count, "allocated topic");
        extend_by_mids(&mut log, graph, &mids, count, pool, config, rng);
    }

    finish_log(&mut log, pool, config, rng);
    log
}

/// Random weights over `n` parts, normalized to sum to one.
fn random_shares<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    let weights: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.into_iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

/// Append `n` queries split among `mids` by random shares.
fn extend_by_mids<R: Rng + ?Sized>(
    log: &mut Vec<LoggedQuery>,
    graph: &GraphStore,
    mids: &[EntityId],
    n: usize,
    pool: &QuestionPool,
    config: &WorkloadConfig,
    rng: &mut R,
) {
    let target = log.len() + n;
    let shares = random_shares(mids.len(), rng);
    for (&mid, share) in mids.iter().zip(shares) {
        let remaining = target - log.len();
        if remaining == 0 {
            break;
        }
        let count = ((share * n as f64).ceil() as usize).min(remaining);
        let replay = pool.for_topic(mid);

        for _ in 0..count {
            let entry = if replay.is_empty() {
                let chain_length = rng.gen_range(1..=config.max_chain_length.max(1));
                let query = generate(graph, mid, &GenerateOptions::chain(chain_length), rng);
                LoggedQuery::new(format!("Synth-{mid}-{}", log.len()), query)
            } else {
                replay[rng.gen_range(0..replay.len())].clone()
            };
            log.push(entry);
        }
    }
}

/// Replace a `random_query_prob` fraction of `log` with pool questions,
/// then shuffle if asked to.
fn finish_log<R: Rng + ?Sized>(
    log: &mut [LoggedQuery],
    pool: &QuestionPool,
    config: &WorkloadConfig,
    rng: &mut R,
) {
    if !pool.is_empty() {
        let replaced = (config.random_query_prob * log.len() as f64).floor() as usize;
        for position in index::sample(rng, log.len(), replaced.min(log.len())) {
            log[position] = pool.all()[rng.gen_range(0..pool.len())].clone();
        }
    }

    if config.shuffle {
        log.shuffle(rng);
    }
}

/// Split `log` into `(train, test)` after shuffling. The test side gets
/// `ceil(test_size * len)` entries.
pub fn train_test_split<R: Rng + ?Sized>(
    log: &[LoggedQuery],
    test_size: f64,
    rng: &mut R,
) -> (Vec<LoggedQuery>, Vec<LoggedQuery>) {
    let mut train = log.to_vec();
    train.shuffle(rng);
    let n_test = ((test_size.clamp(0.0, 1.0) * log.len() as f64).ceil() as usize).min(log.len());
    let test = train.split_off(log.len() - n_test);
    (train, test)
}

// ============================================================================
// Log Statistics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogStats {
    pub queries: usize,
    pub distinct: usize,
    /// Fraction of entries whose question id already appeared earlier.
    pub reuse: f64,
    /// Topic entity occurrences.
    pub entity_counts: BTreeMap<EntityId, usize>,
    /// Chain relation occurrences.
    pub relation_counts: BTreeMap<RelationId, usize>,
}

impl LogStats {
    pub fn of(log: &[LoggedQuery]) -> Self {
        let mut stats = Self {
            queries: log.len(),
            ..Self::default()
        };
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for entry in log {
            seen.insert(entry.qid.as_str());
            *stats.entity_counts.entry(entry.query.topic).or_default() += 1;
            for &relation in &entry.query.chain {
                *stats.relation_counts.entry(relation).or_default() += 1;
            }
        }
        stats.distinct = seen.len();
        if stats.queries > 0 {
            stats.reuse = 1.0 - stats.distinct as f64 / stats.queries as f64;
        }
        stats
    }
}

/// The queries of `log`, in order.
pub fn queries(log: &[LoggedQuery]) -> Vec<Query> {
    log.iter().map(|entry| entry.query.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glimpse_core::answer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn movies() -> GraphStore {
        GraphStore::from_triples([
            ("alice", "likes", "inception"),
            ("alice", "likes", "heat"),
            ("bob", "likes", "heat"),
            ("inception", "directed_by", "nolan"),
            ("heat", "directed_by", "mann"),
            ("nolan", "born_in", "london"),
            ("mann", "born_in", "chicago"),
        ])
    }

    fn workload(n_queries: usize) -> WorkloadConfig {
        WorkloadConfig {
            n_queries,
            random_query_prob: 0.0,
            ..WorkloadConfig::default()
        }
    }

    #[test]
    fn test_sample_topics_without_pool_uses_subjects() {
        let graph = movies();
        let mut rng = StdRng::seed_from_u64(3);
        let topics = sample_topics(&graph, &QuestionPool::new(), 100, &mut rng);

        assert_eq!(topics.len(), 6);
        let distinct: BTreeSet<_> = topics.iter().collect();
        assert_eq!(distinct.len(), topics.len());
        for topic in topics {
            assert!(!graph.relations_of(topic).is_empty());
        }
    }

    #[test]
    fn test_synthetic_log_has_requested_length() {
        let graph = movies();
        let mut rng = StdRng::seed_from_u64(11);
        let topics = sample_topics(&graph, &QuestionPool::new(), 3, &mut rng);
        let log = query_log_by_mids(&graph, &topics, &QuestionPool::new(), &workload(40), &mut rng);

        assert_eq!(log.len(), 40);
        for entry in &log {
            assert!(entry.qid.starts_with("Synth-"));
            assert!(topics.contains(&entry.query.topic));
            assert!(!entry.query.chain.is_empty());
            assert_eq!(entry.query.answers.as_ref(), Some(&answer(&graph, &entry.query)));
        }
    }

    #[test]
    fn test_pool_questions_are_replayed() {
        let graph = movies();
        let alice = graph.entity_id("alice").unwrap();
        let likes = graph.relation_id("likes").unwrap();
        let mut pool = QuestionPool::new();
        pool.push(LoggedQuery::new("WebQTrn-1", Query::new(alice, vec![likes])));

        let mut rng = StdRng::seed_from_u64(5);
        let topics = sample_topics(&graph, &pool, 10, &mut rng);
        assert_eq!(topics, vec![alice]);

        let log = query_log_by_mids(&graph, &topics, &pool, &workload(6), &mut rng);
        assert_eq!(log.len(), 6);
        assert!(log.iter().all(|e| e.qid == "WebQTrn-1"));

        let stats = LogStats::of(&log);
        assert_eq!(stats.distinct, 1);
        assert_relative_eq!(stats.reuse, 5.0 / 6.0);
        assert_eq!(stats.entity_counts.get(&alice), Some(&6));
        assert_eq!(stats.relation_counts.get(&likes), Some(&6));
    }

    #[test]
    fn test_random_queries_come_from_pool() {
        let graph = movies();
        let alice = graph.entity_id("alice").unwrap();
        let bob = graph.entity_id("bob").unwrap();
        let likes = graph.relation_id("likes").unwrap();
        let mut pool = QuestionPool::new();
        pool.push(LoggedQuery::new("WebQTrn-2", Query::new(bob, vec![likes])));

        let config = WorkloadConfig {
            random_query_prob: 1.0,
            ..workload(8)
        };
        let mut rng = StdRng::seed_from_u64(9);
        let log = query_log_by_mids(&graph, &[alice], &pool, &config, &mut rng);

        assert_eq!(log.len(), 8);
        assert!(log.iter().all(|e| e.qid == "WebQTrn-2"));
    }

    #[test]
    fn test_train_test_split_sizes() {
        let graph = movies();
        let mut rng = StdRng::seed_from_u64(1);
        let topics = sample_topics(&graph, &QuestionPool::new(), 2, &mut rng);
        let log = query_log_by_mids(&graph, &topics, &QuestionPool::new(), &workload(10), &mut rng);

        let (train, test) = train_test_split(&log, 0.25, &mut rng);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);

        let (train, test) = train_test_split(&log, 0.0, &mut rng);
        assert_eq!((train.len(), test.len()), (10, 0));
    }

    #[test]
    fn test_empty_inputs() {
        let graph = movies();
        let mut rng = StdRng::seed_from_u64(0);
        let log = query_log_by_mids(&graph, &[], &QuestionPool::new(), &workload(10), &mut rng);
        assert!(log.is_empty());
        assert_eq!(LogStats::of(&log), LogStats::default());
        assert!(query_log_by_topics(&graph, &[], &QuestionPool::new(), &workload(10), &mut rng)
            .is_empty());
    }

    #[test]
    fn test_topic_log_stays_within_sampled_topics() {
        let graph = movies();
        let id = |label: &str| graph.entity_id(label).unwrap();
        let topics = vec![
            NamedTopic {
                name: "film".to_string(),
                mids: vec![id("inception"), id("heat"), id("heat")],
            },
            NamedTopic {
                name: "people".to_string(),
                mids: vec![id("nolan"), id("mann")],
            },
            NamedTopic {
                name: "fans".to_string(),
                mids: vec![id("alice")],
            },
        ];
        let likes = graph.relation_id("likes").unwrap();
        let mut pool = QuestionPool::new();
        pool.push(LoggedQuery::new("WebQTrn-4", Query::new(id("alice"), vec![likes])));

        let config = WorkloadConfig {
            n_mids_per_topic: 4,
            ..workload(30)
        };
        let mut rng = StdRng::seed_from_u64(17);
        let sampled = sample_named_topics(&topics, 2, &mut rng);
        assert_eq!(sampled.len(), 2);
        assert_ne!(sampled[0].name, sampled[1].name);

        let allowed: BTreeSet<EntityId> =
            sampled.iter().flat_map(|t| t.mids.iter().copied()).collect();
        let log = query_log_by_topics(&graph, &sampled, &pool, &config, &mut rng);
        assert_eq!(log.len(), 30);
        for entry in &log {
            assert!(allowed.contains(&entry.query.topic));
            if entry.query.topic == id("alice") {
                assert_eq!(entry.qid, "WebQTrn-4");
            }
        }
    }

    #[test]
    fn test_named_topics_load_from_lists() {
        let graph = movies();
        let dir = tempfile::tempdir().unwrap();
        let record = |qid: &str, topic: &str| -> QuestionRecord {
            serde_json::from_str(&format!(
                r#"{{"QuestionId": "{qid}", "Parse": {{"TopicEntityMid": "{topic}",
                    "InferentialChain": ["likes"], "Answers": []}}}}"#
            ))
            .unwrap()
        };
        let known = record("WebQTrn-10", "alice");
        let outside = record("WebQTrn-11", "carol");
        for r in [&known, &outside] {
            glimpse_ingest::save_question(r, &dir.path().join(format!("{}.json", r.question_id)))
                .unwrap();
        }
        glimpse_ingest::write_topic_list(dir.path(), "fans", [&known, &outside]).unwrap();
        glimpse_ingest::write_topic_list(dir.path(), "strangers", [&outside]).unwrap();

        let topics = load_named_topics(&graph, dir.path()).unwrap();
        assert_eq!(
            topics,
            vec![NamedTopic {
                name: "fans".to_string(),
                mids: vec![graph.entity_id("alice").unwrap()],
            }]
        );
        assert!(load_named_topics(&graph, &dir.path().join("missing")).is_err());
    }
}
