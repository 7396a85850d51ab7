//! Constrained multi-hop traversal and synthetic query generation.
//!
//! A query starts at a topic entity and follows an inferential chain of
//! relations. Hops are numbered by how many relations have been followed:
//! hop 0 is the topic itself, hop `h` is the candidate set reached through
//! `chain[..h]`. Constraints registered at hop `h` prune hop `h`'s
//! candidates before hop `h + 1` is expanded.
//!
//! [`answer`] and [`generate`] share the same expansion and pruning code, so
//! a generated query replays to exactly its recorded answers.

use crate::graph::GraphView;
use crate::{EntityId, RelationId};
use rand::Rng;
use roaring::RoaringBitmap;

/// Side condition on hop `hop` (1-based for chain hops): a surviving
/// candidate must have a `relation` edge to exactly `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub hop: usize,
    pub relation: RelationId,
    pub value: EntityId,
}

/// A structured multi-hop query over resolved IDs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub topic: EntityId,
    pub chain: Vec<RelationId>,
    pub constraints: Vec<Constraint>,
    /// Gold answers, when known (loaded or generated).
    pub answers: Option<RoaringBitmap>,
    /// Gold answers whose labels do not name a graph entity. They can
    /// never be reached, so they only ever count as misses.
    pub unresolved_answers: usize,
}

impl Query {
    pub fn new(topic: EntityId, chain: Vec<RelationId>) -> Self {
        Self {
            topic,
            chain,
            constraints: Vec::new(),
            answers: None,
            unresolved_answers: 0,
        }
    }

    pub fn with_constraint(mut self, hop: usize, relation: RelationId, value: EntityId) -> Self {
        self.constraints.push(Constraint {
            hop,
            relation,
            value,
        });
        self
    }

    pub fn with_answers(mut self, answers: RoaringBitmap) -> Self {
        self.answers = Some(answers);
        self
    }

    pub fn with_unresolved_answers(mut self, count: usize) -> Self {
        self.unresolved_answers = count;
        self
    }

    fn constraints_at(&self, hop: usize) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.hop == hop)
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Whether `entity` has a `constraint.relation` edge to `constraint.value`.
pub fn satisfies<G: GraphView + ?Sized>(
    graph: &G,
    entity: EntityId,
    constraint: &Constraint,
) -> bool {
    graph
        .objects(entity, constraint.relation)
        .map(|objects| objects.contains(constraint.value))
        .unwrap_or(false)
}

/// Union of `relation`-neighbors over `frontier`.
fn expand<G: GraphView + ?Sized>(
    graph: &G,
    frontier: &RoaringBitmap,
    relation: RelationId,
) -> RoaringBitmap {
    let mut next = RoaringBitmap::new();
    for entity in frontier.iter() {
        if let Some(objects) = graph.objects(entity, relation) {
            next |= objects;
        }
    }
    next
}

/// Drop candidates failing any of `constraints`.
fn prune<'a, G, I>(graph: &G, mut candidates: RoaringBitmap, constraints: I) -> RoaringBitmap
where
    G: GraphView + ?Sized,
    I: IntoIterator<Item = &'a Constraint>,
{
    for constraint in constraints {
        let failing: RoaringBitmap = candidates
            .iter()
            .filter(|&entity| !satisfies(graph, entity, constraint))
            .collect();
        candidates -= failing;
    }
    candidates
}

/// Answer `query` against `graph`.
///
/// The topic entity is never part of the answer, even when the chain leads
/// back to it. A hop with no candidates yields the empty set for the rest
/// of the chain.
pub fn answer<G: GraphView + ?Sized>(graph: &G, query: &Query) -> RoaringBitmap {
    let mut start = RoaringBitmap::new();
    start.insert(query.topic);
    let mut result = prune(graph, start, query.constraints_at(0));

    for (i, &relation) in query.chain.iter().enumerate() {
        if result.is_empty() {
            break;
        }
        let candidates = expand(graph, &result, relation);
        result = prune(graph, candidates, query.constraints_at(i + 1));
    }

    result.remove(query.topic);
    result
}

// ============================================================================
// Generation
// ============================================================================

/// Shape of a synthesized query.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Maximum number of relations in the chain.
    pub chain_length: usize,
    /// Hop (`1..=chain_length`) at which to try to inject one constraint.
    pub constraint_hop: Option<usize>,
    /// Relations never used in the chain or in constraints.
    pub exclude_relations: Vec<RelationId>,
}

impl GenerateOptions {
    pub fn chain(chain_length: usize) -> Self {
        Self {
            chain_length,
            ..Self::default()
        }
    }

    pub fn with_constraint_at(mut self, hop: usize) -> Self {
        self.constraint_hop = Some(hop);
        self
    }
}

fn choose_entity<R: Rng + ?Sized>(set: &RoaringBitmap, rng: &mut R) -> Option<EntityId> {
    if set.is_empty() {
        return None;
    }
    let rank = rng.gen_range(0..set.len()) as u32;
    set.select(rank)
}

/// Synthesize a query rooted at `topic`.
///
/// The chain follows one random outgoing edge per hop and stops early at an
/// entity without usable relations. If `options.constraint_hop` is set, a
/// constraint is drawn from a real outgoing edge of a random candidate at
/// that hop. The resulting answer set (without the topic) is recorded as
/// gold.
pub fn generate<G, R>(graph: &G, topic: EntityId, options: &GenerateOptions, rng: &mut R) -> Query
where
    G: GraphView + ?Sized,
    R: Rng + ?Sized,
{
    let usable = |relation: &RelationId, chain: &[RelationId]| {
        !options.exclude_relations.contains(relation) && !chain.contains(relation)
    };

    // Core inferential chain: a directed walk from the topic.
    let mut chain: Vec<RelationId> = Vec::with_capacity(options.chain_length);
    let mut entity = topic;
    for _ in 0..options.chain_length {
        let relations: Vec<RelationId> = graph
            .relations_of(entity)
            .into_iter()
            .filter(|r| usable(r, &[]))
            .collect();
        if relations.is_empty() {
            break;
        }
        let relation = relations[rng.gen_range(0..relations.len())];
        chain.push(relation);

        match graph.objects(entity, relation).and_then(|o| choose_entity(o, rng)) {
            Some(next) => entity = next,
            None => break,
        }
    }

    // Replay the chain, injecting the optional constraint on the way.
    let mut constraints: Vec<Constraint> = Vec::new();
    let mut result = RoaringBitmap::new();
    result.insert(topic);
    for (i, &relation) in chain.iter().enumerate() {
        let hop = i + 1;
        let mut candidates = expand(graph, &result, relation);

        if options.constraint_hop == Some(hop) {
            if let Some(constraint) = draw_constraint(graph, &candidates, hop, &chain, &usable, rng)
            {
                candidates = prune(graph, candidates, std::iter::once(&constraint));
                constraints.push(constraint);
            }
        }
        result = candidates;
    }
    result.remove(topic);

    Query {
        topic,
        chain,
        constraints,
        answers: Some(result),
        unresolved_answers: 0,
    }
}

fn draw_constraint<G, R, F>(
    graph: &G,
    candidates: &RoaringBitmap,
    hop: usize,
    chain: &[RelationId],
    usable: &F,
    rng: &mut R,
) -> Option<Constraint>
where
    G: GraphView + ?Sized,
    R: Rng + ?Sized,
    F: Fn(&RelationId, &[RelationId]) -> bool,
{
    let anchor = choose_entity(candidates, rng)?;
    let relations: Vec<RelationId> = graph
        .relations_of(anchor)
        .into_iter()
        .filter(|r| usable(r, chain))
        .collect();
    if relations.is_empty() {
        return None;
    }
    let relation = relations[rng.gen_range(0..relations.len())];
    let value = graph
        .objects(anchor, relation)
        .and_then(|objects| choose_entity(objects, rng))?;

    Some(Constraint {
        hop,
        relation,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn friends() -> GraphStore {
        GraphStore::from_triples([
            ("A", "friend", "B"),
            ("B", "friend", "C"),
            ("B", "age", "30"),
        ])
    }

    fn two_hop(graph: &GraphStore) -> Query {
        let friend = graph.relation_id("friend").unwrap();
        Query::new(graph.entity_id("A").unwrap(), vec![friend, friend])
    }

    #[test]
    fn test_two_hop_without_constraints() {
        let graph = friends();
        let result = answer(&graph, &two_hop(&graph));
        let c = graph.entity_id("C").unwrap();
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_hop_constraint_keeps_matching_candidate() {
        let graph = friends();
        let age = graph.relation_id("age").unwrap();
        let thirty = graph.entity_id("30").unwrap();

        // Hop 1 produces B, the entity the constraint is checked on.
        let query = two_hop(&graph).with_constraint(1, age, thirty);
        let c = graph.entity_id("C").unwrap();
        assert_eq!(answer(&graph, &query).iter().collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_hop_constraint_with_wrong_value_empties_answer() {
        let mut graph = friends();
        graph.add_triple("D", "age", "31");
        let age = graph.relation_id("age").unwrap();
        let thirty_one = graph.entity_id("31").unwrap();

        let query = two_hop(&graph).with_constraint(1, age, thirty_one);
        assert!(answer(&graph, &query).is_empty());
    }

    #[test]
    fn test_topic_is_excluded() {
        let graph = GraphStore::from_triples([("A", "knows", "B"), ("B", "knows", "A")]);
        let knows = graph.relation_id("knows").unwrap();
        let query = Query::new(graph.entity_id("A").unwrap(), vec![knows, knows]);
        assert!(answer(&graph, &query).is_empty());
    }

    #[test]
    fn test_dead_end_stays_empty() {
        let graph = friends();
        let friend = graph.relation_id("friend").unwrap();
        let age = graph.relation_id("age").unwrap();
        let query = Query::new(graph.entity_id("A").unwrap(), vec![age, friend]);
        assert!(answer(&graph, &query).is_empty());
    }

    #[test]
    fn test_topic_constraint_applies_at_hop_zero() {
        let graph = friends();
        let friend = graph.relation_id("friend").unwrap();
        let b = graph.entity_id("B").unwrap();
        let c = graph.entity_id("C").unwrap();

        let query = Query::new(graph.entity_id("A").unwrap(), vec![friend]);
        assert_eq!(answer(&graph, &query.clone().with_constraint(0, friend, b)).len(), 1);
        assert!(answer(&graph, &query.with_constraint(0, friend, c)).is_empty());
    }

    #[test]
    fn test_empty_chain_answers_nothing() {
        let graph = friends();
        let query = Query::new(graph.entity_id("A").unwrap(), Vec::new());
        assert!(answer(&graph, &query).is_empty());
    }

    #[test]
    fn test_generated_query_replays() {
        let graph = friends();
        let a = graph.entity_id("A").unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for seed_hop in [None, Some(1), Some(2)] {
            let mut options = GenerateOptions::chain(2);
            options.constraint_hop = seed_hop;
            let query = generate(&graph, a, &options, &mut rng);
            assert_eq!(Some(answer(&graph, &query)), query.answers);
        }
    }

    #[test]
    fn test_generate_respects_exclusions() {
        let graph = friends();
        let friend = graph.relation_id("friend").unwrap();
        let options = GenerateOptions {
            chain_length: 3,
            constraint_hop: None,
            exclude_relations: vec![friend],
        };
        let mut rng = StdRng::seed_from_u64(1);
        let query = generate(&graph, graph.entity_id("A").unwrap(), &options, &mut rng);
        assert!(query.chain.is_empty());
        assert_eq!(query.answers, Some(RoaringBitmap::new()));
    }
}
