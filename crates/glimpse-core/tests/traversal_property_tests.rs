use glimpse_core::{
    answer, generate, Constraint, EntityId, GenerateOptions, GraphStore, GraphView,
    LazyGreedySelector, Query, RandomWalkValueModel, RelationId,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

const MAX_ENTITIES: usize = 12;
const MAX_REL_TYPES: usize = 4;
const MAX_EDGES: usize = 60;
const MAX_CHAIN_LEN: usize = 4;

#[derive(Debug, Clone)]
struct QueryCase {
    entity_count: usize,
    rel_count: usize,
    edges: Vec<(usize, usize, usize)>, // (src_idx, rel_idx, dst_idx)
    topic_idx: usize,
    chain: Vec<usize>,
    constraints: Vec<(usize, usize, usize)>, // (hop, rel_idx, value_idx)
}

fn query_case_strategy() -> impl Strategy<Value = QueryCase> {
    (1usize..=MAX_ENTITIES, 1usize..=MAX_REL_TYPES, 0usize..=MAX_CHAIN_LEN).prop_flat_map(
        |(entity_count, rel_count, chain_len)| {
            (
                Just(entity_count),
                Just(rel_count),
                prop::collection::vec(
                    (0..entity_count, 0..rel_count, 0..entity_count),
                    0..=MAX_EDGES,
                ),
                0..entity_count,
                prop::collection::vec(0..rel_count, chain_len),
                prop::collection::vec(
                    (0..=chain_len, 0..rel_count, 0..entity_count),
                    0..=2,
                ),
            )
        },
    )
    .prop_map(
        |(entity_count, rel_count, edges, topic_idx, chain, constraints)| QueryCase {
            entity_count,
            rel_count,
            edges,
            topic_idx,
            chain,
            constraints,
        },
    )
}

fn build_graph(case: &QueryCase) -> GraphStore {
    let mut graph = GraphStore::new();
    for (src, rel, dst) in &case.edges {
        graph.add_triple(&format!("n{src}"), &format!("r{rel}"), &format!("n{dst}"));
    }
    graph
}

/// Entity ID for index `i`; entities absent from the graph get IDs no
/// stored triple can reference.
fn entity(graph: &GraphStore, i: usize) -> EntityId {
    graph
        .entity_id(&format!("n{i}"))
        .unwrap_or(u32::MAX - i as u32)
}

fn relation(graph: &GraphStore, i: usize) -> RelationId {
    graph
        .relation_id(&format!("r{i}"))
        .unwrap_or(RelationId::new(u32::MAX - i as u32))
}

fn build_query(graph: &GraphStore, case: &QueryCase) -> Query {
    let chain = case.chain.iter().map(|&r| relation(graph, r)).collect();
    let mut query = Query::new(entity(graph, case.topic_idx), chain);
    for &(hop, rel, value) in &case.constraints {
        query = query.with_constraint(hop, relation(graph, rel), entity(graph, value));
    }
    query
}

fn answer_naive(case: &QueryCase) -> Vec<usize> {
    let edges: HashSet<(usize, usize, usize)> = case.edges.iter().copied().collect();
    let passes = |hop: usize, e: usize| {
        case.constraints
            .iter()
            .filter(|(h, _, _)| *h == hop)
            .all(|&(_, rel, value)| edges.contains(&(e, rel, value)))
    };

    let mut current: HashSet<usize> = HashSet::new();
    if passes(0, case.topic_idx) {
        current.insert(case.topic_idx);
    }
    for (i, rel) in case.chain.iter().enumerate() {
        let next: HashSet<usize> = edges
            .iter()
            .filter(|(src, r, _)| r == rel && current.contains(src))
            .map(|&(_, _, dst)| dst)
            .collect();
        current = next.into_iter().filter(|&e| passes(i + 1, e)).collect();
    }
    current.remove(&case.topic_idx);

    let mut out: Vec<usize> = current.into_iter().collect();
    out.sort();
    out
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 192,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn answer_matches_naive(case in query_case_strategy()) {
        let graph = build_graph(&case);
        let query = build_query(&graph, &case);

        let mut actual: Vec<EntityId> = answer(&graph, &query).iter().collect();
        actual.sort();
        let mut expected: Vec<EntityId> =
            answer_naive(&case).into_iter().map(|i| entity(&graph, i)).collect();
        expected.sort();

        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn insertion_is_idempotent(case in query_case_strategy()) {
        let graph = build_graph(&case);
        let mut doubled = graph.clone();
        for (src, rel, dst) in &case.edges {
            doubled.add_triple(&format!("n{src}"), &format!("r{rel}"), &format!("n{dst}"));
        }

        prop_assert_eq!(doubled.number_of_triples(), graph.number_of_triples());
        prop_assert_eq!(doubled.number_of_entities(), graph.number_of_entities());
        for i in 0..case.entity_count {
            prop_assert_eq!(doubled.entity_id(&format!("n{i}")).ok(), graph.entity_id(&format!("n{i}")).ok());
        }
        for i in 0..case.rel_count {
            prop_assert_eq!(doubled.relation_id(&format!("r{i}")).ok(), graph.relation_id(&format!("r{i}")).ok());
        }
    }

    #[test]
    fn generated_queries_replay(case in query_case_strategy(), seed in any::<u64>(), hop in 0usize..=3) {
        let graph = build_graph(&case);
        let Ok(topic) = graph.entity_id(&format!("n{}", case.topic_idx)) else {
            return Ok(());
        };

        let mut options = GenerateOptions::chain(3);
        options.constraint_hop = (hop > 0).then_some(hop);
        let mut rng = StdRng::seed_from_u64(seed);
        let query = generate(&graph, topic, &options, &mut rng);

        prop_assert!(query.chain.len() <= 3);
        prop_assert!(query.constraints.iter().all(|c: &Constraint| c.hop >= 1 && c.hop <= query.chain.len()));
        let recorded = query.answers.clone();
        prop_assert_eq!(Some(answer(&graph, &query)), recorded);
    }

    #[test]
    fn summary_answers_are_subset_of_full(case in query_case_strategy(), k in 0usize..=20, seed in any::<u64>()) {
        let graph = build_graph(&case);
        let query = build_query(&graph, &case);
        let topics: Vec<EntityId> = graph.entity_id(&format!("n{}", case.topic_idx)).into_iter().collect();
        let x0 = RandomWalkValueModel::seed_vector(&graph, topics).unwrap();
        let values = RandomWalkValueModel::default().annotate_seed(&graph, &x0).unwrap();

        let mut rng = StdRng::seed_from_u64(seed);
        let summary = LazyGreedySelector::default().select(&graph, &values, k, &mut rng);

        prop_assert!(summary.triples().iter().all(|t| graph.has_triple(t)));
        let full = answer(&graph, &query);
        let partial = answer(&summary, &query);
        prop_assert!(partial.is_subset(&full));
    }
}
