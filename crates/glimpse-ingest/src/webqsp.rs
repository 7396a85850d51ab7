//! Question records in the WebQSP semantic-parse layout.
//!
//! ```json
//! {
//!   "QuestionId": "WebQTest-12",
//!   "Parse": {
//!     "TopicEntityMid": "m.0abc",
//!     "TopicEntityName": "Alice",
//!     "InferentialChain": ["friend", "friend"],
//!     "Constraints": [
//!       {"SourceNodeIndex": 0, "NodePredicate": "age", "Argument": "30", "EntityName": null}
//!     ],
//!     "Answers": [
//!       {"AnswerType": "Entity", "AnswerArgument": "m.0xyz", "EntityName": "Carol"}
//!     ]
//!   }
//! }
//! ```
//!
//! `SourceNodeIndex` counts chain positions from 0: a constraint at index `i`
//! filters the entities reached after following `InferentialChain[i]`.

use crate::error::{IngestError, Result};
use crate::source::{LabelCleanup, TripleFormat};
use glimpse_core::{GlimpseError, GraphStore, Query};
use roaring::RoaringBitmap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use walkdir::WalkDir;

const SYNTHETIC_PREFIX: &str = "Synth";
const WEBQSP_PREFIX: &str = "WebQ";
const MID_LIST_DIR: &str = "by-mid";
const TOPIC_LIST_DIR: &str = "by-topic";
const LIST_EXTENSION: &str = "list";

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuestionRecord {
    pub question_id: String,
    pub parse: ParseRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParseRecord {
    pub topic_entity_mid: String,
    #[serde(default)]
    pub topic_entity_name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub inferential_chain: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub constraints: Vec<ConstraintRecord>,
    #[serde(deserialize_with = "null_as_default")]
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConstraintRecord {
    pub source_node_index: usize,
    pub node_predicate: String,
    pub argument: String,
    #[serde(default)]
    pub entity_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerType {
    Entity,
    Value,
}

/// How a corpus tells entity labels apart from literal values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntityScheme {
    /// Freebase MIDs: `m.` or `g.` identifiers, bare or as `<f_m.…>`.
    Freebase,
    /// Entities are IRIs in angle brackets.
    Bracketed,
    /// Every label names an entity (entity-only dumps).
    AllEntities,
    /// Numbers and quoted literals are values.
    #[default]
    Literals,
}

impl EntityScheme {
    /// The scheme matching a dump read with `format` and `cleanup`.
    pub fn for_source(format: TripleFormat, cleanup: LabelCleanup) -> Self {
        match (format, cleanup) {
            (_, LabelCleanup::FreebasePrefix) => EntityScheme::Freebase,
            (_, LabelCleanup::Punctuation) => EntityScheme::AllEntities,
            (TripleFormat::NTriples, LabelCleanup::None) => EntityScheme::Bracketed,
            (TripleFormat::Tsv, LabelCleanup::None) => EntityScheme::Literals,
        }
    }

    pub fn is_entity(self, label: &str) -> bool {
        match self {
            EntityScheme::Freebase => ["m.", "g.", "<f_m.", "<f_g."]
                .iter()
                .any(|prefix| label.starts_with(prefix)),
            EntityScheme::Bracketed => label.starts_with('<') && label.ends_with('>'),
            EntityScheme::AllEntities => true,
            EntityScheme::Literals => !(label.starts_with('"') || label.parse::<f64>().is_ok()),
        }
    }

    pub fn classify(self, label: &str) -> AnswerType {
        if self.is_entity(label) {
            AnswerType::Entity
        } else {
            AnswerType::Value
        }
    }
}

/// Entity scheme plus human-readable names used when rendering records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityNaming {
    pub scheme: EntityScheme,
    pub names: BTreeMap<String, String>,
}

impl EntityNaming {
    pub fn new(scheme: EntityScheme, names: BTreeMap<String, String>) -> Self {
        Self { scheme, names }
    }

    /// The mapped name of `label`, or `label` itself.
    pub fn name_of<'a>(&'a self, label: &'a str) -> &'a str {
        self.names.get(label).map_or(label, String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnswerRecord {
    pub answer_type: AnswerType,
    pub answer_argument: String,
    #[serde(default)]
    pub entity_name: Option<String>,
}

impl QuestionRecord {
    /// Reject records without an ID or topic entity.
    pub fn check(&self) -> std::result::Result<(), String> {
        if self.question_id.is_empty() {
            return Err("empty QuestionId".to_string());
        }
        if self.parse.topic_entity_mid.is_empty() {
            return Err("empty TopicEntityMid".to_string());
        }
        Ok(())
    }

    pub fn topic_label(&self) -> &str {
        &self.parse.topic_entity_mid
    }

    /// Resolve labels against `graph`.
    ///
    /// The topic, every chain relation, and every constraint must exist in
    /// the graph. Answer labels the graph doesn't contain cannot become IDs;
    /// their distinct count is kept in [`Query::unresolved_answers`].
    pub fn resolve(&self, graph: &GraphStore) -> glimpse_core::Result<Query> {
        let parse = &self.parse;
        let topic = graph.entity_id(&parse.topic_entity_mid)?;
        let chain = parse
            .inferential_chain
            .iter()
            .map(|r| graph.relation_id(r))
            .collect::<glimpse_core::Result<Vec<_>>>()?;

        let mut query = Query::new(topic, chain);
        for constraint in &parse.constraints {
            query = query.with_constraint(
                constraint.source_node_index + 1,
                graph.relation_id(&constraint.node_predicate)?,
                graph.entity_id(&constraint.argument)?,
            );
        }

        let mut answers = RoaringBitmap::new();
        let mut unresolved = BTreeSet::new();
        for a in &parse.answers {
            match graph.entity_id(&a.answer_argument) {
                Ok(id) => {
                    answers.insert(id);
                }
                Err(_) => {
                    unresolved.insert(a.answer_argument.as_str());
                }
            }
        }
        if !unresolved.is_empty() {
            tracing::debug!(
                qid = %self.question_id,
                unresolved = unresolved.len(),
                "answers outside the graph"
            );
        }
        Ok(query
            .with_answers(answers)
            .with_unresolved_answers(unresolved.len()))
    }

    /// Render a resolved query (typically a generated one) as a record,
    /// naming entities by their labels.
    pub fn from_query(
        graph: &GraphStore,
        query: &Query,
        question_id: impl Into<String>,
    ) -> glimpse_core::Result<Self> {
        Self::from_query_with(graph, query, question_id, &EntityNaming::default())
    }

    /// Like [`QuestionRecord::from_query`], with `naming` deciding answer
    /// types and `EntityName` fields.
    pub fn from_query_with(
        graph: &GraphStore,
        query: &Query,
        question_id: impl Into<String>,
        naming: &EntityNaming,
    ) -> glimpse_core::Result<Self> {
        let topic = graph.id_to_entity(query.topic)?.to_string();
        let inferential_chain = query
            .chain
            .iter()
            .map(|r| graph.relation_label(*r).map(str::to_string))
            .collect::<glimpse_core::Result<Vec<_>>>()?;

        let mut constraints = Vec::with_capacity(query.constraints.len());
        for constraint in &query.constraints {
            let Some(source_node_index) = constraint.hop.checked_sub(1) else {
                return Err(GlimpseError::InvalidParameter {
                    name: "constraint.hop",
                    reason: "topic constraints have no SourceNodeIndex".to_string(),
                });
            };
            let argument = graph.id_to_entity(constraint.value)?.to_string();
            constraints.push(ConstraintRecord {
                source_node_index,
                node_predicate: graph.relation_label(constraint.relation)?.to_string(),
                entity_name: Some(naming.name_of(&argument).to_string()),
                argument,
            });
        }

        let mut answers = Vec::new();
        for id in query.answers.iter().flatten() {
            let label = graph.id_to_entity(id)?;
            answers.push(AnswerRecord {
                answer_type: naming.scheme.classify(label),
                answer_argument: label.to_string(),
                entity_name: Some(naming.name_of(label).to_string()),
            });
        }

        Ok(Self {
            question_id: question_id.into(),
            parse: ParseRecord {
                topic_entity_name: Some(naming.name_of(&topic).to_string()),
                topic_entity_mid: topic,
                inferential_chain,
                constraints,
                answers,
            },
        })
    }
}

pub fn is_synthetic(record: &QuestionRecord) -> bool {
    record.question_id.starts_with(SYNTHETIC_PREFIX)
}

pub fn is_webqsp(record: &QuestionRecord) -> bool {
    record.question_id.starts_with(WEBQSP_PREFIX)
}

// ============================================================================
// Files
// ============================================================================

pub fn load_question(path: &Path) -> Result<QuestionRecord> {
    let text = fs::read_to_string(path)?;
    let record: QuestionRecord =
        serde_json::from_str(&text).map_err(|source| IngestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    record
        .check()
        .map_err(|reason| IngestError::InvalidQuestion {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(record)
}

pub fn save_question(record: &QuestionRecord, path: &Path) -> Result<()> {
    record
        .check()
        .map_err(|reason| IngestError::InvalidQuestion {
            path: path.to_path_buf(),
            reason,
        })?;
    let text = serde_json::to_string_pretty(record).map_err(|source| IngestError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text)?;
    Ok(())
}

/// Every `*.json` question directly inside `dir`, keyed by QuestionId.
pub fn load_questions_from_dir(dir: &Path) -> Result<BTreeMap<String, QuestionRecord>> {
    let mut questions = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestError::Io(e.into()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let record = load_question(path)?;
        questions.insert(record.question_id.clone(), record);
    }
    tracing::debug!(dir = %dir.display(), questions = questions.len(), "loaded questions");
    Ok(questions)
}

/// Question IDs listed one per line.
pub fn load_qids(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Load `<query_dir>/<qid>.json` for every QuestionId listed in `list_file`.
pub fn load_questions_from_list(
    query_dir: &Path,
    list_file: &Path,
) -> Result<BTreeMap<String, QuestionRecord>> {
    load_qids(list_file)?
        .into_iter()
        .map(|qid| {
            let record = load_question(&query_dir.join(format!("{qid}.json")))?;
            Ok((qid, record))
        })
        .collect()
}

/// Append every QuestionId to `<query_dir>/by-mid/<topic entity>.list`.
pub fn write_mid_lists<'a, I>(query_dir: &Path, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a QuestionRecord>,
{
    let mid_dir = query_dir.join(MID_LIST_DIR);
    fs::create_dir_all(&mid_dir)?;
    for record in records {
        append_qid(&list_path(&mid_dir, record.topic_label()), &record.question_id)?;
    }
    Ok(())
}

/// Append every QuestionId to `<query_dir>/by-topic/<topic>.list`.
pub fn write_topic_list<'a, I>(query_dir: &Path, topic: &str, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a QuestionRecord>,
{
    let topic_dir = query_dir.join(TOPIC_LIST_DIR);
    fs::create_dir_all(&topic_dir)?;
    let path = list_path(&topic_dir, topic);
    for record in records {
        append_qid(&path, &record.question_id)?;
    }
    Ok(())
}

/// Topic names with a list under `<query_dir>/by-topic`, sorted.
pub fn list_topics(query_dir: &Path) -> Result<Vec<String>> {
    let topic_dir = query_dir.join(TOPIC_LIST_DIR);
    let mut topics = Vec::new();
    for entry in WalkDir::new(&topic_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestError::Io(e.into()))?;
        let path = entry.path();
        let is_list = path.extension().map(|e| e == LIST_EXTENSION).unwrap_or(false);
        if !entry.file_type().is_file() || !is_list {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            topics.push(stem.to_string());
        }
    }
    Ok(topics)
}

/// Questions listed in `<query_dir>/by-topic/<topic>.list`.
pub fn load_topic_questions(
    query_dir: &Path,
    topic: &str,
) -> Result<BTreeMap<String, QuestionRecord>> {
    let list = list_path(&query_dir.join(TOPIC_LIST_DIR), topic);
    load_questions_from_list(query_dir, &list)
}

/// `mid<TAB>name` lines after a header line. Lines without a tab are skipped.
pub fn load_entity_names(path: &Path) -> Result<BTreeMap<String, String>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut names = BTreeMap::new();
    for line in reader.lines().skip(1) {
        let line = line?;
        let Some((mid, name)) = line.trim_end().split_once('\t') else {
            continue;
        };
        names.insert(mid.to_string(), name.to_string());
    }
    tracing::debug!(path = %path.display(), names = names.len(), "loaded entity names");
    Ok(names)
}

fn list_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{name}.{LIST_EXTENSION}"))
}

fn append_qid(path: &Path, qid: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{qid}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "QuestionId": "WebQTest-1",
        "Parse": {
            "TopicEntityMid": "A",
            "TopicEntityName": "Alice",
            "InferentialChain": ["friend", "friend"],
            "Constraints": [
                {"SourceNodeIndex": 0, "NodePredicate": "age", "Argument": "30", "EntityName": null}
            ],
            "Answers": [
                {"AnswerType": "Entity", "AnswerArgument": "C", "EntityName": "Carol"},
                {"AnswerType": "Entity", "AnswerArgument": "Z", "EntityName": null}
            ]
        }
    }"#;

    fn friends() -> GraphStore {
        GraphStore::from_triples([
            ("A", "friend", "B"),
            ("B", "friend", "C"),
            ("B", "age", "30"),
        ])
    }

    #[test]
    fn test_resolve_shifts_constraint_index() {
        let graph = friends();
        let record: QuestionRecord = serde_json::from_str(SAMPLE).unwrap();
        let query = record.resolve(&graph).unwrap();

        assert_eq!(query.constraints[0].hop, 1);
        let c = graph.entity_id("C").unwrap();
        // "Z" is not in the graph.
        assert_eq!(query.answers.unwrap().iter().collect::<Vec<_>>(), vec![c]);
        assert_eq!(query.unresolved_answers, 1);
        assert!(is_webqsp(&record));
        assert!(!is_synthetic(&record));
    }

    #[test]
    fn test_resolve_surfaces_unknown_labels() {
        let graph = GraphStore::from_triples([("A", "friend", "B")]);
        let record: QuestionRecord = serde_json::from_str(SAMPLE).unwrap();
        assert!(matches!(
            record.resolve(&graph),
            Err(GlimpseError::UnknownRelation(_))
        ));
    }

    #[test]
    fn test_null_chain_is_empty() {
        let text = r#"{"QuestionId": "q", "Parse": {"TopicEntityMid": "A",
            "InferentialChain": null, "Answers": []}}"#;
        let record: QuestionRecord = serde_json::from_str(text).unwrap();
        assert!(record.parse.inferential_chain.is_empty());
        assert!(record.parse.constraints.is_empty());
    }

    #[test]
    fn test_from_query_round_trips_through_resolve() {
        let graph = friends();
        let record: QuestionRecord = serde_json::from_str(SAMPLE).unwrap();
        let query = record.resolve(&graph).unwrap();

        let rendered = QuestionRecord::from_query(&graph, &query, "Synth-0").unwrap();
        assert!(is_synthetic(&rendered));
        assert_eq!(rendered.parse.constraints[0].source_node_index, 0);

        // Only resolvable answers can be rendered.
        let replayed = rendered.resolve(&graph).unwrap();
        assert_eq!(replayed, query.clone().with_unresolved_answers(0));
    }

    #[test]
    fn test_from_query_with_names_and_scheme() {
        let graph = GraphStore::from_triples([
            ("m.01", "born_in", "m.02"),
            ("m.01", "born_on", "1961"),
        ]);
        let topic = graph.entity_id("m.01").unwrap();
        let born_in = graph.relation_id("born_in").unwrap();
        let born_on = graph.relation_id("born_on").unwrap();
        let names = BTreeMap::from([("m.02".to_string(), "Honolulu".to_string())]);
        let naming = EntityNaming::new(EntityScheme::Freebase, names);

        let place = Query::new(topic, vec![born_in])
            .with_answers([graph.entity_id("m.02").unwrap()].into_iter().collect());
        let record = QuestionRecord::from_query_with(&graph, &place, "Synth-1", &naming).unwrap();
        assert_eq!(record.parse.topic_entity_name.as_deref(), Some("m.01"));
        assert_eq!(record.parse.answers[0].answer_type, AnswerType::Entity);
        assert_eq!(record.parse.answers[0].entity_name.as_deref(), Some("Honolulu"));

        let date = Query::new(topic, vec![born_on])
            .with_answers([graph.entity_id("1961").unwrap()].into_iter().collect());
        let record = QuestionRecord::from_query_with(&graph, &date, "Synth-2", &naming).unwrap();
        assert_eq!(record.parse.answers[0].answer_type, AnswerType::Value);
        assert_eq!(record.parse.answers[0].entity_name.as_deref(), Some("1961"));
    }

    #[test]
    fn test_entity_schemes() {
        assert!(EntityScheme::Freebase.is_entity("g.11b"));
        assert!(EntityScheme::Freebase.is_entity("<f_m.0abc>"));
        assert!(!EntityScheme::Freebase.is_entity("Barack Obama"));
        assert!(EntityScheme::Bracketed.is_entity("<Berlin>"));
        assert!(!EntityScheme::Bracketed.is_entity("\"Berlin\"@en"));
        assert!(EntityScheme::AllEntities.is_entity("1961"));
        assert_eq!(
            EntityScheme::for_source(TripleFormat::Tsv, LabelCleanup::FreebasePrefix),
            EntityScheme::Freebase
        );
        assert_eq!(
            EntityScheme::for_source(TripleFormat::NTriples, LabelCleanup::None),
            EntityScheme::Bracketed
        );
        assert_eq!(
            EntityScheme::for_source(TripleFormat::Tsv, LabelCleanup::Punctuation),
            EntityScheme::AllEntities
        );
    }

    #[test]
    fn test_classify_answers() {
        let scheme = EntityScheme::default();
        assert_eq!(scheme.classify("30"), AnswerType::Value);
        assert_eq!(scheme.classify("\"Alice\""), AnswerType::Value);
        assert_eq!(scheme.classify("m.0abc"), AnswerType::Entity);
    }
}
