//! Ingestion boundary for Glimpse.
//!
//! - `source`: line-oriented triple dumps (tab-separated or N-Triples-like,
//!   plain or gzip) streamed into a [`glimpse_core::GraphStore`]
//! - `webqsp`: question records in the WebQSP semantic-parse JSON layout,
//!   their conversion to and from resolved [`glimpse_core::Query`] values, and
//!   the `by-mid`/`by-topic` question lists beside them

pub mod error;
pub mod source;
pub mod webqsp;

pub use error::{IngestError, Result};
pub use source::{
    load_into, open_triples, LabelCleanup, LoadStats, NTriplesLike, RawTriple, TripleFormat,
    TripleSource, TsvTriples,
};
pub use webqsp::{
    is_synthetic, is_webqsp, list_topics, load_entity_names, load_qids, load_question,
    load_questions_from_dir, load_questions_from_list, load_topic_questions, save_question,
    write_mid_lists, write_topic_list, AnswerRecord, AnswerType, ConstraintRecord, EntityNaming,
    EntityScheme, ParseRecord, QuestionRecord,
};
