//! Line-oriented triple dumps.
//!
//! Sources yield labelled [`RawTriple`]s one at a time so that multi-gigabyte
//! dumps stream straight into a [`GraphStore`] without an intermediate copy.

use crate::error::{IngestError, Result};
use flate2::read::MultiGzDecoder;
use glimpse_core::{GraphStore, GraphView};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// One labelled triple as read from a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTriple {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

/// A stream of labelled triples.
pub trait TripleSource {
    /// Next well-formed triple, an error for a malformed row, or `None` at
    /// end of input. Rows that are well-formed but unusable (empty subject
    /// or object) are skipped silently and counted in [`Self::skipped`].
    fn next_triple(&mut self) -> Option<Result<RawTriple>>;

    /// Rows dropped so far without producing a triple.
    fn skipped(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleFormat {
    /// `subject \t relation \t object [\t ...] \t meta`
    #[default]
    Tsv,
    /// `subject relation object .`
    NTriples,
}

/// Label normalization applied to subjects, relations, and objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCleanup {
    #[default]
    None,
    /// Drop every character that is neither a word character nor whitespace.
    Punctuation,
    /// Unwrap Freebase-style `<f_...>` labels.
    FreebasePrefix,
}

impl LabelCleanup {
    pub fn apply(self, label: &str) -> String {
        match self {
            LabelCleanup::None => label.to_string(),
            LabelCleanup::Punctuation => label
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
                .collect(),
            LabelCleanup::FreebasePrefix => label
                .strip_prefix("<f_")
                .and_then(|rest| rest.strip_suffix('>'))
                .unwrap_or(label)
                .to_string(),
        }
    }
}

// ============================================================================
// Tab-separated dumps
// ============================================================================

/// Tab-separated rows whose last column is metadata and is dropped.
///
/// Columns after the relation are joined with single spaces into the object,
/// so literal values containing tabs survive.
pub struct TsvTriples<R> {
    lines: Lines<R>,
    line: usize,
    cleanup: LabelCleanup,
    skipped: usize,
}

impl<R: BufRead> TsvTriples<R> {
    pub fn new(reader: R, cleanup: LabelCleanup) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            cleanup,
            skipped: 0,
        }
    }

    fn parse(&self, row: &str) -> Result<Option<RawTriple>> {
        let mut columns: Vec<&str> = row.split('\t').collect();
        columns.pop();
        if columns.len() < 2 {
            return Err(IngestError::Malformed {
                line: self.line,
                reason: format!(
                    "expected at least 3 tab-separated columns, got {}",
                    columns.len() + 1
                ),
            });
        }

        let subject = self.cleanup.apply(columns[0]);
        let relation = self.cleanup.apply(columns[1]);
        let object = self.cleanup.apply(&columns[2..].join(" "));
        if subject.is_empty() || object.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawTriple {
            subject,
            relation,
            object,
        }))
    }
}

impl<R: BufRead> TripleSource for TsvTriples<R> {
    fn next_triple(&mut self) -> Option<Result<RawTriple>> {
        loop {
            let row = match self.lines.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            let row = row.trim_end_matches(['\r', '\n']);
            if row.is_empty() {
                continue;
            }
            match self.parse(row) {
                Ok(Some(triple)) => return Some(Ok(triple)),
                Ok(None) => {
                    self.skipped += 1;
                    tracing::debug!(line = self.line, "skipping row with empty subject or object");
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn skipped(&self) -> usize {
        self.skipped
    }
}

// ============================================================================
// N-Triples-like dumps
// ============================================================================

/// Space-separated `subject relation object .` rows.
///
/// No IRI or literal parsing: the object is everything after the relation,
/// minus the trailing `.` terminator. Blank lines and `#` comments are
/// ignored.
pub struct NTriplesLike<R> {
    lines: Lines<R>,
    line: usize,
    skipped: usize,
}

impl<R: BufRead> NTriplesLike<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            skipped: 0,
        }
    }

    fn parse(&self, row: &str) -> Result<Option<RawTriple>> {
        let body = row.strip_suffix('.').unwrap_or(row).trim_end();
        let mut parts = body.splitn(3, ' ');
        let (Some(subject), Some(relation)) = (parts.next(), parts.next()) else {
            return Err(IngestError::Malformed {
                line: self.line,
                reason: "expected `subject relation object .`".to_string(),
            });
        };
        let object = parts.next().unwrap_or("");
        if subject.is_empty() || object.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawTriple {
            subject: subject.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
        }))
    }
}

impl<R: BufRead> TripleSource for NTriplesLike<R> {
    fn next_triple(&mut self) -> Option<Result<RawTriple>> {
        loop {
            let row = match self.lines.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            let row = row.trim();
            if row.is_empty() || row.starts_with('#') {
                continue;
            }
            match self.parse(row) {
                Ok(Some(triple)) => return Some(Ok(triple)),
                Ok(None) => {
                    self.skipped += 1;
                    tracing::debug!(line = self.line, "skipping row with empty subject or object");
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn skipped(&self) -> usize {
        self.skipped
    }
}

// ============================================================================
// Files and loading
// ============================================================================

/// Open a dump, transparently decompressing `.gz` files.
pub fn open_triples(
    path: &Path,
    format: TripleFormat,
    cleanup: LabelCleanup,
) -> Result<Box<dyn TripleSource>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(match format {
        TripleFormat::Tsv => Box::new(TsvTriples::new(reader, cleanup)),
        TripleFormat::NTriples => Box::new(NTriplesLike::new(reader)),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Triples read from the source, duplicates included.
    pub read: usize,
    /// Triples that were new to the graph.
    pub added: usize,
    /// Rows the source dropped.
    pub skipped: usize,
}

/// Stream `source` into `graph`, stopping once the graph holds `head`
/// triples.
pub fn load_into<S>(
    graph: &mut GraphStore,
    source: &mut S,
    head: Option<usize>,
) -> Result<LoadStats>
where
    S: TripleSource + ?Sized,
{
    let mut stats = LoadStats::default();
    let reached =
        |graph: &GraphStore| head.map(|h| graph.number_of_triples() >= h).unwrap_or(false);

    while !reached(graph) {
        let Some(next) = source.next_triple() else {
            break;
        };
        let triple = next?;
        let before = graph.number_of_triples();
        graph.add_triple(&triple.subject, &triple.relation, &triple.object);
        stats.read += 1;
        if graph.number_of_triples() > before {
            stats.added += 1;
        }
    }
    stats.skipped = source.skipped();

    tracing::info!(
        read = stats.read,
        added = stats.added,
        skipped = stats.skipped,
        entities = graph.number_of_entities(),
        relations = graph.number_of_relations(),
        "loaded triples"
    );
    Ok(stats)
}
