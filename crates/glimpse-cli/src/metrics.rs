//! Answer-set agreement between a summary and its reference.

use crate::workload::LoggedQuery;
use glimpse_core::{answer, GraphView, Query};
use roaring::RoaringBitmap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl Counts {
    /// Compare `predicted` against `expected`.
    pub fn compare(predicted: &RoaringBitmap, expected: &RoaringBitmap) -> Self {
        let tp = predicted.intersection_len(expected);
        Self {
            tp,
            fp: predicted.len() - tp,
            fn_: expected.len() - tp,
        }
    }

    pub fn scores(&self) -> Scores {
        Scores {
            f1: f1(self.tp, self.fp, self.fn_),
            precision: precision(self.tp, self.fp),
            recall: recall(self.tp, self.fn_),
        }
    }
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.tp += rhs.tp;
        self.fp += rhs.fp;
        self.fn_ += rhs.fn_;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
}

pub fn precision(tp: u64, fp: u64) -> f64 {
    if tp + fp == 0 {
        return 0.0;
    }
    tp as f64 / (tp + fp) as f64
}

pub fn recall(tp: u64, fn_: u64) -> f64 {
    if tp + fn_ == 0 {
        return 0.0;
    }
    tp as f64 / (tp + fn_) as f64
}

/// Harmonic mean of precision and recall; 0 when either is 0.
pub fn f1(tp: u64, fp: u64, fn_: u64) -> f64 {
    let p = precision(tp, fp);
    let r = recall(tp, fn_);
    if p == 0.0 || r == 0.0 {
        return 0.0;
    }
    2.0 * p * r / (p + r)
}

/// Scores of `summary`'s answer to `query` against the gold answers.
/// A query without gold answers has an empty gold set. Gold answers outside
/// the graph are false negatives.
pub fn query_metrics<G: GraphView + ?Sized>(summary: &G, query: &Query) -> Scores {
    let gold = query.answers.clone().unwrap_or_default();
    let mut counts = Counts::compare(&answer(summary, query), &gold);
    counts.fn_ += query.unresolved_answers as u64;
    counts.scores()
}

/// Micro-averaged agreement between `summary` and `parent` over `log`.
pub fn total_query_log_metrics<S, P>(summary: &S, parent: &P, log: &[LoggedQuery]) -> Scores
where
    S: GraphView + ?Sized,
    P: GraphView + ?Sized,
{
    let mut counts = Counts::default();
    for entry in log {
        let expected = answer(parent, &entry.query);
        counts += Counts::compare(&answer(summary, &entry.query), &expected);
    }
    counts.scores()
}

/// Macro-averaged [`query_metrics`] over `log`. An empty log scores 0.
pub fn average_query_log_metrics<G: GraphView + ?Sized>(summary: &G, log: &[LoggedQuery]) -> Scores {
    if log.is_empty() {
        return Scores::default();
    }
    let mut total = Scores::default();
    for entry in log {
        let scores = query_metrics(summary, &entry.query);
        total.f1 += scores.f1;
        total.precision += scores.precision;
        total.recall += scores.recall;
    }
    let n = log.len() as f64;
    Scores {
        f1: total.f1 / n,
        precision: total.precision / n,
        recall: total.recall / n,
    }
}
