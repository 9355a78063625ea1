//! Breakdown matrix construction.
//!
//! The matrix is keyed by target question, then target answer. Each cell
//! holds the answer's total plus a nested count for every dimension answer.
//! Shape is decided here alone; the aggregator only increments existing cells.

use crate::models::{AnswerId, Question, QuestionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts per dimension question, then per dimension answer.
pub type DimensionCounts = BTreeMap<QuestionId, BTreeMap<AnswerId, u64>>;

/// Counters for one target answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerTally {
    /// Responses that chose this answer.
    pub total_count: u64,
    /// Breakdown of those responses by dimension answer.
    #[serde(default)]
    pub dimensions: DimensionCounts,
}

impl AnswerTally {
    fn zeroed(dimensions: &[Question]) -> Self {
        Self {
            total_count: 0,
            dimensions: dimensions
                .iter()
                .map(|d| (d.id.clone(), zeroed_answers(d)))
                .collect(),
        }
    }

    /// Returns the count for one dimension answer.
    pub fn dimension_count(&self, dimension: &QuestionId, answer: &AnswerId) -> Option<u64> {
        self.dimensions.get(dimension)?.get(answer).copied()
    }
}

fn zeroed_answers(question: &Question) -> BTreeMap<AnswerId, u64> {
    question.answers.iter().map(|a| (a.id.clone(), 0)).collect()
}

/// Full cross-tabulation of target answers by dimension answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakdownMatrix {
    targets: BTreeMap<QuestionId, BTreeMap<AnswerId, AnswerTally>>,
}

/// One counter of the matrix, as yielded by [`BreakdownMatrix::counters`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CounterKey {
    Total(QuestionId, AnswerId),
    Nested(QuestionId, AnswerId, QuestionId, AnswerId),
}

impl BreakdownMatrix {
    /// Builds a zero-filled matrix covering every
    /// (target, target answer, dimension, dimension answer) combination.
    pub fn build(targets: &[Question], dimensions: &[Question]) -> Self {
        let targets = targets
            .iter()
            .map(|t| {
                let answers = t
                    .answers
                    .iter()
                    .map(|a| (a.id.clone(), AnswerTally::zeroed(dimensions)))
                    .collect();
                (t.id.clone(), answers)
            })
            .collect();

        Self { targets }
    }

    /// Adds zeroed cells for structure missing from a previously persisted matrix.
    ///
    /// Existing cells and counts are left untouched. Returns the number of
    /// counters added.
    pub fn reconcile(&mut self, targets: &[Question], dimensions: &[Question]) -> usize {
        let mut added = 0;

        for target in targets {
            let answers = self.targets.entry(target.id.clone()).or_default();
            for answer in &target.answers {
                let tally = answers.entry(answer.id.clone()).or_insert_with(|| {
                    added += 1;
                    AnswerTally::default()
                });
                for dimension in dimensions {
                    let counts = tally.dimensions.entry(dimension.id.clone()).or_default();
                    for dim_answer in &dimension.answers {
                        counts.entry(dim_answer.id.clone()).or_insert_with(|| {
                            added += 1;
                            0
                        });
                    }
                }
            }
        }

        added
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Iterates target questions in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &BTreeMap<AnswerId, AnswerTally>)> {
        self.targets.iter()
    }

    /// Answers recorded for one target question.
    pub fn answers(&self, target: &QuestionId) -> Option<&BTreeMap<AnswerId, AnswerTally>> {
        self.targets.get(target)
    }

    pub fn tally(&self, target: &QuestionId, answer: &AnswerId) -> Option<&AnswerTally> {
        self.targets.get(target)?.get(answer)
    }

    pub(crate) fn tally_mut(
        &mut self,
        target: &QuestionId,
        answer: &AnswerId,
    ) -> Option<&mut AnswerTally> {
        self.targets.get_mut(target)?.get_mut(answer)
    }

    /// Nested count for a (target, answer, dimension, dimension answer) cell.
    pub fn count(
        &self,
        target: &QuestionId,
        answer: &AnswerId,
        dimension: &QuestionId,
        dimension_answer: &AnswerId,
    ) -> Option<u64> {
        self.tally(target, answer)?
            .dimension_count(dimension, dimension_answer)
    }

    /// Sum of answer totals for one target question.
    pub fn question_total(&self, target: &QuestionId) -> u64 {
        self.targets
            .get(target)
            .map(|answers| answers.values().map(|t| t.total_count).sum())
            .unwrap_or(0)
    }

    /// Flattens every counter, totals and nested cells alike.
    pub fn counters(&self) -> impl Iterator<Item = (CounterKey, u64)> + '_ {
        self.targets.iter().flat_map(|(target, answers)| {
            answers.iter().flat_map(move |(answer, tally)| {
                let total = std::iter::once((
                    CounterKey::Total(target.clone(), answer.clone()),
                    tally.total_count,
                ));
                let nested = tally.dimensions.iter().flat_map(move |(dim, counts)| {
                    counts.iter().map(move |(dim_answer, count)| {
                        (
                            CounterKey::Nested(
                                target.clone(),
                                answer.clone(),
                                dim.clone(),
                                dim_answer.clone(),
                            ),
                            *count,
                        )
                    })
                });
                total.chain(nested)
            })
        })
    }
}
