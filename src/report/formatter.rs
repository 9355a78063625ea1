//! Projection of a breakdown matrix into display text.
//!
//! The matrix is keyed by stable identifiers; the questions passed here carry
//! the text to show, usually in the reader's locale. Identifiers without text
//! are shown as-is.

use crate::analysis::{AnswerTally, BreakdownMatrix};
use crate::models::{AnswerId, Question, QuestionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Results for one target question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStats {
    pub question: String,
    /// Sum of the answers' totals.
    pub total_count: u64,
    pub answers: Vec<AnswerStats>,
}

/// Results for one target answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerStats {
    pub answer: String,
    pub total_count: u64,
    pub breakdowns: Vec<Breakdown>,
}

/// A target answer's responses split by one dimension question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub by: String,
    pub answers: Vec<BreakdownAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownAnswer {
    pub answer: String,
    pub count: u64,
}

/// Display text and ordering taken from the supplied question definitions.
struct TextLookup<'a> {
    questions: HashMap<&'a QuestionId, (usize, &'a str)>,
    answers: HashMap<&'a AnswerId, (usize, &'a str)>,
}

impl<'a> TextLookup<'a> {
    fn new(questions: &'a [Question]) -> Self {
        let mut lookup = Self {
            questions: HashMap::new(),
            answers: HashMap::new(),
        };

        for (qi, question) in questions.iter().enumerate() {
            lookup
                .questions
                .entry(&question.id)
                .or_insert((qi, question.text.as_str()));
            for (ai, answer) in question.answers.iter().enumerate() {
                lookup
                    .answers
                    .entry(&answer.id)
                    .or_insert((ai, answer.text.as_str()));
            }
        }

        lookup
    }

    fn question_text(&self, id: &QuestionId) -> String {
        text_or_id(self.questions.get(id).map(|(_, text)| *text), id.as_str())
    }

    fn answer_text(&self, id: &AnswerId) -> String {
        text_or_id(self.answers.get(id).map(|(_, text)| *text), id.as_str())
    }

    fn question_rank(&self, id: &QuestionId) -> usize {
        self.questions.get(id).map_or(usize::MAX, |(pos, _)| *pos)
    }

    fn answer_rank(&self, id: &AnswerId) -> usize {
        self.answers.get(id).map_or(usize::MAX, |(pos, _)| *pos)
    }
}

/// Orders map entries by definition order; unknown keys keep key order at the end.
fn ordered<K, V>(map: &BTreeMap<K, V>, rank: impl Fn(&K) -> usize) -> Vec<(&K, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by_key(|(key, _)| rank(*key));
    entries
}

fn text_or_id(text: Option<&str>, id: &str) -> String {
    match text {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => id.to_string(),
    }
}

/// Renders `matrix` with the text of `questions`.
///
/// Output follows the order of `questions` and their answers. The
/// per-question total is recomputed from the answer totals.
pub fn format_stats(matrix: &BreakdownMatrix, questions: &[Question]) -> Vec<QuestionStats> {
    let lookup = TextLookup::new(questions);

    let mut targets: Vec<_> = matrix.iter().collect();
    targets.sort_by_key(|(id, _)| lookup.question_rank(id));

    targets
        .into_iter()
        .map(|(target_id, answers)| {
            let answers: Vec<AnswerStats> = ordered(answers, |id| lookup.answer_rank(id))
                .into_iter()
                .map(|(answer_id, tally)| format_answer(&lookup, answer_id, tally))
                .collect();

            QuestionStats {
                question: lookup.question_text(target_id),
                total_count: answers.iter().map(|a| a.total_count).sum(),
                answers,
            }
        })
        .collect()
}

fn format_answer(
    lookup: &TextLookup<'_>,
    answer_id: &AnswerId,
    tally: &AnswerTally,
) -> AnswerStats {
    let breakdowns = ordered(&tally.dimensions, |id| lookup.question_rank(id))
        .into_iter()
        .map(|(dimension_id, counts)| Breakdown {
            by: lookup.question_text(dimension_id),
            answers: ordered(counts, |id| lookup.answer_rank(id))
                .into_iter()
                .map(|(dim_answer_id, count)| BreakdownAnswer {
                    answer: lookup.answer_text(dim_answer_id),
                    count: *count,
                })
                .collect(),
        })
        .collect();

    AnswerStats {
        answer: lookup.answer_text(answer_id),
        total_count: tally.total_count,
        breakdowns,
    }
}
