//! Incremental response aggregation.
//!
//! This module folds batches of responses into a [`BreakdownMatrix`]. Counts
//! only ever grow, and a batch can be merged on top of a persisted matrix so
//! historical responses never need to be rescanned.

use super::matrix::BreakdownMatrix;
use crate::models::{AnswerId, Question, QuestionId, QuestionRole, Response};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// What to do with chosen answers that belong to no known question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Ignore unknown answers and count whatever matches.
    #[default]
    Lenient,
    /// Reject the whole batch if any response carries an unknown answer.
    Strict,
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::Lenient => write!(f, "lenient"),
            MatchPolicy::Strict => write!(f, "strict"),
        }
    }
}

/// Errors raised while merging a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("response {response} references answer '{answer}' outside the survey")]
    UnknownAnswer { response: String, answer: AnswerId },
}

/// Counters describing one merge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Responses folded in.
    pub responses: usize,
    /// Chosen answers that matched no target or dimension question.
    pub unmatched_answers: usize,
    /// (response, target) pairs skipped because the target went unanswered.
    pub skipped_targets: usize,
    /// Matches whose cell was absent from the matrix.
    pub missing_keys: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    role: QuestionRole,
    question: &'a QuestionId,
    position: usize,
}

/// Reverse lookup from answer to owning question, built once per merge.
struct AnswerIndex<'a> {
    slots: HashMap<&'a AnswerId, Slot<'a>>,
}

impl<'a> AnswerIndex<'a> {
    fn new(dimensions: &'a [Question], targets: &'a [Question]) -> Self {
        let mut slots = HashMap::new();

        for (role, questions) in [
            (QuestionRole::Dimension, dimensions),
            (QuestionRole::Target, targets),
        ] {
            for question in questions {
                for (position, answer) in question.answers.iter().enumerate() {
                    slots.entry(&answer.id).or_insert(Slot {
                        role,
                        question: &question.id,
                        position,
                    });
                }
            }
        }

        Self { slots }
    }

    fn first_unknown<'r>(&self, response: &'r Response) -> Option<&'r AnswerId> {
        response
            .content
            .iter()
            .find(|answer| !self.slots.contains_key(answer))
    }

    /// Resolves a response to at most one answer per question.
    ///
    /// If a response carries several answers for the same question, the one
    /// listed first by the question wins.
    fn resolve<'r>(&self, response: &'r Response) -> Resolved<'a, 'r> {
        let mut resolved = Resolved::default();

        for answer in &response.content {
            let Some(slot) = self.slots.get(answer) else {
                resolved.unmatched += 1;
                continue;
            };
            let chosen = match slot.role {
                QuestionRole::Dimension => &mut resolved.dimensions,
                QuestionRole::Target => &mut resolved.targets,
            };
            let earlier = matches!(
                chosen.get(slot.question),
                Some((_, position)) if *position <= slot.position
            );
            if !earlier {
                chosen.insert(slot.question, (answer, slot.position));
            }
        }

        resolved
    }
}

#[derive(Default)]
struct Resolved<'a, 'r> {
    dimensions: HashMap<&'a QuestionId, (&'r AnswerId, usize)>,
    targets: HashMap<&'a QuestionId, (&'r AnswerId, usize)>,
    unmatched: usize,
}

/// Merges `responses` into `matrix`, incrementing existing cells only.
///
/// Each target a response answers gets its total bumped, plus one nested
/// count per dimension the response also answers. Targets left unanswered
/// are skipped for that response without affecting the others.
pub fn merge<R: Borrow<Response>>(
    responses: &[R],
    matrix: &mut BreakdownMatrix,
    dimensions: &[Question],
    targets: &[Question],
    policy: MatchPolicy,
) -> Result<MergeStats, MergeError> {
    let index = AnswerIndex::new(dimensions, targets);

    if policy == MatchPolicy::Strict {
        for (i, response) in responses.iter().enumerate() {
            let response: &Response = response.borrow();
            if let Some(answer) = index.first_unknown(response) {
                return Err(MergeError::UnknownAnswer {
                    response: response.id.clone().unwrap_or_else(|| format!("#{}", i)),
                    answer: answer.clone(),
                });
            }
        }
    }

    let mut stats = MergeStats::default();

    for response in responses {
        let resolved = index.resolve(response.borrow());
        stats.responses += 1;
        stats.unmatched_answers += resolved.unmatched;

        for target in targets {
            let Some((answer, _)) = resolved.targets.get(&target.id) else {
                stats.skipped_targets += 1;
                continue;
            };

            let Some(tally) = matrix.tally_mut(&target.id, answer) else {
                stats.missing_keys += 1;
                continue;
            };
            tally.total_count += 1;

            for (dimension, (dim_answer, _)) in &resolved.dimensions {
                match tally
                    .dimensions
                    .get_mut(*dimension)
                    .and_then(|counts| counts.get_mut(*dim_answer))
                {
                    Some(count) => *count += 1,
                    None => stats.missing_keys += 1,
                }
            }
        }
    }

    if stats.missing_keys > 0 {
        warn!(
            "{} matched cells were absent from the matrix; was it built for another survey shape?",
            stats.missing_keys
        );
    }
    debug!(
        "Merged {} responses ({} unmatched answers, {} skipped targets)",
        stats.responses, stats.unmatched_answers, stats.skipped_targets
    );

    Ok(stats)
}

/// Merges into `matrix`, building a fresh one first when none is supplied.
pub fn merge_into<R: Borrow<Response>>(
    responses: &[R],
    matrix: Option<BreakdownMatrix>,
    dimensions: &[Question],
    targets: &[Question],
    policy: MatchPolicy,
) -> Result<(BreakdownMatrix, MergeStats), MergeError> {
    let mut matrix = matrix.unwrap_or_else(|| BreakdownMatrix::build(targets, dimensions));
    let stats = merge(responses, &mut matrix, dimensions, targets, policy)?;
    Ok((matrix, stats))
}
