//! Random survey shapes and response batches for property tests.

use crate::models::{Answer, Question, Response};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

/// Questions a response can answer: up to 3 targets plus up to 3 dimensions.
const MAX_QUESTIONS: usize = 6;

/// Answer id no generated survey owns.
pub(crate) const RETIRED_ANSWER: &str = "retired";

/// Targets and dimensions of a generated survey.
#[derive(Debug, Clone)]
pub(crate) struct Shape {
    pub targets: Vec<Question>,
    pub dimensions: Vec<Question>,
}

impl Shape {
    pub fn questions(&self) -> Vec<Question> {
        self.targets.iter().chain(&self.dimensions).cloned().collect()
    }
}

fn questions(prefix: &str, sizes: &[usize], dimension: bool) -> Vec<Question> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let id = format!("{}{}", prefix, i);
            let answers = (0..size)
                .map(|j| Answer::new(format!("{}a{}", id, j), format!("{} answer {}", id, j)))
                .collect();
            if dimension {
                Question::dimension(id, format!("Dimension {}", i), answers)
            } else {
                Question::target(id, format!("Target {}", i), answers)
            }
        })
        .collect()
}

pub(crate) fn arb_shape() -> impl Strategy<Value = Shape> {
    (
        prop::collection::vec(1usize..=4, 1..=3),
        prop::collection::vec(1usize..=3, 0..=3),
    )
        .prop_map(|(targets, dimensions)| Shape {
            targets: questions("T", &targets, false),
            dimensions: questions("D", &dimensions, true),
        })
}

/// One answer per question picked by `picks`; a pick divisible by 4 skips it.
fn respond(shape: &Shape, secs: i64, picks: &[u8], retired: bool) -> Response {
    let mut answers: Vec<String> = shape
        .targets
        .iter()
        .chain(&shape.dimensions)
        .zip(picks)
        .filter(|(_, pick)| **pick % 4 != 0)
        .map(|(question, pick)| {
            let answer = &question.answers[usize::from(*pick) % question.answers.len()];
            answer.id.as_str().to_string()
        })
        .collect();
    if retired {
        answers.push(RETIRED_ANSWER.to_string());
    }
    Response::new("s1", Utc.timestamp_opt(secs, 0).unwrap(), answers)
}

/// A survey shape with a batch of responses, some partial and some carrying
/// an answer the survey does not own.
pub(crate) fn arb_case() -> impl Strategy<Value = (Shape, Vec<Response>)> {
    let raw = prop::collection::vec(
        (
            prop::collection::vec(any::<u8>(), MAX_QUESTIONS),
            prop::bool::weighted(0.2),
        ),
        0..40,
    );

    (arb_shape(), raw).prop_map(|(shape, raw)| {
        let responses = raw
            .iter()
            .enumerate()
            .map(|(i, (picks, retired))| respond(&shape, i as i64, picks, *retired))
            .collect();
        (shape, responses)
    })
}
