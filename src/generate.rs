//! Synthetic responses.
//!
//! Produces well-formed random submissions for a survey, one random answer per
//! question, to seed a checkpoint or load-test aggregation.

use crate::models::{Response, Survey};
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Default file the generated responses are written to.
pub const GENERATED_RESPONSES_FILE: &str = "responses.json";

/// Generates `count` responses to `survey`.
///
/// Response `i` is created at `start + i` seconds, so a batch always sorts
/// after `start`. Questions without answers are left unanswered.
pub fn generate_responses<R: Rng + ?Sized>(
    survey: &Survey,
    count: usize,
    start: DateTime<Utc>,
    rng: &mut R,
) -> Vec<Response> {
    let responses: Vec<Response> = (0..count)
        .map(|i| {
            let answers = survey
                .questions
                .iter()
                .filter_map(|question| question.answers.choose(&mut *rng))
                .map(|answer| answer.id.clone());

            let mut response =
                Response::new(survey.id.clone(), start + Duration::seconds(i as i64), answers);
            response.id = Some(format!("generated-{}-{}", start.timestamp(), i + 1));
            response
        })
        .collect();

    debug!("Generated {} responses for survey {}", responses.len(), survey.id);
    responses
}
