//! Response validation.
//!
//! A well-formed response carries exactly one answer per survey question and
//! nothing else. Aggregation assumes this; the checks here let callers drop
//! malformed submissions before they reach the matrix.

use crate::models::{AnswerId, QuestionId, Response, Survey};
use std::collections::HashMap;
use thiserror::Error;

/// Why a response was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("response has no answers")]
    Empty,

    #[error("answer '{0}' does not belong to the survey")]
    UnknownAnswer(AnswerId),

    #[error("question '{question}' has {count} answers, expected exactly one")]
    AnswerCount { question: QuestionId, count: usize },

    #[error("response belongs to survey '{0}'")]
    WrongSurvey(String),
}

/// Checks that `answers` hold exactly one known answer per survey question.
pub fn validate_answers<'a, I>(survey: &Survey, answers: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a AnswerId>,
{
    let mut per_question: HashMap<&QuestionId, usize> = HashMap::new();
    let mut seen_any = false;

    for answer in answers {
        seen_any = true;
        let owner = survey
            .answer_owner(answer)
            .ok_or_else(|| ValidationError::UnknownAnswer(answer.clone()))?;
        *per_question.entry(&owner.id).or_default() += 1;
    }

    if !seen_any {
        return Err(ValidationError::Empty);
    }

    for question in &survey.questions {
        let count = per_question.get(&question.id).copied().unwrap_or(0);
        if count != 1 {
            return Err(ValidationError::AnswerCount {
                question: question.id.clone(),
                count,
            });
        }
    }

    Ok(())
}

/// Validates a stored response against its survey.
pub fn validate_response(survey: &Survey, response: &Response) -> Result<(), ValidationError> {
    if response.survey_id != survey.id {
        return Err(ValidationError::WrongSurvey(response.survey_id.to_string()));
    }
    validate_answers(survey, &response.content)
}

/// Splits responses into valid ones and rejected ones with their reason.
pub fn partition_valid(
    survey: &Survey,
    responses: Vec<Response>,
) -> (Vec<Response>, Vec<(Response, ValidationError)>) {
    let mut valid = Vec::with_capacity(responses.len());
    let mut rejected = Vec::new();

    for response in responses {
        match validate_response(survey, &response) {
            Ok(()) => valid.push(response),
            Err(e) => rejected.push((response, e)),
        }
    }

    (valid, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, Question};
    use chrono::Utc;

    fn survey() -> Survey {
        Survey {
            id: "s1".into(),
            description: String::new(),
            locale: None,
            questions: vec![
                Question::target("q1", "Q1", vec![Answer::new("a1", ""), Answer::new("a2", "")]),
                Question::dimension("d1", "D1", vec![Answer::new("x", ""), Answer::new("y", "")]),
            ],
        }
    }

    fn ids(raw: &[&str]) -> Vec<AnswerId> {
        raw.iter().map(|s| AnswerId::from(*s)).collect()
    }

    #[test]
    fn test_valid_answers() {
        assert_eq!(validate_answers(&survey(), &ids(&["a1", "x"])), Ok(()));
    }

    #[test]
    fn test_empty_answers() {
        assert_eq!(validate_answers(&survey(), &ids(&[])), Err(ValidationError::Empty));
    }

    #[test]
    fn test_unknown_answer() {
        assert_eq!(
            validate_answers(&survey(), &ids(&["a1", "zz"])),
            Err(ValidationError::UnknownAnswer("zz".into()))
        );
    }

    #[test]
    fn test_missing_question() {
        assert_eq!(
            validate_answers(&survey(), &ids(&["a1"])),
            Err(ValidationError::AnswerCount {
                question: "d1".into(),
                count: 0,
            })
        );
    }

    #[test]
    fn test_two_answers_for_one_question() {
        assert_eq!(
            validate_answers(&survey(), &ids(&["a1", "a2", "x"])),
            Err(ValidationError::AnswerCount {
                question: "q1".into(),
                count: 2,
            })
        );
    }

    #[test]
    fn test_partition_valid() {
        let responses = vec![
            Response::new("s1", Utc::now(), ["a1", "x"]),
            Response::new("s1", Utc::now(), ["a2"]),
            Response::new("other", Utc::now(), ["a2", "y"]),
        ];

        let (valid, rejected) = partition_valid(&survey(), responses);

        assert_eq!(valid.len(), 1);
        assert_eq!(rejected.len(), 2);
        assert!(matches!(rejected[1].1, ValidationError::WrongSurvey(_)));
    }
}
