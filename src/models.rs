//! Data models for survey aggregation.
//!
//! This module contains the survey definition tree (survey, questions,
//! answers), the respondent records and the persisted checkpoint.

use crate::analysis::BreakdownMatrix;
use crate::report::QuestionStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Locale-stable identifier of a survey.
    SurveyId
);
string_id!(
    /// Locale-stable identifier of a question.
    QuestionId
);
string_id!(
    /// Locale-stable identifier of an answer.
    AnswerId
);

/// A selectable answer, owned by exactly one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Stable identifier, shared by every locale.
    pub id: AnswerId,
    /// Display text in the survey's locale.
    #[serde(default, alias = "content")]
    pub text: String,
}

impl Answer {
    pub fn new(id: impl Into<AnswerId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Role a question plays in aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionRole {
    /// Measured question.
    Target,
    /// Breakdown axis (e.g. demographics).
    Dimension,
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Stable identifier, shared by every locale.
    pub id: QuestionId,
    /// Display text in the survey's locale.
    #[serde(default, alias = "content")]
    pub text: String,
    /// Whether results are broken down by this question rather than measured.
    #[serde(default, alias = "toAggregate")]
    pub is_dimension: bool,
    /// Answers in display order.
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Question {
    /// Creates a target question.
    pub fn target(
        id: impl Into<QuestionId>,
        text: impl Into<String>,
        answers: Vec<Answer>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_dimension: false,
            answers,
        }
    }

    /// Creates a dimension question.
    pub fn dimension(
        id: impl Into<QuestionId>,
        text: impl Into<String>,
        answers: Vec<Answer>,
    ) -> Self {
        Self {
            is_dimension: true,
            ..Self::target(id, text, answers)
        }
    }

    pub fn role(&self) -> QuestionRole {
        if self.is_dimension {
            QuestionRole::Dimension
        } else {
            QuestionRole::Target
        }
    }

    /// Returns true if `answer` belongs to this question.
    pub fn owns(&self, answer: &AnswerId) -> bool {
        self.answers.iter().any(|a| &a.id == answer)
    }
}

/// A survey definition, as fetched for one locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    /// Stable identifier, shared by every locale.
    pub id: SurveyId,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Locale of the display text, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Questions in display order.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Survey {
    fn with_role(&self, role: QuestionRole) -> Vec<Question> {
        self.questions
            .iter()
            .filter(|q| q.role() == role)
            .cloned()
            .collect()
    }

    /// Questions being measured.
    pub fn targets(&self) -> Vec<Question> {
        self.with_role(QuestionRole::Target)
    }

    /// Questions used to break down results.
    pub fn dimensions(&self) -> Vec<Question> {
        self.with_role(QuestionRole::Dimension)
    }

    /// Returns the question owning `answer`, if any.
    pub fn answer_owner(&self, answer: &AnswerId) -> Option<&Question> {
        self.questions.iter().find(|q| q.owns(answer))
    }
}

/// One respondent's submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Record identifier, if the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Survey this response belongs to.
    #[serde(alias = "survey")]
    pub survey_id: SurveyId,
    /// Creation time, used for checkpoint filtering.
    pub created_at: DateTime<Utc>,
    /// Chosen answer identifiers.
    #[serde(default)]
    pub content: BTreeSet<AnswerId>,
}

impl Response {
    pub fn new<I, A>(survey_id: impl Into<SurveyId>, created_at: DateTime<Utc>, answers: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AnswerId>,
    {
        Self {
            id: None,
            survey_id: survey_id.into(),
            created_at,
            content: answers.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the response was created strictly after `since`.
    ///
    /// A missing mark means nothing has been folded yet, so every response is new.
    pub fn is_newer_than(&self, since: Option<DateTime<Utc>>) -> bool {
        match since {
            Some(mark) => self.created_at > mark,
            None => true,
        }
    }
}

/// The persisted aggregate of one survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Survey the aggregate belongs to.
    pub survey_id: SurveyId,
    /// Aggregated counts.
    #[serde(alias = "stats")]
    pub matrix: BreakdownMatrix,
    /// High-water mark: every response created at or before it is folded in.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of responses folded in so far.
    #[serde(default)]
    pub responses_folded: u64,
    /// Store revision, bumped on every write.
    #[serde(default)]
    pub revision: u64,
}

impl Checkpoint {
    /// Creates an unsaved checkpoint around a freshly built matrix.
    pub fn fresh(survey_id: SurveyId, matrix: BreakdownMatrix) -> Self {
        Self {
            survey_id,
            matrix,
            updated_at: None,
            responses_folded: 0,
            revision: 0,
        }
    }

    /// Moves the high-water mark forward to cover `responses`.
    pub fn advance(&mut self, responses: &[&Response]) {
        let newest = responses.iter().map(|r| r.created_at).max();
        self.updated_at = match (self.updated_at, newest) {
            (Some(current), Some(newest)) => Some(current.max(newest)),
            (current, newest) => current.or(newest),
        };
        self.responses_folded += responses.len() as u64;
    }
}

/// Metadata about a stats report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Survey the report covers.
    pub survey_id: SurveyId,
    /// Survey description, in the display locale.
    pub description: String,
    /// Display locale, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Checkpoint high-water mark.
    pub updated_at: Option<DateTime<Utc>>,
    /// Responses folded into the checkpoint overall.
    pub responses_folded: u64,
    /// Responses merged by this run.
    pub responses_merged: usize,
}

/// The complete stats report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    /// Metadata about the report.
    pub metadata: ReportMetadata,
    /// Per target question results, in display order.
    pub aggregated_stats: Vec<QuestionStats>,
}

impl StatsReport {
    /// Sum of every target question's total.
    pub fn total_answers(&self) -> u64 {
        self.aggregated_stats.iter().map(|q| q.total_count).sum()
    }
}
