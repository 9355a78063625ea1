//! survey-stats - incremental cross-tabulation of survey responses.
//!
//! Surveys are made of multiple-choice questions split into *target*
//! questions (what is measured) and *dimension* questions (how results are
//! broken down). The crate keeps, per survey, a checkpointed matrix counting
//! every target answer overall and per dimension answer, and folds in only the
//! responses that arrived since the last checkpoint.
//!
//! ```text
//! matrix = merge(new_responses, checkpoint ?? build(targets, dimensions))
//! persist(matrix)
//! report = format_stats(matrix, localized_questions)
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod generate;
pub mod models;
pub mod report;
pub mod service;
pub mod store;
pub mod validation;
