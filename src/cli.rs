//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::MatchPolicy;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// survey-stats - incremental cross-tabulation of survey responses
///
/// Folds new responses into a stored checkpoint and reports every target
/// question's answers broken down by the survey's dimension questions.
///
/// Examples:
///   survey-stats --survey survey.json --responses responses.json
///   survey-stats --survey survey.json --display-survey survey_fr.json --responses responses.json
///   survey-stats --survey survey.json --responses responses.json --format json --output stats.json
///   survey-stats --survey survey.json --responses responses.json --rebuild --policy strict
///   survey-stats --survey survey.json --generate-responses 500 --output responses.json
///   survey-stats --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Survey definition used for aggregation keys (JSON)
    ///
    /// Identifiers must be stable across locales; its text is only used when
    /// --display-survey is not given.
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub survey: Option<PathBuf>,

    /// Survey definition used for display text (JSON)
    ///
    /// Usually the same survey fetched in the reader's locale.
    #[arg(short, long, value_name = "FILE")]
    pub display_survey: Option<PathBuf>,

    /// Response records (JSON array)
    ///
    /// Only responses of this survey created after the stored checkpoint are merged.
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present_any = ["init_config", "generate_responses"]
    )]
    pub responses: Option<PathBuf>,

    /// Directory holding checkpoints
    #[arg(long, value_name = "DIR", env = "SURVEY_STATS_STORE")]
    pub store: Option<PathBuf>,

    /// Output file path for the report (or the generated responses)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Policy for answers that belong to no survey question (lenient, strict)
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<MatchPolicy>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .survey-stats.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore the stored checkpoint and recount every response
    #[arg(long)]
    pub rebuild: bool,

    /// Merge and report without writing the checkpoint
    #[arg(long)]
    pub dry_run: bool,

    /// Drop responses that do not answer every question exactly once
    #[arg(long)]
    pub validate: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .survey-stats.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Write N random well-formed responses to the survey instead of aggregating
    ///
    /// Output goes to --output, or responses.json when not given.
    #[arg(long, value_name = "N", conflicts_with_all = ["responses", "rebuild", "dry_run"])]
    pub generate_responses: Option<usize>,

    /// Seed for --generate-responses, for a reproducible batch
    #[arg(long, value_name = "SEED", requires = "generate_responses")]
    pub seed: Option<u64>,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for (flag, path) in [
            ("--survey", &self.survey),
            ("--display-survey", &self.display_survey),
            ("--responses", &self.responses),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(format!("{} file does not exist: {}", flag, path.display()));
                }
            }
        }

        if let Some(ref store) = self.store {
            if store.exists() && !store.is_dir() {
                return Err(format!(
                    "Store path is not a directory: {}",
                    store.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
