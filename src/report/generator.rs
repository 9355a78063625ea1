//! Markdown and JSON report generation.
//!
//! This module renders a [`StatsReport`] for humans (Markdown tables) or
//! for machines (pretty-printed JSON).

use crate::models::{ReportMetadata, StatsReport};
use crate::report::{AnswerStats, QuestionStats};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Rendering switches taken from the `[report]` config section.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownOptions {
    /// Render per-dimension breakdown tables.
    pub include_breakdowns: bool,
    /// Skip breakdown tables for answers nobody chose.
    pub hide_empty_breakdowns: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            include_breakdowns: true,
            hide_empty_breakdowns: false,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &StatsReport, options: MarkdownOptions) -> String {
    let mut output = String::new();

    output.push_str("# Survey Stats Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(&report.aggregated_stats));
    output.push_str(&generate_results_section(&report.aggregated_stats, options));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Survey:** `{}`\n", metadata.survey_id));
    if !metadata.description.is_empty() {
        section.push_str(&format!("- **Description:** {}\n", metadata.description));
    }
    if let Some(ref locale) = metadata.locale {
        section.push_str(&format!("- **Locale:** {}\n", locale));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match metadata.updated_at {
        Some(mark) => section.push_str(&format!(
            "- **Responses Through:** {}\n",
            mark.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => section.push_str("- **Responses Through:** no responses yet\n"),
    }
    section.push_str(&format!(
        "- **Responses Counted:** {}\n",
        metadata.responses_folded
    ));
    section.push_str(&format!(
        "- **New This Run:** {}\n",
        metadata.responses_merged
    ));
    section.push('\n');

    section
}

fn anchor(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in single_line(text).chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.extend(c.to_lowercase());
        } else if c == ' ' || c == '-' {
            slug.push('-');
        }
    }
    slug
}

/// Survey text on one line, for headings and links.
fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Survey text as a table cell.
fn cell(text: &str) -> String {
    single_line(text).replace('|', "\\|")
}

/// Generate the table of contents.
fn generate_table_of_contents(stats: &[QuestionStats]) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Results](#results)\n");

    for question in stats {
        toc.push_str(&format!(
            "  - [{}](#{})\n",
            single_line(&question.question),
            anchor(&question.question)
        ));
    }

    toc.push('\n');

    toc
}

/// Generate the results section.
fn generate_results_section(stats: &[QuestionStats], options: MarkdownOptions) -> String {
    let mut section = String::new();

    section.push_str("## Results\n\n");

    if stats.is_empty() {
        section.push_str("This survey has no target questions to report on.\n\n");
        return section;
    }

    for question in stats {
        section.push_str(&generate_question_section(question, options));
    }

    section
}

/// Generate the section for a single target question.
fn generate_question_section(question: &QuestionStats, options: MarkdownOptions) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {}\n\n", single_line(&question.question)));
    section.push_str(&format!("*Responses: {}*\n\n", question.total_count));

    section.push_str("| Answer | Count |\n");
    section.push_str("|:---|:---:|\n");
    for answer in &question.answers {
        section.push_str(&format!("| {} | {} |\n", cell(&answer.answer), answer.total_count));
    }
    section.push('\n');

    if options.include_breakdowns {
        for answer in &question.answers {
            if options.hide_empty_breakdowns && answer.total_count == 0 {
                continue;
            }
            section.push_str(&generate_breakdown_block(answer));
        }
    }

    section
}

/// Generate the breakdown tables of one target answer.
fn generate_breakdown_block(answer: &AnswerStats) -> String {
    if answer.breakdowns.is_empty() {
        return String::new();
    }

    let mut block = String::new();

    block.push_str(&format!(
        "#### {} ({})\n\n",
        single_line(&answer.answer),
        answer.total_count
    ));

    for breakdown in &answer.breakdowns {
        block.push_str(&format!("| {} | Count |\n", cell(&breakdown.by)));
        block.push_str("|:---|:---:|\n");
        for dim_answer in &breakdown.answers {
            block.push_str(&format!(
                "| {} | {} |\n",
                cell(&dim_answer.answer),
                dim_answer.count
            ));
        }
        block.push('\n');
    }

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by survey-stats v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &StatsReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
