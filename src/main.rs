//! survey-stats - incremental survey cross-tabulation
//!
//! Reads a survey definition and its responses, folds the responses created
//! since the last checkpoint into the stored matrix, and writes a report.
//! With `--generate-responses N` it writes random responses instead.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad input, unreadable files, checkpoint conflict, etc.)

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use survey_stats::cli::{Args, OutputFormat};
use survey_stats::config::{Config, CONFIG_FILE};
use survey_stats::generate::{generate_responses, GENERATED_RESPONSES_FILE};
use survey_stats::models::{Response, Survey};
use survey_stats::report;
use survey_stats::service::{RefreshOptions, StatsService};
use survey_stats::store::FileCheckpointStore;
use survey_stats::validation::partition_valid;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging so its verbose setting can apply
    let config = match load_config(&args) {
        Ok(mut config) => {
            config.merge_with_args(&args);
            config
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, &config);

    info!("survey-stats v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match args.generate_responses {
        Some(count) => run_generate(&args, count).await,
        None => run_stats(args, config).await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .survey-stats.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to choose the store directory, policy and report format.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one refresh-and-report cycle.
async fn run_stats(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();

    // Both are required unless --init-config, which returned earlier
    let survey_path = args.survey.as_deref().context("--survey is required")?;
    let responses_path = args.responses.as_deref().context("--responses is required")?;

    // Step 1: Load the survey, twice if display text comes from another locale
    let survey: Survey = read_json(survey_path).await?;
    let display = match args.display_survey {
        Some(ref path) => {
            let display_survey: Survey = read_json(path).await?;
            if display_survey.id != survey.id {
                warn!(
                    "Display survey id {} differs from survey id {}; text lookups may miss",
                    display_survey.id, survey.id
                );
            }
            display_survey
        }
        None => survey.clone(),
    };
    println!(
        "📋 Survey {}: {} targets, {} dimensions",
        survey.id,
        survey.targets().len(),
        survey.dimensions().len()
    );

    // Step 2: Load responses
    let mut responses: Vec<Response> = read_json(responses_path).await?;
    info!("Loaded {} responses from {}", responses.len(), responses_path.display());

    if config.aggregation.validate {
        let (valid, rejected) = partition_valid(&survey, responses);
        for (response, reason) in &rejected {
            warn!(
                "Dropping response {}: {}",
                response.id.as_deref().unwrap_or("<unnamed>"),
                reason
            );
        }
        if !rejected.is_empty() {
            println!("   ⚠️  {} responses failed validation and were skipped", rejected.len());
        }
        responses = valid;
    }

    // Step 3: Refresh the checkpoint
    let store = FileCheckpointStore::open(&config.store.dir).with_context(|| {
        format!("Failed to open checkpoint store {}", config.store.dir.display())
    })?;
    let service = StatsService::new(store);
    let options = RefreshOptions {
        policy: config.aggregation.policy,
        rebuild: args.rebuild,
        dry_run: args.dry_run,
    };

    let spinner = (!args.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Aggregating responses ({} policy)...", options.policy));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let outcome = service.refresh(&survey, &responses, options).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let outcome = outcome?;

    if outcome.stats.unmatched_answers > 0 {
        warn!(
            "{} chosen answers matched no survey question and were ignored",
            outcome.stats.unmatched_answers
        );
    }

    // Step 4: Format and write the report
    let stats_report = service.report(&outcome, &display);
    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&stats_report)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&stats_report, config.report.markdown_options())
        }
    };

    report::write_report(&output, &config.general.output).with_context(|| {
        format!("Failed to write report to {}", config.general.output.display())
    })?;

    // Print summary
    let checkpoint = &outcome.checkpoint;
    println!("\n📊 Aggregation Summary:");
    println!(
        "   Checkpoint: {}",
        if outcome.fresh { "built fresh" } else { "updated" }
    );
    println!("   New responses merged: {}", outcome.stats.responses);
    println!("   Responses counted overall: {}", checkpoint.responses_folded);
    println!("   Target answers counted: {}", stats_report.total_answers());
    match checkpoint.updated_at {
        Some(mark) => println!("   Counted through: {}", mark.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("   Counted through: no responses yet"),
    }
    if outcome.persisted {
        println!("   Revision: {}", checkpoint.revision);
    } else {
        println!("   Checkpoint not written (dry run)");
    }
    println!("   Duration: {:.2}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Report saved to: {}",
        config.general.output.display()
    );

    Ok(())
}

/// Write `count` random responses to the survey as a JSON array.
async fn run_generate(args: &Args, count: usize) -> Result<()> {
    let survey_path = args.survey.as_deref().context("--survey is required")?;
    let survey: Survey = read_json(survey_path).await?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let responses = generate_responses(&survey, count, Utc::now(), &mut rng);

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(GENERATED_RESPONSES_FILE));
    let json = serde_json::to_string_pretty(&responses)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Generated {} responses for survey {}", responses.len(), survey.id);
    println!(
        "✅ Wrote {} random responses for survey {} to {}",
        responses.len(),
        survey.id,
        path.display()
    );
    Ok(())
}

/// Read and parse a JSON input file.
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
