//! soulstat - soul debate log aggregator
//!
//! A CLI tool that reads directories of JSON soul debate logs and
//! produces grouped statistics, temporal trends, validation summaries,
//! pairwise comparisons and flattened CSV exports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Fatal error (bad directory, bad config, unwritable output, etc.)
//!       or, for `validate`, at least one invalid record or unparseable file

mod analysis;
mod cli;
mod config;
mod models;
mod report;
mod scanner;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{AggregateArgs, Args, Command, CompareArgs, ExportArgs, TrendArgs, ValidateArgs};
use config::{Config, CONFIG_FILE_NAME};
use models::{AggregateDocument, ReportMetadata};
use scanner::{FileScanner, RawDocument, RecordSet, ScanConfig};
use std::path::PathBuf;
use std::time::Instant;
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

    init_logging(&args);

    info!("soulstat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .soulstat.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize input directory, validation policy and reports.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so report output on stdout stays clean.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Dispatch the selected command. Returns the process exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let Some(command) = args.command.clone() else {
        bail!("A command is required (see --help)");
    };

    match command {
        Command::Aggregate(cmd) => run_aggregate(&config, &cmd, args.quiet).await,
        Command::Validate(cmd) => run_validate(&config, &cmd, args.quiet).await,
        Command::Trend(cmd) => run_trend(&config, &cmd, args.quiet).await,
        Command::Compare(cmd) => run_compare(&config, &cmd).await,
        Command::Export(cmd) => run_export(&config, &cmd, args.quiet).await,
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// Discover, read and validate the records of the configured input directory.
async fn load_records(config: &Config, quiet: bool) -> Result<RecordSet> {
    let root = PathBuf::from(&config.input.directory);

    let scan_config = ScanConfig {
        concurrency: config.general.concurrency,
        show_progress: !quiet,
        ..ScanConfig::from(&config.input)
    };

    if !quiet {
        eprintln!("📂 Reading logs from: {}", root.display());
    }

    let batch = FileScanner::new(root.clone(), scan_config)
        .load()
        .await
        .with_context(|| format!("Failed to load logs from {}", root.display()))?;

    let set = batch.into_records(
        &config.validation.shape_rules(),
        config.validation.policy,
    );

    info!("{}", set.summary.headline());
    if !quiet {
        eprintln!("   {}", set.summary.headline());
    }

    Ok(set)
}

async fn run_aggregate(config: &Config, cmd: &AggregateArgs, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();
    let set = load_records(config, quiet).await?;

    if set.records.is_empty() {
        warn!("No valid records found in {}", config.input.directory);
    }

    let trend = config
        .report
        .include_temporal
        .then(|| analysis::temporal_trend(&set.records));

    let aggregate = if config.report.shards > 1 {
        analysis::aggregate_sharded(set.records, config.report.shards, config.report.top_terms)
            .await
            .context("Aggregation task failed")?
    } else {
        analysis::aggregate_with_top(&set.records, config.report.top_terms)
    };

    let group_by = config.report.group_by;
    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        input_directory: config.input.directory.clone(),
        grouping: group_by.as_str().to_string(),
        load: set.summary,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let doc = AggregateDocument::new(
        metadata,
        aggregate,
        group_by.includes_model(),
        group_by.includes_session(),
        group_by.includes_spike_terms(),
        trend,
    );

    let output = report::render_aggregate(&doc, config.report.format)?;
    report::write_output(&output, cmd.output.output.as_deref())?;

    if !quiet {
        eprintln!("\n📊 Aggregate Summary:");
        eprintln!("   Records: {}", doc.total_count);
        eprintln!(
            "   Sessions: {} | Models: {}",
            doc.global_stats.unique_sessions, doc.global_stats.unique_models
        );
        eprintln!(
            "   Spikes: {} ({} unique terms)",
            doc.global_stats.spike_stats.total_spikes, doc.global_stats.spike_stats.unique_terms
        );
        if let Some(ref path) = cmd.output.output {
            eprintln!("\n✅ Aggregate saved to: {}", path.display());
        }
    }

    Ok(0)
}

async fn run_validate(config: &Config, cmd: &ValidateArgs, quiet: bool) -> Result<i32> {
    let set = load_records(config, quiet).await?;

    let output = report::render_validation(&set.summary, config.report.format)?;
    report::write_output(&output, cmd.output.output.as_deref())?;

    if set.summary.has_failures() {
        if !quiet {
            eprintln!("\n⛔ Invalid records found (exit code 1).");
        }
        return Ok(1);
    }

    Ok(0)
}

async fn run_trend(config: &Config, cmd: &TrendArgs, quiet: bool) -> Result<i32> {
    let set = load_records(config, quiet).await?;
    let trend = analysis::temporal_trend(&set.records);

    if trend.total_records < set.records.len() {
        info!(
            "{} records without a timestamp left out of the trend",
            set.records.len() - trend.total_records
        );
    }

    let output = report::render_trend(&trend, config.report.format)?;
    report::write_output(&output, cmd.output.output.as_deref())?;
    Ok(0)
}

async fn run_compare(config: &Config, cmd: &CompareArgs) -> Result<i32> {
    let rules = config.validation.shape_rules();
    let policy = config.validation.policy;
    let mut records = Vec::with_capacity(cmd.files.len());

    for path in &cmd.files {
        let doc = RawDocument {
            source: path.to_string_lossy().to_string(),
            value: scanner::read_document(path).await?,
        };

        let (issues, coerced) = doc.accept(&rules, policy);
        for issue in issues.iter().filter(|i| i.is_error()) {
            warn!("{}: {}", doc.source, issue);
        }

        let record = match coerced {
            Ok(record) => record,
            Err(reason) => bail!(
                "Cannot compare {}: {} (use --lenient to coerce it anyway)",
                path.display(),
                reason
            ),
        };
        records.push((doc.source, record));
    }

    let set = analysis::compare_all(&records);
    info!("Computed {} pairwise comparisons", set.total_comparisons);

    let output = report::render_comparisons(&set, cmd.summary, config.report.format)?;
    report::write_output(&output, cmd.output.output.as_deref())?;
    Ok(0)
}

async fn run_export(config: &Config, cmd: &ExportArgs, quiet: bool) -> Result<i32> {
    let set = load_records(config, quiet).await?;

    let output = report::generate_csv(&set.records);
    report::write_output(&output, cmd.output.as_deref())?;

    if !quiet {
        if let Some(ref path) = cmd.output {
            eprintln!(
                "\n✅ Exported {} records to: {}",
                set.records.len(),
                path.display()
            );
        }
    }
    Ok(0)
}
