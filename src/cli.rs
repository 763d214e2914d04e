//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// soulstat - aggregate, validate and compare soul debate logs
///
/// Reads a directory of JSON log records and produces grouped statistics,
/// temporal trends, validation summaries and pairwise comparisons.
///
/// Examples:
///   soulstat aggregate --input logs --temporal
///   soulstat aggregate --input logs --group-by model --format text
///   soulstat validate --input logs
///   soulstat compare logs/a.json logs/b.json --summary
///   soulstat export --input logs --output aggregated_logs.csv
///   soulstat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .soulstat.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Number of files read concurrently
    #[arg(long, value_name = "NUM", env = "SOULSTAT_CONCURRENCY", global = true)]
    pub concurrency: Option<usize>,

    /// Generate a default .soulstat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate log records into grouped statistics
    Aggregate(AggregateArgs),

    /// Validate log records and report valid/invalid counts
    Validate(ValidateArgs),

    /// Compute the temporal trend of entropy, MI and spike counts
    Trend(TrendArgs),

    /// Compare two or more individual log files
    Compare(CompareArgs),

    /// Flatten log records into a CSV file
    Export(ExportArgs),
}

/// Where to read log records from.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Directory containing JSON log files (default: from config, "logs")
    #[arg(short, long, value_name = "DIR")]
    pub input: Option<PathBuf>,

    /// Also read log files in subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Keep records with shape errors, filling defaults
    #[arg(long)]
    pub lenient: bool,
}

/// Where and how to write the result.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, text)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Grouping to include in the report
    #[arg(short, long, value_name = "GROUP")]
    pub group_by: Option<GroupBy>,

    /// Include temporal trend analysis
    #[arg(short, long)]
    pub temporal: bool,

    /// Aggregate in this many parallel shards
    #[arg(long, value_name = "NUM")]
    pub shards: Option<usize>,

    /// Number of most common spike terms to list
    #[arg(long, value_name = "COUNT")]
    pub top_terms: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TrendArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompareArgs {
    /// Log files to compare (at least two)
    #[arg(value_name = "FILE", num_args = 2.., required = true)]
    pub files: Vec<PathBuf>,

    /// Show only a summary row per pair
    #[arg(short, long)]
    pub summary: bool,

    /// Compare records with shape errors, filling defaults
    #[arg(long)]
    pub lenient: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// CSV output path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Output format for reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// Human-readable text summary
    Text,
}

/// Which groupings an aggregate report includes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum GroupBy {
    Model,
    Session,
    SpikeTerms,
    /// Every grouping (default)
    #[default]
    All,
}

impl GroupBy {
    pub fn includes_model(self) -> bool {
        matches!(self, GroupBy::Model | GroupBy::All)
    }

    pub fn includes_session(self) -> bool {
        matches!(self, GroupBy::Session | GroupBy::All)
    }

    pub fn includes_spike_terms(self) -> bool {
        matches!(self, GroupBy::SpikeTerms | GroupBy::All)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Model => "model",
            GroupBy::Session => "session",
            GroupBy::SpikeTerms => "spike-terms",
            GroupBy::All => "all",
        }
    }
}

impl Command {
    /// Input arguments, for commands that read a directory.
    pub fn input(&self) -> Option<&InputArgs> {
        match self {
            Command::Aggregate(a) => Some(&a.input),
            Command::Validate(a) => Some(&a.input),
            Command::Trend(a) => Some(&a.input),
            Command::Export(a) => Some(&a.input),
            Command::Compare(_) => None,
        }
    }

    /// Output format requested on the command line.
    pub fn format(&self) -> Option<OutputFormat> {
        match self {
            Command::Aggregate(a) => a.output.format,
            Command::Validate(a) => a.output.format,
            Command::Trend(a) => a.output.format,
            Command::Compare(a) => a.output.format,
            Command::Export(_) => None,
        }
    }
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

        let command = match self.command {
            Some(ref command) => command,
            None => return Err("A command is required (see --help)".to_string()),
        };

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        match command {
            Command::Aggregate(a) => {
                if a.shards == Some(0) {
                    return Err("Shards must be at least 1".to_string());
                }
                if a.top_terms == Some(0) {
                    return Err("Top terms must be at least 1".to_string());
                }
            }
            Command::Compare(a) => {
                if a.files.len() < 2 {
                    return Err("At least 2 log files are required for comparison".to_string());
                }
            }
            _ => {}
        }

        if let Some(dir) = command.input().and_then(|i| i.input.as_ref()) {
            if !dir.exists() {
                return Err(format!("Input directory does not exist: {}", dir.display()));
            }
            if !dir.is_dir() {
                return Err(format!("Input path is not a directory: {}", dir.display()));
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
