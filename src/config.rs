//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.soulstat.toml` files.

use crate::analysis::validate::{ShapeRules, ValidationPolicy, DEFAULT_REQUIRED_FIELDS};
use crate::cli::{Args, Command, GroupBy, OutputFormat};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".soulstat.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input discovery settings.
    #[serde(default)]
    pub input: InputConfig,

    /// Record validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of files read concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

/// Where log files are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Default input directory.
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,

    /// File name suffixes marking schema files.
    #[serde(default = "default_exclude_suffixes")]
    pub exclude_suffixes: Vec<String>,

    /// Directory or file names to skip.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            recursive: false,
            exclude_suffixes: default_exclude_suffixes(),
            excludes: default_excludes(),
        }
    }
}

fn default_directory() -> String {
    "logs".to_string()
}

fn default_exclude_suffixes() -> Vec<String> {
    vec!["schema.json".to_string()]
}

fn default_excludes() -> Vec<String> {
    vec!["node_modules", "target", "output"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Record validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// `strict` skips records with errors, `lenient` coerces them.
    #[serde(default)]
    pub policy: ValidationPolicy,

    /// Fields every record must carry.
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,

    /// Lower bound of the advisory intensity range.
    #[serde(default)]
    pub intensity_min: f64,

    /// Upper bound of the advisory intensity range.
    #[serde(default = "default_intensity_max")]
    pub intensity_max: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            policy: ValidationPolicy::default(),
            required_fields: default_required_fields(),
            intensity_min: 0.0,
            intensity_max: default_intensity_max(),
        }
    }
}

fn default_required_fields() -> Vec<String> {
    DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn default_intensity_max() -> f64 {
    1.0
}

impl ValidationConfig {
    pub fn shape_rules(&self) -> ShapeRules {
        ShapeRules {
            required_fields: self.required_fields.clone(),
            intensity_range: (self.intensity_min, self.intensity_max),
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Groupings included in aggregate reports.
    #[serde(default)]
    pub group_by: GroupBy,

    /// Add the temporal trend to aggregate reports.
    #[serde(default)]
    pub include_temporal: bool,

    /// Number of most common spike terms listed.
    #[serde(default = "default_top_terms")]
    pub top_terms: usize,

    /// Aggregate in this many parallel shards.
    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            group_by: GroupBy::default(),
            include_temporal: false,
            top_terms: default_top_terms(),
            shards: default_shards(),
        }
    }
}

fn default_top_terms() -> usize {
    crate::analysis::aggregator::DEFAULT_TOP_TERMS
}

fn default_shards() -> usize {
    1
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.general.concurrency == 0 {
            bail!("general.concurrency must be at least 1");
        }
        if self.report.shards == 0 {
            bail!("report.shards must be at least 1");
        }
        if self.report.top_terms == 0 {
            bail!("report.top_terms must be at least 1");
        }
        if self.validation.intensity_min > self.validation.intensity_max {
            bail!("validation.intensity_min must not exceed validation.intensity_max");
        }
        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        let Some(ref command) = args.command else {
            return;
        };

        if let Some(input) = command.input() {
            if let Some(ref dir) = input.input {
                self.input.directory = dir.to_string_lossy().to_string();
            }
            if input.recursive {
                self.input.recursive = true;
            }
            if input.lenient {
                self.validation.policy = ValidationPolicy::Lenient;
            }
        }

        if let Command::Compare(ref cmp) = command {
            if cmp.lenient {
                self.validation.policy = ValidationPolicy::Lenient;
            }
        }

        if let Some(format) = command.format() {
            self.report.format = format;
        }

        if let Command::Aggregate(ref agg) = command {
            if let Some(group_by) = agg.group_by {
                self.report.group_by = group_by;
            }
            if agg.temporal {
                self.report.include_temporal = true;
            }
            if let Some(shards) = agg.shards {
                self.report.shards = shards;
            }
            if let Some(top) = agg.top_terms {
                self.report.top_terms = top;
            }
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.input.directory, "logs");
        assert_eq!(config.input.exclude_suffixes, vec!["schema.json"]);
        assert_eq!(config.validation.policy, ValidationPolicy::Strict);
        assert_eq!(config.validation.required_fields.len(), 10);
        assert_eq!(config.report.top_terms, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
concurrency = 2

[input]
directory = "runs"
recursive = true

[validation]
policy = "lenient"
required_fields = ["model", "session_id"]

[report]
format = "text"
group_by = "spike-terms"
include_temporal = true
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.concurrency, 2);
        assert_eq!(config.input.directory, "runs");
        assert!(config.input.recursive);
        assert_eq!(config.input.exclude_suffixes, vec!["schema.json"]);
        assert_eq!(config.validation.policy, ValidationPolicy::Lenient);
        assert_eq!(config.validation.shape_rules().required_fields.len(), 2);
        assert_eq!(config.report.format, OutputFormat::Text);
        assert_eq!(config.report.group_by, GroupBy::SpikeTerms);
        assert!(config.report.include_temporal);
    }

    #[test]
    fn test_default_toml_round_trip() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[validation]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_load_rejects_zero_concurrency() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[general]\nconcurrency = 0").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_merge_compare_lenient() {
        let mut config = Config::default();
        config.merge_with_args(&Args::parse_from(["soulstat", "compare", "a.json", "b.json"]));
        assert_eq!(config.validation.policy, ValidationPolicy::Strict);

        config.merge_with_args(&Args::parse_from([
            "soulstat", "compare", "a.json", "b.json", "--lenient",
        ]));
        assert_eq!(config.validation.policy, ValidationPolicy::Lenient);
    }

    #[test]
    fn test_load_rejects_zero_top_terms() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[report]\ntop_terms = 0").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("top_terms"));
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "soulstat",
            "--verbose",
            "aggregate",
            "--input",
            "data",
            "--group-by",
            "model",
            "--temporal",
            "--shards",
            "4",
            "--lenient",
        ]);

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.input.directory, "data");
        assert_eq!(config.validation.policy, ValidationPolicy::Lenient);
        assert_eq!(config.report.group_by, GroupBy::Model);
        assert!(config.report.include_temporal);
        assert_eq!(config.report.shards, 4);
        assert_eq!(config.report.format, OutputFormat::Json);
    }
}
