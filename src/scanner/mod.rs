//! Log file discovery and loading.
//!
//! The scanner finds candidate `*.json` files under an input directory,
//! leaves out schema files, reads the rest concurrently and hands back raw
//! JSON documents with a [`LoadSummary`]. Turning documents into typed
//! records is a separate, policy-driven step ([`LoadedBatch::into_records`]).

use crate::analysis::validate::{
    error_count, validate_shape_with, ShapeRules, ValidationIssue, ValidationPolicy,
};
use crate::models::{Diagnostic, LoadSummary, LogRecord};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Errors raised while locating or reading log files.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("input directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("input path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File name suffixes that mark schema files (e.g. `schema.json`).
    pub exclude_suffixes: Vec<String>,
    /// Directory or file names to skip entirely.
    pub excludes: Vec<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Number of files read at once.
    pub concurrency: usize,
    /// Show a progress bar while reading.
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_suffixes: vec!["schema.json".to_string()],
            excludes: vec!["node_modules".to_string(), "target".to_string()],
            recursive: false,
            concurrency: 4,
            show_progress: false,
        }
    }
}

impl From<&crate::config::InputConfig> for ScanConfig {
    fn from(config: &crate::config::InputConfig) -> Self {
        Self {
            exclude_suffixes: config.exclude_suffixes.clone(),
            excludes: config.excludes.clone(),
            recursive: config.recursive,
            ..Default::default()
        }
    }
}

/// A parsed JSON document and the file it came from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Path relative to the input directory.
    pub source: String,
    pub value: Value,
}

impl RawDocument {
    /// Validate the document, then coerce it if `policy` accepts the issues.
    ///
    /// Issues are returned either way; the error names why a document was
    /// rejected.
    pub fn accept(
        &self,
        rules: &ShapeRules,
        policy: ValidationPolicy,
    ) -> (Vec<ValidationIssue>, Result<LogRecord, String>) {
        let issues = validate_shape_with(&self.value, rules);
        for issue in &issues {
            debug!("{}: {}", self.source, issue);
        }

        let coerced = if policy.accepts(&issues) {
            LogRecord::coerce(&self.value, Some(&self.source)).map_err(|e| e.to_string())
        } else {
            Err(format!("{} validation errors", error_count(&issues)))
        };

        (issues, coerced)
    }
}

/// Documents read from disk, before validation.
#[derive(Debug, Clone, Default)]
pub struct LoadedBatch {
    pub documents: Vec<RawDocument>,
    pub summary: LoadSummary,
}

/// Typed records accepted by the validation policy.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub records: Vec<LogRecord>,
    pub summary: LoadSummary,
}

impl LoadedBatch {
    /// Validate every document and coerce the ones `policy` accepts.
    ///
    /// Rejected documents are counted as invalid, with one diagnostic per
    /// error-level issue. Warnings are counted on every document.
    pub fn into_records(self, rules: &ShapeRules, policy: ValidationPolicy) -> RecordSet {
        let mut summary = self.summary;
        let mut records = Vec::with_capacity(self.documents.len());

        for doc in self.documents {
            let (issues, coerced) = doc.accept(rules, policy);
            summary.warnings += issues.len() - error_count(&issues);

            match coerced {
                Ok(record) => {
                    summary.valid_records += 1;
                    records.push(record);
                }
                Err(reason) => {
                    warn!("Skipping invalid record {}: {}", doc.source, reason);
                    summary.invalid_records += 1;
                    summary.diagnostics.extend(
                        issues
                            .iter()
                            .filter(|i| i.is_error())
                            .map(|i| Diagnostic {
                                file: doc.source.clone(),
                                message: i.to_string(),
                            }),
                    );
                }
            }
        }

        RecordSet { records, summary }
    }
}

/// Scanner for log files under one input directory.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// List candidate log files, sorted by path.
    pub fn scan(&self) -> Result<Vec<PathBuf>, LoadError> {
        if !self.root.exists() {
            return Err(LoadError::MissingDirectory(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(LoadError::NotADirectory(self.root.clone()));
        }

        let max_depth = if self.config.recursive { usize::MAX } else { 1 };

        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Cannot read directory entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(DirEntry::into_path)
            .filter(|path| self.matches(path))
            .collect();

        files.sort();
        debug!("Found {} candidate log files", files.len());
        Ok(files)
    }

    /// Check if a file is a log file candidate.
    pub fn matches(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        if !name.ends_with(".json") {
            return false;
        }

        !self
            .config
            .exclude_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }

    /// Hidden entries and configured names are skipped.
    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|pattern| name == *pattern)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    /// Read and parse every candidate file.
    ///
    /// Files are read `concurrency` at a time, results stay in path order.
    /// Unreadable files and invalid JSON become diagnostics; schema
    /// documents are skipped.
    pub async fn load(&self) -> Result<LoadedBatch, LoadError> {
        let paths = self.scan()?;
        info!("Loading {} log files from {}", paths.len(), self.root.display());

        let progress = self.progress_bar(paths.len() as u64);

        let results: Vec<(PathBuf, Result<Value, LoadError>)> = stream::iter(paths)
            .map(|path| async move {
                let result = read_document(&path).await;
                (path, result)
            })
            .buffered(self.config.concurrency.max(1))
            .inspect(|_| progress.inc(1))
            .collect()
            .await;

        progress.finish_and_clear();

        let mut batch = LoadedBatch::default();
        batch.summary.files_found = results.len();

        for (path, result) in results {
            let source = self.relative(&path);
            match result {
                Ok(value) if is_schema_document(&value) => {
                    debug!("Skipping schema document {}", source);
                    batch.summary.schema_files_skipped += 1;
                }
                Ok(value) => batch.documents.push(RawDocument { source, value }),
                Err(e) => {
                    warn!("{}", e);
                    batch.summary.parse_errors += 1;
                    batch.summary.diagnostics.push(Diagnostic {
                        file: source,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(batch)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Read and parse one JSON file.
pub async fn read_document(path: &Path) -> Result<Value, LoadError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Whether a document is a JSON Schema rather than a log record.
pub fn is_schema_document(value: &Value) -> bool {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return false,
    };

    obj.contains_key("$schema")
        || (obj.get("type").and_then(Value::as_str) == Some("object")
            && obj.get("properties").is_some_and(Value::is_object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        if let Some(parent) = dir.join(name).parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(dir.join(name), content).unwrap();
    }

    fn record_json(session: &str) -> String {
        json!({
            "timestamp": "2025-07-01T12:00:00Z",
            "session_id": session,
            "model": "grok-4",
            "seed": 1,
            "violations": 0,
            "tokens": 10,
            "entropy": 0.5,
            "mutual_information": 0.25,
            "spikes": [],
            "text": "turn"
        })
        .to_string()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b_debate.json", &record_json("s2"));
        write(dir.path(), "a_debate.json", &record_json("s1"));
        write(dir.path(), "soul_debate_schema.json", r#"{"type": "object"}"#);
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "notes.txt", "ignore me");
        write(dir.path(), ".hidden.json", &record_json("hidden"));
        write(dir.path(), "nested/c_debate.json", &record_json("s3"));
        write(
            dir.path(),
            "embedded.json",
            r#"{"$schema": "http://json-schema.org/draft-07/schema#", "type": "object"}"#,
        );
        write(dir.path(), "partial.json", r#"{"model": "grok-4"}"#);
        dir
    }

    fn scanner(dir: &TempDir, recursive: bool) -> FileScanner {
        let config = ScanConfig {
            recursive,
            ..Default::default()
        };
        FileScanner::new(dir.path().to_path_buf(), config)
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = fixture();
        let names: Vec<String> = scanner(&dir, false)
            .scan()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "a_debate.json",
                "b_debate.json",
                "broken.json",
                "embedded.json",
                "partial.json"
            ]
        );
    }

    #[test]
    fn test_scan_recursive() {
        let dir = fixture();
        let files = scanner(&dir, true).scan().unwrap();
        assert!(files.iter().any(|p| p.ends_with("nested/c_debate.json")));
    }

    #[test]
    fn test_scan_missing_directory() {
        let scanner = FileScanner::new(PathBuf::from("/definitely/not/here"), ScanConfig::default());
        assert!(matches!(scanner.scan(), Err(LoadError::MissingDirectory(_))));
    }

    #[test]
    fn test_load_reports_parse_errors_and_schemas() {
        let dir = fixture();
        let batch = tokio_test::block_on(scanner(&dir, false).load()).unwrap();

        assert_eq!(batch.summary.files_found, 5);
        assert_eq!(batch.summary.parse_errors, 1);
        assert_eq!(batch.summary.schema_files_skipped, 1);
        assert_eq!(batch.documents.len(), 3);
        assert_eq!(batch.documents[0].source, "a_debate.json");
        assert_eq!(batch.summary.diagnostics[0].file, "broken.json");
    }

    #[test]
    fn test_into_records_strict_and_lenient() {
        let dir = fixture();
        let batch = tokio_test::block_on(scanner(&dir, false).load()).unwrap();

        let strict = batch
            .clone()
            .into_records(&ShapeRules::default(), ValidationPolicy::Strict);
        assert_eq!(strict.records.len(), 2);
        assert_eq!(strict.summary.valid_records, 2);
        assert_eq!(strict.summary.invalid_records, 1);
        assert!(strict
            .summary
            .diagnostics
            .iter()
            .any(|d| d.file == "partial.json"));

        let lenient = batch.into_records(&ShapeRules::default(), ValidationPolicy::Lenient);
        assert_eq!(lenient.records.len(), 3);
        assert_eq!(lenient.summary.invalid_records, 0);
        assert_eq!(lenient.records[2].model, "grok-4");
        assert_eq!(lenient.records[2].source.as_deref(), Some("partial.json"));
    }

    #[test]
    fn test_accept_follows_policy() {
        let doc = RawDocument {
            source: "partial.json".to_string(),
            value: json!({"model": "grok-4"}),
        };

        let (issues, strict) = doc.accept(&ShapeRules::default(), ValidationPolicy::Strict);
        assert!(issues.iter().any(ValidationIssue::is_error));
        assert!(strict.unwrap_err().contains("validation errors"));

        let (_, lenient) = doc.accept(&ShapeRules::default(), ValidationPolicy::Lenient);
        let record = lenient.unwrap();
        assert_eq!(record.model, "grok-4");
        assert_eq!(record.source.as_deref(), Some("partial.json"));
    }

    #[test]
    fn test_is_schema_document() {
        assert!(is_schema_document(&json!({"$schema": "x"})));
        assert!(is_schema_document(
            &json!({"type": "object", "properties": {"model": {"type": "string"}}})
        ));
        assert!(!is_schema_document(&json!({"type": "object"})));
        assert!(!is_schema_document(&json!({"model": "grok", "type": "debate"})));
        assert!(!is_schema_document(&json!([1, 2])));
    }
}
