//! Data models for soul debate logs and the reports built from them.
//!
//! Input records are coerced from raw JSON into [`LogRecord`] once they have
//! passed validation. Every report type is a plain serializable tree so the
//! writers in [`crate::report`] can render it without extra schema.

use crate::analysis::ShapeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Grouping key used when a record has no model or session.
pub const UNKNOWN: &str = "unknown";

/// A discrete signal detected inside a log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    /// Category of the detected signal.
    pub term: String,
    /// Signal strength, expected in `[0.0, 1.0]`.
    pub intensity: f64,
    /// Free-text context around the signal.
    pub context: String,
}

impl SpikeEvent {
    pub fn new(term: impl Into<String>, intensity: f64, context: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            intensity,
            context: context.into(),
        }
    }
}

/// One turn of a soul debate, as loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO-8601 timestamp, possibly malformed.
    pub timestamp: Option<String>,
    pub session_id: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub seed: u64,
    pub tokens: u64,
    pub violations: u64,
    /// `None` when the producer did not report it.
    pub entropy: Option<f64>,
    /// `None` when the producer did not report it.
    pub mutual_information: Option<f64>,
    pub spikes: Vec<SpikeEvent>,
    pub text: String,
    /// File the record was read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            timestamp: None,
            session_id: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
            branch: None,
            seed: 0,
            tokens: 0,
            violations: 0,
            entropy: None,
            mutual_information: None,
            spikes: Vec::new(),
            text: String::new(),
            source: None,
        }
    }
}

impl LogRecord {
    /// Build a typed record from a raw JSON value, filling defaults for
    /// anything absent or of the wrong type.
    ///
    /// Only a non-object value is rejected. Callers are expected to run
    /// [`crate::analysis::validate::validate_shape`] first and decide whether the
    /// record should be coerced at all.
    pub fn coerce(value: &Value, source: Option<&str>) -> Result<Self, ShapeError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ShapeError::NotAnObject(json_type_name(value)))?;

        let spikes = obj
            .get("spikes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|spike| {
                        SpikeEvent::new(
                            string_field(spike, "term").unwrap_or_else(|| UNKNOWN.to_string()),
                            spike.get("intensity").and_then(Value::as_f64).unwrap_or(0.0),
                            string_field(spike, "context").unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            timestamp: string_field(obj, "timestamp"),
            session_id: string_field(obj, "session_id").unwrap_or_else(|| UNKNOWN.to_string()),
            model: string_field(obj, "model").unwrap_or_else(|| UNKNOWN.to_string()),
            branch: string_field(obj, "branch"),
            seed: count_field(obj, "seed"),
            tokens: count_field(obj, "tokens"),
            violations: count_field(obj, "violations"),
            entropy: obj.get("entropy").and_then(Value::as_f64),
            mutual_information: obj.get("mutual_information").and_then(Value::as_f64),
            spikes,
            text: string_field(obj, "text").unwrap_or_default(),
            source: source.map(str::to_string),
        })
    }

    /// Entropy, or `0.0` when absent.
    pub fn entropy_or_zero(&self) -> f64 {
        self.entropy.unwrap_or(0.0)
    }

    /// Mutual information, or `0.0` when absent.
    pub fn mutual_information_or_zero(&self) -> f64 {
        self.mutual_information.unwrap_or(0.0)
    }

    pub fn spike_count(&self) -> usize {
        self.spikes.len()
    }

    /// Spike terms in the order they were logged.
    pub fn spike_terms(&self) -> Vec<String> {
        self.spikes.iter().map(|s| s.term.clone()).collect()
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn count_field(obj: &Map<String, Value>, key: &str) -> u64 {
    obj.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Human name of a JSON value's type, for diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Count, mean and extrema of a floating point field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanStats {
    /// Number of records that reported the field.
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-model statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub count: usize,
    pub avg_entropy: f64,
    pub avg_mutual_information: f64,
    pub total_tokens: u64,
    pub total_violations: u64,
    pub total_spikes: usize,
    pub unique_spike_terms: BTreeSet<String>,
    pub sessions: BTreeSet<String>,
    pub source_files: Vec<String>,
}

/// Spikes observed in one record of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeSnapshot {
    pub timestamp: Option<String>,
    pub spike_count: usize,
    pub terms: Vec<String>,
}

/// Per-session statistics. Progressions are in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub count: usize,
    pub models: BTreeSet<String>,
    pub timestamps: Vec<Option<String>>,
    pub entropy_progression: Vec<f64>,
    pub mi_progression: Vec<f64>,
    pub spike_progression: Vec<SpikeSnapshot>,
    pub total_tokens: u64,
    pub total_violations: u64,
    pub source_files: Vec<String>,
}

/// Per-term spike statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpikeTermStats {
    pub occurrence_count: usize,
    pub avg_intensity: f64,
    pub max_intensity: f64,
    pub min_intensity: f64,
    /// Every context, in input order.
    pub contexts: Vec<String>,
    pub unique_contexts: BTreeSet<String>,
    pub sessions: BTreeSet<String>,
    pub models: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpikeSummary {
    pub total_spikes: usize,
    pub unique_terms: usize,
    /// Most frequent terms; equal counts keep first-seen order.
    pub most_common_terms: Vec<TermCount>,
    pub avg_intensity: f64,
    pub max_intensity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub total: u64,
    pub mean: f64,
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationStats {
    pub total: u64,
    pub records_with_violations: usize,
}

/// Statistics across the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub unique_sessions: usize,
    pub unique_models: usize,
    pub models: BTreeSet<String>,
    pub entropy: MeanStats,
    pub mutual_information: MeanStats,
    pub token_stats: TokenStats,
    pub violation_stats: ViolationStats,
    pub spike_stats: SpikeSummary,
}

/// Grouped statistical summary of a batch of log records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub total_count: usize,
    pub by_model: BTreeMap<String, ModelStats>,
    pub by_session: BTreeMap<String, SessionStats>,
    pub by_spike_term: BTreeMap<String, SpikeTermStats>,
    pub global_stats: GlobalStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: String,
    pub entropy: f64,
    pub mutual_information: f64,
    pub spike_count: usize,
}

/// Endpoint trend over timestamped records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// Records that carried a timestamp.
    pub total_records: usize,
    pub time_span: TimeSpan,
    pub entropy_trend: f64,
    pub mi_trend: f64,
    pub spike_count_trend: f64,
    pub temporal_data: Vec<TrendPoint>,
}

/// A problem encountered while loading one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub message: String,
}

/// Outcome counts of a load, reported next to every aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub files_found: usize,
    pub schema_files_skipped: usize,
    pub parse_errors: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadSummary {
    /// "X valid / Y invalid" line used by every command.
    pub fn headline(&self) -> String {
        format!(
            "{} valid / {} invalid ({} parse errors, {} warnings, {} schema files skipped)",
            self.valid_records,
            self.invalid_records,
            self.parse_errors,
            self.warnings,
            self.schema_files_skipped
        )
    }

    pub fn has_failures(&self) -> bool {
        self.invalid_records > 0 || self.parse_errors > 0
    }
}

/// Metadata attached by the caller around a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub input_directory: String,
    pub grouping: String,
    pub load: LoadSummary,
    pub duration_seconds: f64,
}

/// The aggregate document written by the `aggregate` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateDocument {
    pub metadata: ReportMetadata,
    pub total_count: usize,
    pub global_stats: GlobalStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_trends: Option<TrendReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_model: Option<BTreeMap<String, ModelStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_session: Option<BTreeMap<String, SessionStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_spike_term: Option<BTreeMap<String, SpikeTermStats>>,
}

impl AggregateDocument {
    /// Assemble a document, keeping only the groupings that were asked for.
    pub fn new(
        metadata: ReportMetadata,
        report: AggregateReport,
        include_model: bool,
        include_session: bool,
        include_spike_terms: bool,
        temporal_trends: Option<TrendReport>,
    ) -> Self {
        Self {
            metadata,
            total_count: report.total_count,
            global_stats: report.global_stats,
            temporal_trends,
            by_model: include_model.then_some(report.by_model),
            by_session: include_session.then_some(report.by_session),
            by_spike_term: include_spike_terms.then_some(report.by_spike_term),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_full_record() {
        let value = json!({
            "timestamp": "2025-07-01T12:00:00Z",
            "session_id": "s1",
            "branch": "main",
            "model": "grok-4",
            "seed": 42,
            "violations": 1,
            "tokens": 512,
            "entropy": 0.8,
            "mutual_information": 0.3,
            "spikes": [{"term": "ache", "intensity": 0.7, "context": "I ache"}],
            "text": "hello"
        });

        let record = LogRecord::coerce(&value, Some("a.json")).unwrap();
        assert_eq!(record.session_id, "s1");
        assert_eq!(record.model, "grok-4");
        assert_eq!(record.branch.as_deref(), Some("main"));
        assert_eq!(record.tokens, 512);
        assert_eq!(record.entropy, Some(0.8));
        assert_eq!(record.spikes, vec![SpikeEvent::new("ache", 0.7, "I ache")]);
        assert_eq!(record.source.as_deref(), Some("a.json"));
    }

    #[test]
    fn test_coerce_fills_defaults() {
        let record = LogRecord::coerce(&json!({}), None).unwrap();
        assert_eq!(record, LogRecord::default());
        assert_eq!(record.model, UNKNOWN);
        assert_eq!(record.session_id, UNKNOWN);
        assert_eq!(record.entropy_or_zero(), 0.0);
        assert!(record.spikes.is_empty());
    }

    #[test]
    fn test_coerce_wrong_types_become_defaults() {
        let value = json!({
            "model": 7,
            "tokens": -3,
            "entropy": "high",
            "spikes": [42, {"intensity": 0.2}]
        });

        let record = LogRecord::coerce(&value, None).unwrap();
        assert_eq!(record.model, UNKNOWN);
        assert_eq!(record.tokens, 0);
        assert_eq!(record.entropy, None);
        assert_eq!(record.spikes, vec![SpikeEvent::new(UNKNOWN, 0.2, "")]);
    }

    #[test]
    fn test_coerce_rejects_non_object() {
        let err = LogRecord::coerce(&json!([1, 2]), None).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_load_summary_headline() {
        let summary = LoadSummary {
            valid_records: 3,
            invalid_records: 1,
            ..Default::default()
        };
        assert!(summary.headline().starts_with("3 valid / 1 invalid"));
        assert!(summary.has_failures());
    }
}
