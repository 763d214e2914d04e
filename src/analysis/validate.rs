//! Shape validation for raw log records.
//!
//! Validation never fails: it returns every problem it finds, graded as
//! errors or warnings. Whether a record with errors is kept is decided by
//! the caller through [`ValidationPolicy`].

use crate::analysis::trend::parse_timestamp;
use crate::models::json_type_name;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Fields every soul debate record is expected to carry.
pub const DEFAULT_REQUIRED_FIELDS: [&str; 10] = [
    "timestamp",
    "session_id",
    "model",
    "seed",
    "violations",
    "tokens",
    "entropy",
    "mutual_information",
    "spikes",
    "text",
];

/// Record-level failure that prevents coercion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("record must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    /// Advisory, never blocks a record.
    Warning,
    Error,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueLevel::Warning => write!(f, "warning"),
            IssueLevel::Error => write!(f, "error"),
        }
    }
}

/// One finding from [`validate_shape`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    /// Location inside the record, e.g. `spikes[2].intensity`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.level, self.message)
        } else {
            write!(f, "{}: {}: {}", self.level, self.path, self.message)
        }
    }
}

/// Which records are accepted for coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Skip records with any error-level issue.
    #[default]
    Strict,
    /// Coerce every object record, filling defaults.
    Lenient,
}

impl ValidationPolicy {
    pub fn accepts(&self, issues: &[ValidationIssue]) -> bool {
        match self {
            ValidationPolicy::Strict => !issues.iter().any(ValidationIssue::is_error),
            ValidationPolicy::Lenient => true,
        }
    }
}

/// Rules applied by [`validate_shape_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRules {
    pub required_fields: Vec<String>,
    /// Advisory range for spike intensity.
    pub intensity_range: (f64, f64),
}

impl Default for ShapeRules {
    fn default() -> Self {
        Self {
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            intensity_range: (0.0, 1.0),
        }
    }
}

/// Validate a record against the default soul debate shape.
#[allow(dead_code)] // Rules-free entry point
pub fn validate_shape(value: &Value) -> Vec<ValidationIssue> {
    validate_shape_with(value, &ShapeRules::default())
}

/// Validate a record against the given rules.
pub fn validate_shape_with(value: &Value, rules: &ShapeRules) -> Vec<ValidationIssue> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            let err = ShapeError::NotAnObject(json_type_name(value));
            return vec![ValidationIssue::error("", err.to_string())];
        }
    };

    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for field in &rules.required_fields {
        if seen.insert(field.as_str()) && !obj.contains_key(field) {
            issues.push(ValidationIssue::error(
                field.as_str(),
                format!("missing required field '{}'", field),
            ));
        }
    }

    for field in ["session_id", "model", "text", "branch"] {
        expect_string(obj, field, &mut issues);
    }

    if let Some(ts) = obj.get("timestamp") {
        match ts.as_str() {
            Some(s) if parse_timestamp(s).is_none() => issues.push(ValidationIssue::warning(
                "timestamp",
                format!("'{}' is not an ISO-8601 timestamp", s),
            )),
            Some(_) => {}
            None => issues.push(type_error("timestamp", "a string", ts)),
        }
    }

    for field in ["seed", "violations", "tokens"] {
        if let Some(v) = obj.get(field) {
            if v.as_u64().is_none() {
                let expected = if v.as_i64().is_some() {
                    "a non-negative integer"
                } else {
                    "an integer"
                };
                issues.push(type_error(field, expected, v));
            }
        }
    }

    for field in ["entropy", "mutual_information"] {
        if let Some(v) = obj.get(field) {
            match v.as_f64() {
                Some(n) if n < 0.0 => issues.push(ValidationIssue::warning(
                    field,
                    format!("value {} is negative", n),
                )),
                Some(_) => {}
                None => issues.push(type_error(field, "a number", v)),
            }
        }
    }

    if let Some(spikes) = obj.get("spikes") {
        match spikes.as_array() {
            Some(items) => {
                for (i, spike) in items.iter().enumerate() {
                    validate_spike(i, spike, rules, &mut issues);
                }
            }
            None => issues.push(type_error("spikes", "an array", spikes)),
        }
    }

    issues
}

fn validate_spike(index: usize, spike: &Value, rules: &ShapeRules, issues: &mut Vec<ValidationIssue>) {
    let base = format!("spikes[{}]", index);
    let obj = match spike.as_object() {
        Some(obj) => obj,
        None => {
            issues.push(type_error(&base, "an object", spike));
            return;
        }
    };

    for field in ["term", "context"] {
        let path = format!("{}.{}", base, field);
        match obj.get(field) {
            None => issues.push(ValidationIssue::error(
                path,
                format!("missing required spike field '{}'", field),
            )),
            Some(v) if !v.is_string() => issues.push(type_error(&path, "a string", v)),
            Some(_) => {}
        }
    }

    let path = format!("{}.intensity", base);
    match obj.get("intensity") {
        None => issues.push(ValidationIssue::error(
            path,
            "missing required spike field 'intensity'",
        )),
        Some(v) => match v.as_f64() {
            Some(n) => {
                let (lo, hi) = rules.intensity_range;
                if !(lo..=hi).contains(&n) {
                    issues.push(ValidationIssue::warning(
                        path,
                        format!("intensity {} outside [{}, {}]", n, lo, hi),
                    ));
                }
            }
            None => issues.push(type_error(&path, "a number", v)),
        },
    }
}

fn expect_string(obj: &Map<String, Value>, field: &str, issues: &mut Vec<ValidationIssue>) {
    if let Some(v) = obj.get(field) {
        if !v.is_string() {
            issues.push(type_error(field, "a string", v));
        }
    }
}

fn type_error(path: &str, expected: &str, found: &Value) -> ValidationIssue {
    ValidationIssue::error(
        path,
        format!("expected {}, found {}", expected, json_type_name(found)),
    )
}

/// Count the error-level issues.
pub fn error_count(issues: &[ValidationIssue]) -> usize {
    issues.iter().filter(|i| i.is_error()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_record() -> Value {
        json!({
            "timestamp": "2025-07-01T12:00:00Z",
            "session_id": "debate-1",
            "model": "grok-4",
            "seed": 7,
            "violations": 0,
            "tokens": 300,
            "entropy": 0.9,
            "mutual_information": 0.4,
            "spikes": [{"term": "ache", "intensity": 0.6, "context": "deep ache"}],
            "text": "a turn"
        })
    }

    #[test]
    fn test_valid_record_has_no_issues() {
        assert!(validate_shape(&valid_record()).is_empty());
    }

    #[test]
    fn test_empty_object_names_every_field_once() {
        let issues = validate_shape(&json!({}));
        assert_eq!(issues.len(), DEFAULT_REQUIRED_FIELDS.len());

        for field in DEFAULT_REQUIRED_FIELDS {
            let hits = issues
                .iter()
                .filter(|i| i.message.contains(&format!("'{}'", field)))
                .count();
            assert_eq!(hits, 1, "field {} reported {} times", field, hits);
        }
        assert!(issues.iter().all(ValidationIssue::is_error));
    }

    #[test]
    fn test_duplicate_required_fields_reported_once() {
        let rules = ShapeRules {
            required_fields: vec!["model".into(), "model".into()],
            ..Default::default()
        };
        assert_eq!(validate_shape_with(&json!({}), &rules).len(), 1);
    }

    #[test]
    fn test_non_object_is_single_error() {
        let issues = validate_shape(&json!("not a record"));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
        assert!(issues[0].message.contains("string"));
    }

    #[test]
    fn test_out_of_range_intensity_is_warning() {
        let mut record = valid_record();
        record["spikes"][0]["intensity"] = json!(1.4);

        let issues = validate_shape(&record);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, IssueLevel::Warning);
        assert_eq!(issues[0].path, "spikes[0].intensity");
        assert!(ValidationPolicy::Strict.accepts(&issues));
    }

    #[test]
    fn test_spike_sub_shape() {
        let mut record = valid_record();
        record["spikes"] = json!([{"term": 3, "intensity": "x"}, "bad"]);

        let issues = validate_shape(&record);
        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"spikes[0].term"));
        assert!(paths.contains(&"spikes[0].context"));
        assert!(paths.contains(&"spikes[0].intensity"));
        assert!(paths.contains(&"spikes[1]"));
        assert_eq!(error_count(&issues), 4);
    }

    #[test]
    fn test_type_errors() {
        let mut record = valid_record();
        record["tokens"] = json!(-5);
        record["seed"] = json!(1.5);
        record["entropy"] = json!("high");
        record["spikes"] = json!({});

        let issues = validate_shape(&record);
        assert_eq!(error_count(&issues), 4);
        assert!(issues
            .iter()
            .any(|i| i.path == "tokens" && i.message.contains("non-negative")));
    }

    #[test]
    fn test_advisory_warnings() {
        let mut record = valid_record();
        record["timestamp"] = json!("yesterday");
        record["mutual_information"] = json!(-0.1);

        let issues = validate_shape(&record);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.level == IssueLevel::Warning));
    }

    #[test]
    fn test_policy() {
        let issues = validate_shape(&json!({}));
        assert!(!ValidationPolicy::Strict.accepts(&issues));
        assert!(ValidationPolicy::Lenient.accepts(&issues));
        assert!(ValidationPolicy::Strict.accepts(&[]));
    }
}
