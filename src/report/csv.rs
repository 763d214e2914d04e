//! Flattened per-record CSV export.

use crate::models::LogRecord;

/// Column order of the export.
pub const CSV_COLUMNS: [&str; 15] = [
    "timestamp",
    "session_id",
    "branch",
    "model",
    "seed",
    "violations",
    "tokens",
    "spike_count",
    "spike_terms",
    "spike_intensities",
    "spike_contexts",
    "entropy",
    "mutual_information",
    "text_length",
    "source_file",
];

const LIST_SEPARATOR: &str = "|";

/// Quote a cell when it holds a delimiter, quote or line break.
fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn optional_float(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Flatten one record into its cells, in [`CSV_COLUMNS`] order.
pub fn record_row(record: &LogRecord) -> Vec<String> {
    let intensities: Vec<String> = record
        .spikes
        .iter()
        .map(|s| s.intensity.to_string())
        .collect();
    let contexts: Vec<&str> = record.spikes.iter().map(|s| s.context.as_str()).collect();

    vec![
        record.timestamp.clone().unwrap_or_default(),
        record.session_id.clone(),
        record.branch.clone().unwrap_or_default(),
        record.model.clone(),
        record.seed.to_string(),
        record.violations.to_string(),
        record.tokens.to_string(),
        record.spike_count().to_string(),
        record.spike_terms().join(LIST_SEPARATOR),
        intensities.join(LIST_SEPARATOR),
        contexts.join(LIST_SEPARATOR),
        optional_float(record.entropy),
        optional_float(record.mutual_information),
        record.text.chars().count().to_string(),
        record.source.clone().unwrap_or_default(),
    ]
}

/// Render records as CSV with a header row.
pub fn generate_csv(records: &[LogRecord]) -> String {
    let mut output = String::new();

    output.push_str(&CSV_COLUMNS.join(","));
    output.push_str("\r\n");

    for record in records {
        let cells: Vec<String> = record_row(record)
            .iter()
            .map(|cell| escape_cell(cell))
            .collect();
        output.push_str(&cells.join(","));
        output.push_str("\r\n");
    }

    output
}
