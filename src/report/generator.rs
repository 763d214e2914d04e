//! Report rendering.
//!
//! JSON output is the serialized report types; text output is a short
//! human-readable summary of the same data.

use crate::analysis::compare::{ComparisonSet, LogComparison};
use crate::cli::OutputFormat;
use crate::models::{
    AggregateDocument, GlobalStats, LoadSummary, MeanStats, ModelStats, SessionStats,
    SpikeTermStats, TrendReport,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Serialize any report as pretty-printed JSON.
pub fn generate_json_report<T: Serialize>(report: &T) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render an aggregate document in the requested format.
pub fn render_aggregate(doc: &AggregateDocument, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => generate_json_report(doc),
        OutputFormat::Text => Ok(generate_aggregate_text(doc)),
    }
}

/// Render a trend report in the requested format.
pub fn render_trend(trend: &TrendReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => generate_json_report(trend),
        OutputFormat::Text => Ok(generate_trend_text(trend)),
    }
}

/// Render a validation summary in the requested format.
pub fn render_validation(summary: &LoadSummary, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => generate_json_report(summary),
        OutputFormat::Text => Ok(generate_validation_text(summary)),
    }
}

/// Render pairwise comparisons, either in full or as one row per pair.
pub fn render_comparisons(
    set: &ComparisonSet,
    summary_only: bool,
    format: OutputFormat,
) -> Result<String> {
    match (format, summary_only) {
        (OutputFormat::Json, true) => generate_json_report(&set.summaries()),
        (OutputFormat::Json, false) => generate_json_report(set),
        (OutputFormat::Text, true) => Ok(generate_comparison_summary_text(set)),
        (OutputFormat::Text, false) => Ok(set
            .comparisons
            .iter()
            .map(generate_comparison_text)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// Write rendered output to `path`, or to stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
            if !content.ends_with('\n') {
                handle.write_all(b"\n").context("Failed to write to stdout")?;
            }
        }
    }
    Ok(())
}

/// Generate the text form of an aggregate document.
pub fn generate_aggregate_text(doc: &AggregateDocument) -> String {
    let mut output = String::new();

    output.push_str("Soul Log Aggregate\n");
    output.push_str("==================\n\n");
    output.push_str(&format!(
        "Generated: {}\n",
        doc.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Input: {}\n", doc.metadata.input_directory));
    output.push_str(&format!("Grouping: {}\n", doc.metadata.grouping));
    output.push_str(&format!("Records: {}\n", doc.metadata.load.headline()));
    output.push_str(&format!(
        "Duration: {:.2}s\n\n",
        doc.metadata.duration_seconds
    ));

    output.push_str(&generate_global_section(doc.total_count, &doc.global_stats));

    if let Some(ref by_model) = doc.by_model {
        output.push_str(&generate_model_section(by_model));
    }
    if let Some(ref by_session) = doc.by_session {
        output.push_str(&generate_session_section(by_session));
    }
    if let Some(ref by_term) = doc.by_spike_term {
        output.push_str(&generate_spike_term_section(by_term));
    }
    if let Some(ref trend) = doc.temporal_trends {
        output.push('\n');
        output.push_str(&generate_trend_text(trend));
    }

    output
}

fn format_mean_stats(stats: &MeanStats) -> String {
    format!(
        "mean {:.4}, min {:.4}, max {:.4} (n={})",
        stats.mean, stats.min, stats.max, stats.count
    )
}

fn generate_global_section(total: usize, stats: &GlobalStats) -> String {
    let mut section = String::new();

    section.push_str("Global\n------\n");
    section.push_str(&format!("Total records: {}\n", total));
    section.push_str(&format!("Unique sessions: {}\n", stats.unique_sessions));
    section.push_str(&format!("Unique models: {}\n", stats.unique_models));
    section.push_str(&format!("Entropy: {}\n", format_mean_stats(&stats.entropy)));
    section.push_str(&format!(
        "Mutual information: {}\n",
        format_mean_stats(&stats.mutual_information)
    ));
    section.push_str(&format!(
        "Tokens: total {}, mean {:.1}, min {}, max {}\n",
        stats.token_stats.total,
        stats.token_stats.mean,
        stats.token_stats.min,
        stats.token_stats.max
    ));
    section.push_str(&format!(
        "Violations: total {} in {} records\n",
        stats.violation_stats.total, stats.violation_stats.records_with_violations
    ));
    section.push_str(&format!(
        "Spikes: {} total, {} unique terms, avg intensity {:.3}, max {:.3}\n",
        stats.spike_stats.total_spikes,
        stats.spike_stats.unique_terms,
        stats.spike_stats.avg_intensity,
        stats.spike_stats.max_intensity
    ));

    if !stats.spike_stats.most_common_terms.is_empty() {
        let terms: Vec<String> = stats
            .spike_stats
            .most_common_terms
            .iter()
            .map(|t| format!("{} ({})", t.term, t.count))
            .collect();
        section.push_str(&format!("Most common terms: {}\n", terms.join(", ")));
    }
    section.push('\n');

    section
}

fn generate_model_section(by_model: &BTreeMap<String, ModelStats>) -> String {
    let mut section = String::new();

    section.push_str("By model\n--------\n");
    for (model, stats) in by_model {
        section.push_str(&format!(
            "{}: {} records, {} sessions, entropy {:.4}, MI {:.4}, tokens {}, violations {}, spikes {} ({} terms)\n",
            model,
            stats.count,
            stats.sessions.len(),
            stats.avg_entropy,
            stats.avg_mutual_information,
            stats.total_tokens,
            stats.total_violations,
            stats.total_spikes,
            stats.unique_spike_terms.len()
        ));
    }
    section.push('\n');

    section
}

fn generate_session_section(by_session: &BTreeMap<String, SessionStats>) -> String {
    let mut section = String::new();

    section.push_str("By session\n----------\n");
    for (session, stats) in by_session {
        let models: Vec<&str> = stats.models.iter().map(String::as_str).collect();
        let entropy: Vec<String> = stats
            .entropy_progression
            .iter()
            .map(|e| format!("{:.3}", e))
            .collect();
        let spikes: Vec<String> = stats
            .spike_progression
            .iter()
            .map(|s| s.spike_count.to_string())
            .collect();

        section.push_str(&format!(
            "{}: {} records, models [{}]\n",
            session,
            stats.count,
            models.join(", ")
        ));
        section.push_str(&format!("  entropy: {}\n", entropy.join(" -> ")));
        section.push_str(&format!("  spikes:  {}\n", spikes.join(" -> ")));
    }
    section.push('\n');

    section
}

fn generate_spike_term_section(by_term: &BTreeMap<String, SpikeTermStats>) -> String {
    let mut section = String::new();

    section.push_str("By spike term\n-------------\n");
    for (term, stats) in by_term {
        section.push_str(&format!(
            "{}: {} occurrences, intensity avg {:.3} [{:.3}, {:.3}], {} contexts\n",
            term,
            stats.occurrence_count,
            stats.avg_intensity,
            stats.min_intensity,
            stats.max_intensity,
            stats.unique_contexts.len()
        ));
    }
    section.push('\n');

    section
}

/// Generate the text form of a trend report.
pub fn generate_trend_text(trend: &TrendReport) -> String {
    let mut output = String::new();

    output.push_str("Temporal trend\n--------------\n");
    output.push_str(&format!("Timestamped records: {}\n", trend.total_records));
    output.push_str(&format!(
        "Span: {} .. {}\n",
        trend.time_span.start.as_deref().unwrap_or("-"),
        trend.time_span.end.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!("Entropy trend: {:+.4}\n", trend.entropy_trend));
    output.push_str(&format!("MI trend: {:+.4}\n", trend.mi_trend));
    output.push_str(&format!(
        "Spike count trend: {:+.4}\n",
        trend.spike_count_trend
    ));

    for point in &trend.temporal_data {
        output.push_str(&format!(
            "  {}  entropy {:.4}  MI {:.4}  spikes {}\n",
            point.timestamp, point.entropy, point.mutual_information, point.spike_count
        ));
    }

    output
}

/// Generate the text form of a validation summary.
pub fn generate_validation_text(summary: &LoadSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("Files found: {}\n", summary.files_found));
    output.push_str(&format!("{}\n", summary.headline()));

    if !summary.diagnostics.is_empty() {
        output.push_str("\nDiagnostics:\n");
        for diag in &summary.diagnostics {
            output.push_str(&format!("  {}: {}\n", diag.file, diag.message));
        }
    }

    output
}

fn format_percent(change: Option<f64>) -> String {
    match change {
        Some(pct) => format!("{:+.1}%", pct),
        None => "n/a".to_string(),
    }
}

/// Generate the text form of a single comparison.
pub fn generate_comparison_text(comparison: &LogComparison) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} vs {}\n",
        comparison.first_label, comparison.second_label
    ));
    output.push_str(&format!(
        "  sessions: {} / {}\n  models:   {} / {}\n",
        comparison.first_session_id,
        comparison.second_session_id,
        comparison.first_model,
        comparison.second_model
    ));

    for (name, delta) in &comparison.metrics {
        output.push_str(&format!(
            "  {}: {} -> {} ({:+}, {})\n",
            name,
            delta.first,
            delta.second,
            delta.difference,
            format_percent(delta.percent_change)
        ));
    }

    let spikes = &comparison.spikes;
    output.push_str(&format!(
        "  spikes: {} -> {} ({:+})\n",
        spikes.total_spikes_first, spikes.total_spikes_second, spikes.spike_count_difference
    ));
    if !spikes.common_terms.is_empty() {
        let common: Vec<&str> = spikes.common_terms.iter().map(String::as_str).collect();
        output.push_str(&format!("  common terms: {}\n", common.join(", ")));
    }
    output.push_str(&format!(
        "  text similarity: {:.3}\n",
        comparison.text.jaccard_similarity
    ));

    for line in &comparison.assessment {
        output.push_str(&format!("  * {}\n", line));
    }

    output
}

fn generate_comparison_summary_text(set: &ComparisonSet) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} files, {} comparisons\n",
        set.files.len(),
        set.total_comparisons
    ));
    for row in set.summaries() {
        output.push_str(&format!(
            "{} vs {}: entropy {}, MI {}, spikes {:+}, similarity {:.3}\n",
            row.first,
            row.second,
            format_percent(row.entropy_change),
            format_percent(row.mi_change),
            row.spike_difference,
            row.text_similarity
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::analysis::{compare_all, temporal_trend};
    use crate::models::{LogRecord, ReportMetadata, SpikeEvent};
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(session: &str, model: &str, ts: &str, entropy: f64) -> LogRecord {
        LogRecord {
            timestamp: Some(ts.to_string()),
            session_id: session.to_string(),
            model: model.to_string(),
            entropy: Some(entropy),
            mutual_information: Some(0.5),
            tokens: 100,
            spikes: vec![SpikeEvent::new("freedom", 0.8, "ctx")],
            text: "the soul speaks".to_string(),
            ..Default::default()
        }
    }

    fn create_test_document() -> AggregateDocument {
        let records = vec![
            record("s1", "grok-4", "2025-07-01T12:00:00Z", 0.8),
            record("s1", "grok-4", "2025-07-01T13:00:00Z", 0.9),
        ];
        let metadata = ReportMetadata {
            generated_at: Utc::now(),
            input_directory: "logs".to_string(),
            grouping: "all".to_string(),
            load: LoadSummary {
                files_found: 2,
                valid_records: 2,
                ..Default::default()
            },
            duration_seconds: 0.1,
        };
        AggregateDocument::new(
            metadata,
            aggregate(&records),
            true,
            true,
            true,
            Some(temporal_trend(&records)),
        )
    }

    #[test]
    fn test_generate_aggregate_text() {
        let text = generate_aggregate_text(&create_test_document());

        assert!(text.contains("Soul Log Aggregate"));
        assert!(text.contains("2 valid / 0 invalid"));
        assert!(text.contains("By model"));
        assert!(text.contains("grok-4: 2 records"));
        assert!(text.contains("By spike term"));
        assert!(text.contains("freedom (2)"));
        assert!(text.contains("Temporal trend"));
    }

    #[test]
    fn test_json_omits_unrequested_groupings() {
        let mut doc = create_test_document();
        doc.by_session = None;
        doc.temporal_trends = None;

        let json = render_aggregate(&doc, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["total_count"], 2);
        assert!(value.get("by_model").is_some());
        assert!(value.get("by_session").is_none());
        assert!(value.get("temporal_trends").is_none());
        assert_eq!(value["metadata"]["load"]["valid_records"], 2);
    }

    #[test]
    fn test_trend_text_signs() {
        let records = vec![
            record("s1", "m", "2025-07-01T12:00:00Z", 0.9),
            record("s1", "m", "2025-07-01T13:00:00Z", 0.7),
        ];
        let text = generate_trend_text(&temporal_trend(&records));

        assert!(text.contains("Timestamped records: 2"));
        assert!(text.contains("Entropy trend: -0.2000"));
    }

    #[test]
    fn test_validation_text_lists_diagnostics() {
        let mut summary = LoadSummary {
            files_found: 3,
            valid_records: 1,
            invalid_records: 1,
            parse_errors: 1,
            ..Default::default()
        };
        summary.diagnostics.push(crate::models::Diagnostic {
            file: "bad.json".to_string(),
            message: "invalid JSON".to_string(),
        });

        let text = generate_validation_text(&summary);
        assert!(text.contains("1 valid / 1 invalid"));
        assert!(text.contains("bad.json: invalid JSON"));
    }

    #[test]
    fn test_comparison_renderers() {
        let set = compare_all(&[
            (
                "a.json".to_string(),
                record("s1", "m", "2025-07-01T12:00:00Z", 0.5),
            ),
            (
                "b.json".to_string(),
                record("s2", "m", "2025-07-01T13:00:00Z", 1.0),
            ),
        ]);

        let full = render_comparisons(&set, false, OutputFormat::Text).unwrap();
        assert!(full.contains("a.json vs b.json"));
        assert!(full.contains("entropy: 0.5 -> 1 (+0.5, +100.0%)"));

        let summary = render_comparisons(&set, true, OutputFormat::Text).unwrap();
        assert!(summary.contains("2 files, 1 comparisons"));

        let json = render_comparisons(&set, true, OutputFormat::Json).unwrap();
        let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(rows.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_write_output_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");

        write_output("{}", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
