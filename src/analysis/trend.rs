//! Timestamp ordering and the endpoint trend estimator.

use crate::models::{LogRecord, TimeSpan, TrendPoint, TrendReport};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse an ISO-8601 timestamp. Offsets are honoured; naive timestamps are
/// read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive local time, with or without a trailing "Z".
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Key that orders timestamps chronologically.
///
/// Parseable timestamps are normalized to a fixed-width UTC string so that
/// lexicographic order equals chronological order. Anything else falls back
/// to its raw text. A missing timestamp sorts first.
pub fn timestamp_sort_key(raw: Option<&str>) -> String {
    match raw {
        None => String::new(),
        Some(raw) => match parse_timestamp(raw) {
            Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string(),
            None => raw.to_string(),
        },
    }
}

/// Endpoint slope: `(last - first) / (n - 1)`, or `0` for fewer than two values.
pub fn endpoint_slope(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() > 1 => {
            (last - first) / (values.len() - 1) as f64
        }
        _ => 0.0,
    }
}

/// Compute the naive temporal trend of a batch.
///
/// Records without a timestamp are left out. The rest are sorted by
/// [`timestamp_sort_key`], ties keeping input order, and each series is
/// reduced to its endpoint slope.
pub fn temporal_trend(records: &[LogRecord]) -> TrendReport {
    let mut timed: Vec<(String, &LogRecord, &str)> = records
        .iter()
        .filter_map(|r| {
            r.timestamp
                .as_deref()
                .map(|ts| (timestamp_sort_key(Some(ts)), r, ts))
        })
        .collect();
    timed.sort_by(|a, b| a.0.cmp(&b.0));

    let temporal_data: Vec<TrendPoint> = timed
        .iter()
        .map(|(_, record, ts)| TrendPoint {
            timestamp: ts.to_string(),
            entropy: record.entropy_or_zero(),
            mutual_information: record.mutual_information_or_zero(),
            spike_count: record.spike_count(),
        })
        .collect();

    let entropies: Vec<f64> = temporal_data.iter().map(|p| p.entropy).collect();
    let mi_values: Vec<f64> = temporal_data.iter().map(|p| p.mutual_information).collect();
    let spike_counts: Vec<f64> = temporal_data.iter().map(|p| p.spike_count as f64).collect();

    TrendReport {
        total_records: temporal_data.len(),
        time_span: TimeSpan {
            start: temporal_data.first().map(|p| p.timestamp.clone()),
            end: temporal_data.last().map(|p| p.timestamp.clone()),
        },
        entropy_trend: endpoint_slope(&entropies),
        mi_trend: endpoint_slope(&mi_values),
        spike_count_trend: endpoint_slope(&spike_counts),
        temporal_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpikeEvent;

    fn record(ts: Option<&str>, entropy: f64, mi: f64, spikes: usize) -> LogRecord {
        LogRecord {
            timestamp: ts.map(str::to_string),
            entropy: Some(entropy),
            mutual_information: Some(mi),
            spikes: (0..spikes).map(|_| SpikeEvent::new("ache", 0.5, "")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-07-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2025-07-01T12:00:00.123456Z").is_some());
        assert!(parse_timestamp("2025-07-01T14:00:00+02:00").is_some());
        assert!(parse_timestamp("2025-07-01T12:00:00").is_some());
        assert!(parse_timestamp("2025-07-01").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn test_sort_key_normalizes_offsets() {
        let utc = timestamp_sort_key(Some("2025-07-01T12:00:00Z"));
        let offset = timestamp_sort_key(Some("2025-07-01T14:00:00+02:00"));
        assert_eq!(utc, offset);
        assert!(timestamp_sort_key(None) < utc);
        assert_eq!(timestamp_sort_key(Some("garbage")), "garbage");
    }

    #[test]
    fn test_single_record_has_zero_trend() {
        let report = temporal_trend(&[record(Some("2025-01-01T00:00:00Z"), 3.0, 1.0, 4)]);
        assert_eq!(report.total_records, 1);
        assert_eq!(report.entropy_trend, 0.0);
        assert_eq!(report.mi_trend, 0.0);
        assert_eq!(report.spike_count_trend, 0.0);
    }

    #[test]
    fn test_empty_input() {
        let report = temporal_trend(&[]);
        assert_eq!(report.total_records, 0);
        assert_eq!(report.time_span, TimeSpan::default());
        assert_eq!(report.entropy_trend, 0.0);
    }

    #[test]
    fn test_endpoint_trend_ignores_middle_values() {
        // Out of order on input; the middle value would pull a regression.
        let records = vec![
            record(Some("2025-01-03T00:00:00Z"), 3.0, 0.5, 4),
            record(Some("2025-01-01T00:00:00Z"), 1.0, 0.25, 0),
            record(Some("2025-01-02T00:00:00Z"), 10.0, 9.0, 9),
        ];

        let report = temporal_trend(&records);
        assert_eq!(report.total_records, 3);
        assert_eq!(report.entropy_trend, 1.0);
        assert_eq!(report.mi_trend, 0.125);
        assert_eq!(report.spike_count_trend, 2.0);
        assert_eq!(report.time_span.start.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(report.time_span.end.as_deref(), Some("2025-01-03T00:00:00Z"));
    }

    #[test]
    fn test_records_without_timestamp_are_excluded() {
        let records = vec![
            record(None, 100.0, 100.0, 100),
            record(Some("2025-01-01T00:00:00Z"), 1.0, 0.0, 0),
            record(Some("2025-01-02T00:00:00Z"), 2.0, 0.0, 0),
        ];

        let report = temporal_trend(&records);
        assert_eq!(report.total_records, 2);
        assert_eq!(report.entropy_trend, 1.0);
    }

    #[test]
    fn test_endpoint_slope() {
        assert_eq!(endpoint_slope(&[]), 0.0);
        assert_eq!(endpoint_slope(&[5.0]), 0.0);
        assert_eq!(endpoint_slope(&[1.0, 7.0, 4.0]), 1.5);
    }
}
