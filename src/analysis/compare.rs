//! Pairwise comparison of individual log records.

use crate::models::LogRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Relative change above which a metric shift is called out, in percent.
const SIGNIFICANT_CHANGE_PCT: f64 = 10.0;

/// Change of one scalar metric between two records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub first: f64,
    pub second: f64,
    pub difference: f64,
    /// `None` when the first value is zero and the second is not.
    pub percent_change: Option<f64>,
}

impl MetricDelta {
    pub fn new(first: f64, second: f64) -> Self {
        let difference = second - first;
        let percent_change = if first != 0.0 {
            Some(difference / first * 100.0)
        } else if second != 0.0 {
            None
        } else {
            Some(0.0)
        };

        Self {
            first,
            second,
            difference,
            percent_change,
        }
    }

    fn is_significant(&self) -> bool {
        self.percent_change
            .map_or(true, |pct| pct.abs() > SIGNIFICANT_CHANGE_PCT)
    }

    fn describe_change(&self) -> String {
        match self.percent_change {
            Some(pct) => format!("{:.1}%", pct),
            None => "from zero".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityDelta {
    pub avg_intensity_first: f64,
    pub avg_intensity_second: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeComparison {
    pub total_spikes_first: usize,
    pub total_spikes_second: usize,
    pub spike_count_difference: i64,
    pub common_terms: BTreeSet<String>,
    pub unique_to_first: BTreeSet<String>,
    pub unique_to_second: BTreeSet<String>,
    pub intensity_comparisons: BTreeMap<String, IntensityDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextComparison {
    pub first_length: usize,
    pub second_length: usize,
    pub length_difference: i64,
    pub first_word_count: usize,
    pub second_word_count: usize,
    pub common_words: usize,
    pub unique_to_first: usize,
    pub unique_to_second: usize,
    pub jaccard_similarity: f64,
}

/// Full comparison of two records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogComparison {
    pub first_label: String,
    pub second_label: String,
    pub first_session_id: String,
    pub second_session_id: String,
    pub first_model: String,
    pub second_model: String,
    pub metrics: BTreeMap<String, MetricDelta>,
    pub spikes: SpikeComparison,
    pub text: TextComparison,
    pub assessment: Vec<String>,
}

/// Condensed view of a comparison, used by `compare --summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub first: String,
    pub second: String,
    pub entropy_change: Option<f64>,
    pub mi_change: Option<f64>,
    pub spike_difference: i64,
    pub text_similarity: f64,
}

impl From<&LogComparison> for ComparisonSummary {
    fn from(c: &LogComparison) -> Self {
        Self {
            first: c.first_label.clone(),
            second: c.second_label.clone(),
            entropy_change: c.metrics.get("entropy").and_then(|m| m.percent_change),
            mi_change: c
                .metrics
                .get("mutual_information")
                .and_then(|m| m.percent_change),
            spike_difference: c.spikes.spike_count_difference,
            text_similarity: c.text.jaccard_similarity,
        }
    }
}

/// Every pairwise comparison of a set of records, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSet {
    pub files: Vec<String>,
    pub total_comparisons: usize,
    pub comparisons: Vec<LogComparison>,
}

impl ComparisonSet {
    pub fn summaries(&self) -> Vec<ComparisonSummary> {
        self.comparisons.iter().map(ComparisonSummary::from).collect()
    }
}

/// Compare two records.
pub fn compare(
    first: &LogRecord,
    second: &LogRecord,
    first_label: &str,
    second_label: &str,
) -> LogComparison {
    let mut metrics = BTreeMap::new();
    metrics.insert(
        "entropy".to_string(),
        MetricDelta::new(first.entropy_or_zero(), second.entropy_or_zero()),
    );
    metrics.insert(
        "mutual_information".to_string(),
        MetricDelta::new(
            first.mutual_information_or_zero(),
            second.mutual_information_or_zero(),
        ),
    );
    metrics.insert(
        "tokens".to_string(),
        MetricDelta::new(first.tokens as f64, second.tokens as f64),
    );
    metrics.insert(
        "violations".to_string(),
        MetricDelta::new(first.violations as f64, second.violations as f64),
    );
    metrics.insert(
        "seed".to_string(),
        MetricDelta::new(first.seed as f64, second.seed as f64),
    );

    let spikes = compare_spikes(first, second);
    let text = compare_text(&first.text, &second.text);
    let assessment = assess(&metrics, &spikes);

    LogComparison {
        first_label: first_label.to_string(),
        second_label: second_label.to_string(),
        first_session_id: first.session_id.clone(),
        second_session_id: second.session_id.clone(),
        first_model: first.model.clone(),
        second_model: second.model.clone(),
        metrics,
        spikes,
        text,
        assessment,
    }
}

/// Compare every pair `(i, j)` with `i < j`.
pub fn compare_all(records: &[(String, LogRecord)]) -> ComparisonSet {
    let mut comparisons = Vec::new();
    for (i, (label_a, a)) in records.iter().enumerate() {
        for (label_b, b) in &records[i + 1..] {
            comparisons.push(compare(a, b, label_a, label_b));
        }
    }

    ComparisonSet {
        files: records.iter().map(|(label, _)| label.clone()).collect(),
        total_comparisons: comparisons.len(),
        comparisons,
    }
}

fn compare_spikes(first: &LogRecord, second: &LogRecord) -> SpikeComparison {
    let terms_first: BTreeSet<String> = first.spikes.iter().map(|s| s.term.clone()).collect();
    let terms_second: BTreeSet<String> = second.spikes.iter().map(|s| s.term.clone()).collect();

    let common_terms: BTreeSet<String> =
        terms_first.intersection(&terms_second).cloned().collect();

    let intensity_comparisons = common_terms
        .iter()
        .map(|term| {
            let a = mean_intensity(first, term);
            let b = mean_intensity(second, term);
            (
                term.clone(),
                IntensityDelta {
                    avg_intensity_first: a,
                    avg_intensity_second: b,
                    difference: b - a,
                },
            )
        })
        .collect();

    SpikeComparison {
        total_spikes_first: first.spike_count(),
        total_spikes_second: second.spike_count(),
        spike_count_difference: second.spike_count() as i64 - first.spike_count() as i64,
        unique_to_first: terms_first.difference(&terms_second).cloned().collect(),
        unique_to_second: terms_second.difference(&terms_first).cloned().collect(),
        common_terms,
        intensity_comparisons,
    }
}

fn mean_intensity(record: &LogRecord, term: &str) -> f64 {
    let values: Vec<f64> = record
        .spikes
        .iter()
        .filter(|s| s.term == term)
        .map(|s| s.intensity)
        .collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn compare_text(first: &str, second: &str) -> TextComparison {
    let words_first: BTreeSet<String> = first.split_whitespace().map(str::to_lowercase).collect();
    let words_second: BTreeSet<String> = second.split_whitespace().map(str::to_lowercase).collect();

    let common = words_first.intersection(&words_second).count();
    let union = words_first.union(&words_second).count();

    TextComparison {
        first_length: first.chars().count(),
        second_length: second.chars().count(),
        length_difference: second.chars().count() as i64 - first.chars().count() as i64,
        first_word_count: words_first.len(),
        second_word_count: words_second.len(),
        common_words: common,
        unique_to_first: words_first.len() - common,
        unique_to_second: words_second.len() - common,
        jaccard_similarity: if union == 0 {
            0.0
        } else {
            common as f64 / union as f64
        },
    }
}

fn assess(metrics: &BTreeMap<String, MetricDelta>, spikes: &SpikeComparison) -> Vec<String> {
    let mut notes = Vec::new();

    if let Some(entropy) = metrics.get("entropy").filter(|m| m.is_significant()) {
        notes.push(format!(
            "Significant entropy change: {}",
            entropy.describe_change()
        ));
    }
    if let Some(mi) = metrics
        .get("mutual_information")
        .filter(|m| m.is_significant())
    {
        notes.push(format!("Significant MI change: {}", mi.describe_change()));
    }
    if spikes.spike_count_difference != 0 {
        notes.push(format!(
            "Spike count changed by {}",
            spikes.spike_count_difference
        ));
    }

    if notes.is_empty() {
        notes.push("Logs are relatively similar".to_string());
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpikeEvent;

    fn record(entropy: f64, mi: f64, spikes: Vec<SpikeEvent>, text: &str) -> LogRecord {
        LogRecord {
            entropy: Some(entropy),
            mutual_information: Some(mi),
            spikes,
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_metric_delta() {
        let d = MetricDelta::new(2.0, 3.0);
        assert_eq!(d.difference, 1.0);
        assert_eq!(d.percent_change, Some(50.0));

        assert_eq!(MetricDelta::new(0.0, 0.0).percent_change, Some(0.0));
        assert_eq!(MetricDelta::new(0.0, 1.0).percent_change, None);
    }

    #[test]
    fn test_identical_records_are_similar() {
        let a = record(1.0, 0.5, vec![SpikeEvent::new("ache", 0.5, "")], "same words");
        let cmp = compare(&a, &a, "a", "b");

        assert_eq!(cmp.assessment, vec!["Logs are relatively similar"]);
        assert_eq!(cmp.text.jaccard_similarity, 1.0);
        assert_eq!(cmp.spikes.spike_count_difference, 0);
    }

    #[test]
    fn test_spike_and_text_differences() {
        let a = record(
            1.0,
            0.5,
            vec![
                SpikeEvent::new("ache", 0.25, ""),
                SpikeEvent::new("ache", 0.75, ""),
                SpikeEvent::new("void", 0.5, ""),
            ],
            "The ache returns",
        );
        let b = record(
            2.0,
            0.5,
            vec![
                SpikeEvent::new("ache", 1.0, ""),
                SpikeEvent::new("erosion", 0.5, ""),
            ],
            "the erosion returns",
        );

        let cmp = compare(&a, &b, "a.json", "b.json");
        assert_eq!(cmp.spikes.spike_count_difference, -1);
        assert!(cmp.spikes.common_terms.contains("ache"));
        assert!(cmp.spikes.unique_to_first.contains("void"));
        assert!(cmp.spikes.unique_to_second.contains("erosion"));
        assert_eq!(cmp.spikes.intensity_comparisons["ache"].difference, 0.5);

        assert_eq!(cmp.text.common_words, 2);
        assert_eq!(cmp.text.jaccard_similarity, 0.5);

        assert_eq!(
            cmp.assessment,
            vec!["Significant entropy change: 100.0%", "Spike count changed by -1"]
        );
    }

    #[test]
    fn test_empty_texts() {
        let a = record(0.0, 0.0, vec![], "");
        let cmp = compare(&a, &a, "a", "b");
        assert_eq!(cmp.text.jaccard_similarity, 0.0);
    }

    #[test]
    fn test_compare_all_pairs() {
        let records: Vec<(String, LogRecord)> = (0..4)
            .map(|i| (format!("{}.json", i), record(i as f64, 0.0, vec![], "")))
            .collect();

        let set = compare_all(&records);
        assert_eq!(set.total_comparisons, 6);
        assert_eq!(set.comparisons[0].first_label, "0.json");
        assert_eq!(set.comparisons[0].second_label, "1.json");
        assert_eq!(set.comparisons[5].first_label, "2.json");

        let summary = set.summaries();
        assert_eq!(summary.len(), 6);
        assert_eq!(summary[0].entropy_change, None);
    }
}
