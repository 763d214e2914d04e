//! Grouped statistics over log records.
//!
//! [`Aggregator`] keeps sums, counts and extrema rather than averages, so two
//! accumulators built from consecutive slices of a batch can be merged and
//! still produce the same report as one pass over the whole batch.

use crate::analysis::trend::timestamp_sort_key;
use crate::models::{
    AggregateReport, GlobalStats, LogRecord, MeanStats, ModelStats, SessionStats, SpikeSnapshot,
    SpikeSummary, SpikeTermStats, TermCount, TokenStats, ViolationStats,
};
use std::collections::{BTreeMap, BTreeSet};
use tokio::task::JoinError;
use tracing::debug;

/// Number of terms listed in `most_common_terms` by default.
pub const DEFAULT_TOP_TERMS: usize = 10;

/// Running count, sum and extrema of a float series.
#[derive(Debug, Clone, Default)]
struct Moments {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Moments {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn merge(&mut self, other: &Moments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn stats(&self) -> MeanStats {
        MeanStats {
            count: self.count,
            mean: self.mean(),
            min: self.min,
            max: self.max,
        }
    }
}

/// Same as [`Moments`] for unsigned counters.
#[derive(Debug, Clone, Default)]
struct Tally {
    count: usize,
    total: u64,
    min: u64,
    max: u64,
}

impl Tally {
    fn push(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total = self.total.saturating_add(value);
    }

    fn merge(&mut self, other: &Tally) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        self.count += other.count;
        self.total = self.total.saturating_add(other.total);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn stats(&self) -> TokenStats {
        TokenStats {
            total: self.total,
            mean: if self.count == 0 {
                0.0
            } else {
                self.total as f64 / self.count as f64
            },
            min: self.min,
            max: self.max,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ModelAcc {
    count: usize,
    entropy: Moments,
    mutual_information: Moments,
    total_tokens: u64,
    total_violations: u64,
    total_spikes: usize,
    terms: BTreeSet<String>,
    sessions: BTreeSet<String>,
    source_files: Vec<String>,
}

impl ModelAcc {
    fn merge(&mut self, other: ModelAcc) {
        self.count += other.count;
        self.entropy.merge(&other.entropy);
        self.mutual_information.merge(&other.mutual_information);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.total_violations = self.total_violations.saturating_add(other.total_violations);
        self.total_spikes += other.total_spikes;
        self.terms.extend(other.terms);
        self.sessions.extend(other.sessions);
        self.source_files.extend(other.source_files);
    }

    fn finish(self) -> ModelStats {
        ModelStats {
            count: self.count,
            avg_entropy: self.entropy.mean(),
            avg_mutual_information: self.mutual_information.mean(),
            total_tokens: self.total_tokens,
            total_violations: self.total_violations,
            total_spikes: self.total_spikes,
            unique_spike_terms: self.terms,
            sessions: self.sessions,
            source_files: self.source_files,
        }
    }
}

/// One record's contribution to its session, kept until the session is
/// sorted at the end.
#[derive(Debug, Clone)]
struct SessionEntry {
    sort_key: String,
    index: usize,
    timestamp: Option<String>,
    entropy: f64,
    mutual_information: f64,
    terms: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct SessionAcc {
    models: BTreeSet<String>,
    entries: Vec<SessionEntry>,
    total_tokens: u64,
    total_violations: u64,
    source_files: Vec<String>,
}

impl SessionAcc {
    fn merge(&mut self, other: SessionAcc, index_offset: usize) {
        self.models.extend(other.models);
        self.entries
            .extend(other.entries.into_iter().map(|mut e| {
                e.index += index_offset;
                e
            }));
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.total_violations = self.total_violations.saturating_add(other.total_violations);
        self.source_files.extend(other.source_files);
    }

    fn finish(mut self) -> SessionStats {
        self.entries
            .sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then(a.index.cmp(&b.index)));

        SessionStats {
            count: self.entries.len(),
            models: self.models,
            timestamps: self.entries.iter().map(|e| e.timestamp.clone()).collect(),
            entropy_progression: self.entries.iter().map(|e| e.entropy).collect(),
            mi_progression: self.entries.iter().map(|e| e.mutual_information).collect(),
            spike_progression: self
                .entries
                .into_iter()
                .map(|e| SpikeSnapshot {
                    timestamp: e.timestamp,
                    spike_count: e.terms.len(),
                    terms: e.terms,
                })
                .collect(),
            total_tokens: self.total_tokens,
            total_violations: self.total_violations,
            source_files: self.source_files,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TermAcc {
    /// Position of the first spike with this term across the batch.
    first_seen: usize,
    intensity: Moments,
    contexts: Vec<String>,
    sessions: BTreeSet<String>,
    models: BTreeSet<String>,
}

impl TermAcc {
    fn merge(&mut self, other: TermAcc) {
        self.intensity.merge(&other.intensity);
        self.contexts.extend(other.contexts);
        self.sessions.extend(other.sessions);
        self.models.extend(other.models);
    }

    fn finish(self) -> SpikeTermStats {
        SpikeTermStats {
            occurrence_count: self.intensity.count,
            avg_intensity: self.intensity.mean(),
            max_intensity: self.intensity.max,
            min_intensity: self.intensity.min,
            unique_contexts: self.contexts.iter().cloned().collect(),
            contexts: self.contexts,
            sessions: self.sessions,
            models: self.models,
        }
    }
}

/// Mergeable accumulator behind [`aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    top_terms: usize,
    records: usize,
    total_spikes: usize,
    models: BTreeMap<String, ModelAcc>,
    sessions: BTreeMap<String, SessionAcc>,
    terms: BTreeMap<String, TermAcc>,
    entropy: Moments,
    mutual_information: Moments,
    tokens: Tally,
    violations: u64,
    records_with_violations: usize,
    spike_intensity: Moments,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_TERMS)
    }
}

impl Aggregator {
    /// Create an empty accumulator listing `top_terms` most common terms.
    pub fn new(top_terms: usize) -> Self {
        Self {
            top_terms,
            records: 0,
            total_spikes: 0,
            models: BTreeMap::new(),
            sessions: BTreeMap::new(),
            terms: BTreeMap::new(),
            entropy: Moments::default(),
            mutual_information: Moments::default(),
            tokens: Tally::default(),
            violations: 0,
            records_with_violations: 0,
            spike_intensity: Moments::default(),
        }
    }

    /// Number of records pushed so far.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Add one record.
    pub fn push(&mut self, record: &LogRecord) {
        let index = self.records;
        self.records += 1;

        let model = self.models.entry(record.model.clone()).or_default();
        model.count += 1;
        if let Some(v) = record.entropy {
            model.entropy.push(v);
        }
        if let Some(v) = record.mutual_information {
            model.mutual_information.push(v);
        }
        model.total_tokens = model.total_tokens.saturating_add(record.tokens);
        model.total_violations = model.total_violations.saturating_add(record.violations);
        model.total_spikes += record.spike_count();
        model.terms.extend(record.spikes.iter().map(|s| s.term.clone()));
        model.sessions.insert(record.session_id.clone());
        if let Some(ref source) = record.source {
            model.source_files.push(source.clone());
        }

        let session = self.sessions.entry(record.session_id.clone()).or_default();
        session.models.insert(record.model.clone());
        session.entries.push(SessionEntry {
            sort_key: timestamp_sort_key(record.timestamp.as_deref()),
            index,
            timestamp: record.timestamp.clone(),
            entropy: record.entropy_or_zero(),
            mutual_information: record.mutual_information_or_zero(),
            terms: record.spike_terms(),
        });
        session.total_tokens = session.total_tokens.saturating_add(record.tokens);
        session.total_violations = session.total_violations.saturating_add(record.violations);
        if let Some(ref source) = record.source {
            session.source_files.push(source.clone());
        }

        for spike in &record.spikes {
            let position = self.total_spikes;
            self.total_spikes += 1;

            let term = self
                .terms
                .entry(spike.term.clone())
                .or_insert_with(|| TermAcc {
                    first_seen: position,
                    ..Default::default()
                });
            term.intensity.push(spike.intensity);
            term.contexts.push(spike.context.clone());
            term.sessions.insert(record.session_id.clone());
            term.models.insert(record.model.clone());

            self.spike_intensity.push(spike.intensity);
        }

        if let Some(v) = record.entropy {
            self.entropy.push(v);
        }
        if let Some(v) = record.mutual_information {
            self.mutual_information.push(v);
        }
        self.tokens.push(record.tokens);
        self.violations = self.violations.saturating_add(record.violations);
        if record.violations > 0 {
            self.records_with_violations += 1;
        }
    }

    /// Add every record of a slice, in order.
    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a LogRecord>) {
        for record in records {
            self.push(record);
        }
    }

    /// Fold in an accumulator built from the records that directly follow
    /// the ones already pushed.
    pub fn merge(&mut self, other: Aggregator) {
        let index_offset = self.records;
        let spike_offset = self.total_spikes;

        for (name, acc) in other.models {
            self.models.entry(name).or_default().merge(acc);
        }
        for (id, acc) in other.sessions {
            self.sessions.entry(id).or_default().merge(acc, index_offset);
        }
        for (term, mut acc) in other.terms {
            match self.terms.get_mut(&term) {
                Some(existing) => existing.merge(acc),
                None => {
                    acc.first_seen += spike_offset;
                    self.terms.insert(term, acc);
                }
            }
        }

        self.records += other.records;
        self.total_spikes += other.total_spikes;
        self.entropy.merge(&other.entropy);
        self.mutual_information.merge(&other.mutual_information);
        self.tokens.merge(&other.tokens);
        self.violations = self.violations.saturating_add(other.violations);
        self.records_with_violations += other.records_with_violations;
        self.spike_intensity.merge(&other.spike_intensity);
    }

    /// Derive the final report.
    pub fn finish(self) -> AggregateReport {
        let mut ranked: Vec<(&String, &TermAcc)> = self.terms.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.intensity
                .count
                .cmp(&a.1.intensity.count)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });
        let most_common_terms = ranked
            .into_iter()
            .take(self.top_terms)
            .map(|(term, acc)| TermCount {
                term: term.clone(),
                count: acc.intensity.count,
            })
            .collect();

        let global_stats = GlobalStats {
            unique_sessions: self.sessions.len(),
            unique_models: self.models.len(),
            models: self.models.keys().cloned().collect(),
            entropy: self.entropy.stats(),
            mutual_information: self.mutual_information.stats(),
            token_stats: self.tokens.stats(),
            violation_stats: ViolationStats {
                total: self.violations,
                records_with_violations: self.records_with_violations,
            },
            spike_stats: SpikeSummary {
                total_spikes: self.total_spikes,
                unique_terms: self.terms.len(),
                most_common_terms,
                avg_intensity: self.spike_intensity.mean(),
                max_intensity: self.spike_intensity.max,
            },
        };

        AggregateReport {
            total_count: self.records,
            by_model: self
                .models
                .into_iter()
                .map(|(k, v)| (k, v.finish()))
                .collect(),
            by_session: self
                .sessions
                .into_iter()
                .map(|(k, v)| (k, v.finish()))
                .collect(),
            by_spike_term: self
                .terms
                .into_iter()
                .map(|(k, v)| (k, v.finish()))
                .collect(),
            global_stats,
        }
    }
}

/// Aggregate a batch of records.
#[allow(dead_code)] // Default-limit entry point
pub fn aggregate(records: &[LogRecord]) -> AggregateReport {
    aggregate_with_top(records, DEFAULT_TOP_TERMS)
}

/// Aggregate a batch, listing `top_terms` most common spike terms.
pub fn aggregate_with_top(records: &[LogRecord], top_terms: usize) -> AggregateReport {
    let mut acc = Aggregator::new(top_terms);
    acc.extend(records);
    acc.finish()
}

/// Aggregate a batch in `shards` contiguous slices on blocking tasks, then
/// merge the partial accumulators in order.
pub async fn aggregate_sharded(
    records: Vec<LogRecord>,
    shards: usize,
    top_terms: usize,
) -> Result<AggregateReport, JoinError> {
    let shards = shards.max(1);
    let chunk_size = records.len().div_ceil(shards).max(1);

    let mut chunks = Vec::with_capacity(shards);
    let mut rest = records;
    while !rest.is_empty() {
        let tail = rest.split_off(chunk_size.min(rest.len()));
        chunks.push(rest);
        rest = tail;
    }
    debug!("Aggregating {} shards of up to {} records", chunks.len(), chunk_size);

    let handles = chunks.into_iter().map(|chunk| {
        tokio::task::spawn_blocking(move || {
            let mut acc = Aggregator::new(top_terms);
            acc.extend(&chunk);
            acc
        })
    });

    let partials = futures::future::try_join_all(handles).await?;

    let mut total = Aggregator::new(top_terms);
    for partial in partials.into_iter().filter(|p| !p.is_empty()) {
        total.merge(partial);
    }
    debug!("Merged {} records", total.len());
    Ok(total.finish())
}
