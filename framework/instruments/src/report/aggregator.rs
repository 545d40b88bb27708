use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use geo_tunnel_summary_model::{LatencySummary, OperationSummary, StageSummary, SummaryReport};

use crate::histogram::LatencyHistogram;
use crate::outcome::{OutcomeKind, RequestOutcome};

/// One stage of the schedule as planned, used to work out per-stage throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub duration: Duration,
    pub target_vus: usize,
}

#[derive(Debug, Default, Clone)]
struct Counts {
    attempts: u64,
    successes: u64,
    failures: u64,
    errors: u64,
}

impl Counts {
    fn add(&mut self, kind: &OutcomeKind) {
        self.attempts += 1;
        match kind {
            OutcomeKind::Success { .. } => self.successes += 1,
            OutcomeKind::Failure { .. } => self.failures += 1,
            OutcomeKind::Error { .. } => self.errors += 1,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct LabelStats {
    counts: Counts,
    /// Only requests that got a response, errors have no meaningful latency.
    latency: LatencyHistogram,
    failure_statuses: BTreeMap<u16, u64>,
    error_kinds: BTreeMap<String, u64>,
}

impl LabelStats {
    fn add(&mut self, outcome: &RequestOutcome) {
        self.counts.add(&outcome.kind);
        match outcome.kind {
            OutcomeKind::Success { .. } => self.latency.record(outcome.latency),
            OutcomeKind::Failure { status } => {
                self.latency.record(outcome.latency);
                *self.failure_statuses.entry(status).or_default() += 1;
            }
            OutcomeKind::Error { kind } => {
                *self.error_kinds.entry(kind.to_string()).or_default() += 1;
            }
        }
    }

    fn merge(&mut self, other: &LabelStats) {
        self.counts.attempts += other.counts.attempts;
        self.counts.successes += other.counts.successes;
        self.counts.failures += other.counts.failures;
        self.counts.errors += other.counts.errors;
        self.latency.merge(&other.latency);
        for (status, count) in &other.failure_statuses {
            *self.failure_statuses.entry(*status).or_default() += count;
        }
        for (kind, count) in &other.error_kinds {
            *self.error_kinds.entry(kind.clone()).or_default() += count;
        }
    }

    fn summarise(&self, label: &str) -> OperationSummary {
        let latency = latency_summary(&self.latency);

        OperationSummary {
            label: label.to_string(),
            attempts: self.counts.attempts,
            successes: self.counts.successes,
            failures: self.counts.failures,
            errors: self.counts.errors,
            success_rate: if self.counts.attempts == 0 {
                0.0
            } else {
                self.counts.successes as f64 / self.counts.attempts as f64
            },
            latency,
            failure_statuses: self.failure_statuses.clone(),
            error_kinds: self.error_kinds.clone(),
        }
    }
}

fn latency_summary(histogram: &LatencyHistogram) -> Option<LatencySummary> {
    let to_ms = |d: Duration| d.as_secs_f64() * 1000.0;
    (histogram.count() > 0).then(|| LatencySummary {
        mean_ms: to_ms(histogram.mean()),
        min_ms: to_ms(histogram.min()),
        max_ms: to_ms(histogram.max()),
        p50_ms: to_ms(histogram.percentile(50.0)),
        p90_ms: to_ms(histogram.percentile(90.0)),
        p99_ms: to_ms(histogram.percentile(99.0)),
    })
}

/// Running totals built from the stream of outcomes. Owned by the reporter's consumer task.
#[derive(Debug, Default)]
pub(crate) struct Aggregator {
    by_label: HashMap<String, LabelStats>,
    by_stage: Vec<LabelStats>,
    stages: Vec<StagePlan>,
    dropped: u64,
}

impl Aggregator {
    pub(crate) fn new(stages: Vec<StagePlan>) -> Self {
        Self {
            by_stage: vec![LabelStats::default(); stages.len()],
            stages,
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: &RequestOutcome) {
        self.by_label
            .entry(outcome.label.clone())
            .or_default()
            .add(outcome);

        if outcome.stage >= self.by_stage.len() {
            self.by_stage.resize(outcome.stage + 1, LabelStats::default());
        }
        self.by_stage[outcome.stage].add(outcome);
    }

    pub(crate) fn record_dropped(&mut self, count: u64) {
        self.dropped += count;
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Build a report for a run that has been going for `elapsed`.
    pub(crate) fn summary(
        &self,
        elapsed: Duration,
        skipped_iterations: u64,
        peak_vus: usize,
    ) -> SummaryReport {
        let mut operations = self
            .by_label
            .iter()
            .map(|(label, stats)| stats.summarise(label))
            .collect::<Vec<_>>();
        operations.sort_by(|a, b| a.label.cmp(&b.label));

        let total = self
            .by_label
            .values()
            .fold(LabelStats::default(), |mut acc, stats| {
                acc.merge(stats);
                acc
            })
            .summarise("total");

        let mut stage_start = Duration::ZERO;
        let stages = self
            .by_stage
            .iter()
            .enumerate()
            .map(|(index, stats)| {
                let plan = self.stages.get(index).copied().unwrap_or(StagePlan {
                    duration: elapsed.saturating_sub(stage_start),
                    target_vus: 0,
                });
                let stage_elapsed = elapsed.saturating_sub(stage_start).min(plan.duration);
                stage_start += plan.duration;

                let elapsed_s = stage_elapsed.as_secs_f64();
                let counts = &stats.counts;
                StageSummary {
                    index,
                    target_vus: plan.target_vus,
                    elapsed_s,
                    attempts: counts.attempts,
                    successes: counts.successes,
                    failures: counts.failures,
                    errors: counts.errors,
                    throughput_per_s: if elapsed_s > 0.0 {
                        counts.attempts as f64 / elapsed_s
                    } else {
                        0.0
                    },
                    latency: latency_summary(&stats.latency),
                }
            })
            .collect();

        SummaryReport {
            total,
            operations,
            stages,
            skipped_iterations,
            dropped_samples: self.dropped,
            peak_vus,
            elapsed_s: elapsed.as_secs_f64(),
        }
    }
}
