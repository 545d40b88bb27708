use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latency distribution of the requests that got a response, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

/// Counts for one operation label, or for all labels together.
///
/// `failures` are requests the service answered with an unexpected status. `errors` are requests
/// that got no usable response at all, such as timeouts and connection failures. Keeping them apart
/// separates capacity problems from connectivity problems.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationSummary {
    pub label: String,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub errors: u64,
    /// Successes over attempts, `0.0` when there were no attempts.
    pub success_rate: f64,
    /// `None` when no request for this label completed.
    pub latency: Option<LatencySummary>,
    /// Observed status code to count, for failures only.
    pub failure_statuses: BTreeMap<u16, u64>,
    /// Error kind to count.
    pub error_kinds: BTreeMap<String, u64>,
}

/// Counts and latency for one stage of the schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageSummary {
    pub index: usize,
    /// The target virtual user count at the end of the stage.
    pub target_vus: usize,
    /// How long the stage actually ran for, which is shorter than planned if the run ended early.
    pub elapsed_s: f64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub errors: u64,
    /// Attempts per second over `elapsed_s`.
    pub throughput_per_s: f64,
    /// `None` when no request issued during this stage got a response.
    pub latency: Option<LatencySummary>,
}

/// The aggregated result of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryReport {
    pub total: OperationSummary,
    /// One entry per operation label, sorted by label.
    pub operations: Vec<OperationSummary>,
    pub stages: Vec<StageSummary>,
    /// Iterations that sampled an incomplete record and sent nothing.
    pub skipped_iterations: u64,
    /// Outcomes lost because the hand-off buffer was full. Non-zero values mean the counts above
    /// undercount the traffic that was actually sent.
    pub dropped_samples: u64,
    pub peak_vus: usize,
    pub elapsed_s: f64,
}

impl SummaryReport {
    pub fn operation(&self, label: &str) -> Option<&OperationSummary> {
        self.operations.iter().find(|op| op.label == label)
    }
}
