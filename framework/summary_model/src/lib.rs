mod report;

pub use report::{LatencySummary, OperationSummary, StageSummary, SummaryReport};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner unless one was given on the command line. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The backend profile the scenario was pointed at
    pub backend: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The planned duration of the run, in seconds
    ///
    /// For a ramping scenario this is the sum of the stage durations. For a shared iterations
    /// scenario it is the maximum duration, and the run may well finish sooner.
    pub run_duration: Option<u64>,
    /// Human readable description of how virtual users were scheduled, for example
    /// `ramping-vus[30s->200, 120s->200, 30s->0]`.
    pub executor: String,
    /// The largest number of virtual users that were active at the same time
    pub peak_vus: usize,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The aggregated outcomes of the run
    pub report: SummaryReport,
    /// The version of Geo Tunnel that was used for this run
    pub geo_tunnel_version: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        backend: String,
        started_at: i64,
        run_duration: Option<u64>,
        executor: String,
        geo_tunnel_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            backend,
            started_at,
            run_duration,
            executor,
            peak_vus: 0,
            env: HashMap::with_capacity(0),
            report: SummaryReport::default(),
            geo_tunnel_version,
        }
    }

    /// Attach the final report
    pub fn set_report(&mut self, report: SummaryReport) {
        self.peak_vus = report.peak_vus;
        self.report = report;
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario,
    /// so that runs with the same configuration can be compared. It uses the
    ///     - Scenario name
    ///     - Backend
    ///     - Run duration
    ///     - Executor description
    ///     - Selected environment variables
    ///     - Geo Tunnel version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.backend.as_bytes());
        if let Some(run_duration) = self.run_duration {
            Digest::update(&mut hasher, run_duration.to_le_bytes());
        }
        Digest::update(&mut hasher, self.executor.as_bytes());
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.geo_tunnel_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a `.jsonl` file, one JSON object per line.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    let mut line = serde_json::to_vec(run_summary)?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

/// Load every run summary written by [append_run_summary], skipping blank lines.
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    std::io::BufReader::new(file)
        .lines()
        .filter_ok(|line| !line.trim().is_empty())
        .map(|line| -> anyhow::Result<RunSummary> { Ok(serde_json::from_str(&line?)?) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> RunSummary {
        RunSummary::new(
            "run-1".to_string(),
            "location_mix".to_string(),
            "rdbms".to_string(),
            1_700_000_000,
            Some(180),
            "ramping-vus[30s->200, 120s->200, 30s->0]".to_string(),
            "0.1.0".to_string(),
        )
    }

    #[test]
    fn fingerprint_ignores_run_id_and_results() {
        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();
        second.started_at += 1000;
        second.set_report(SummaryReport {
            peak_vus: 200,
            ..Default::default()
        });

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_backend() {
        let first = sample_summary();
        let mut second = sample_summary();
        second.backend = "kafka".to_string();

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn append_and_load_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_summary.jsonl");

        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();
        second.add_env("RUST_LOG".to_string(), "info".to_string());

        append_run_summary(&first, path.clone()).unwrap();
        append_run_summary(&second, path.clone()).unwrap();

        let runs = load_summary_runs(path).unwrap();
        pretty_assertions::assert_eq!(vec![first, second], runs);
    }
}
