use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct GeoTunnelScenarioCli {
    /// The backend profile to drive, for example `rdbms`, `kafka` or `redis_streams`.
    ///
    /// Each scenario decides which backends it supports and which one it uses by default.
    #[clap(short, long)]
    pub backend: Option<String>,

    /// Path to the trajectory dataset, a CSV file with a header row
    #[clap(long)]
    pub dataset: Option<PathBuf>,

    /// Base URL of the service to test, overriding the one from the backend profile
    #[clap(short, long)]
    pub connection_string: Option<String>,

    /// Run a constant number of virtual users instead of the scenario's stages.
    ///
    /// Must be combined with `--duration`. For a shared iterations scenario this sets the number of
    /// virtual users that share the iterations.
    #[clap(long)]
    pub vus: Option<usize>,

    /// The number of seconds to run the scenario for.
    ///
    /// For a shared iterations scenario this is the maximum duration, the run stops early once all
    /// iterations are done.
    #[clap(long)]
    pub duration: Option<u64>,

    /// The total number of iterations for a shared iterations scenario
    #[clap(long)]
    pub iterations: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// How to report the outcome of the run
    #[clap(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// Write every request outcome to this file as a JSON line
    #[clap(long)]
    pub outcomes_path: Option<PathBuf>,

    /// Append a summary of the run to this file as a JSON line
    #[clap(long)]
    pub run_summary_path: Option<PathBuf>,

    /// Identifier for this run, generated when not set
    #[clap(long)]
    pub run_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Aggregate outcomes in memory and print summary tables at the end of the run
    #[default]
    InMemory,
    /// Aggregate outcomes without printing anything
    Noop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_overrides() {
        let cli = GeoTunnelScenarioCli::parse_from([
            "location_mix",
            "--backend",
            "kafka",
            "--connection-string",
            "http://localhost:9999",
            "--vus",
            "5",
            "--duration",
            "20",
            "--reporter",
            "noop",
            "--no-progress",
        ]);

        assert_eq!(Some("kafka"), cli.backend.as_deref());
        assert_eq!(Some("http://localhost:9999"), cli.connection_string.as_deref());
        assert_eq!(Some(5), cli.vus);
        assert_eq!(Some(20), cli.duration);
        assert_eq!(ReporterOpt::Noop, cli.reporter);
        assert!(cli.no_progress);
    }

    #[test]
    fn defaults() {
        let cli = GeoTunnelScenarioCli::parse_from(["location_mix"]);

        assert!(cli.backend.is_none());
        assert!(cli.vus.is_none());
        assert_eq!(ReporterOpt::InMemory, cli.reporter);
        assert!(!cli.no_progress);
    }
}
