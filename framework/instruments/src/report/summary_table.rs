use geo_tunnel_summary_model::{OperationSummary, SummaryReport};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct OperationRow {
    operation: String,
    attempts: u64,
    successes: u64,
    failures: u64,
    errors: u64,
    #[tabled(display = "percent")]
    success_rate: f64,
    #[tabled(display = "float2")]
    avg_ms: f64,
    #[tabled(display = "float2")]
    p50_ms: f64,
    #[tabled(display = "float2")]
    p90_ms: f64,
    #[tabled(display = "float2")]
    p99_ms: f64,
    #[tabled(display = "float2")]
    max_ms: f64,
}

#[derive(Tabled)]
struct StageRow {
    stage: usize,
    target_vus: usize,
    #[tabled(display = "float2")]
    elapsed_s: f64,
    attempts: u64,
    failures: u64,
    errors: u64,
    #[tabled(display = "float2")]
    throughput_per_s: f64,
    #[tabled(display = "float2")]
    p50_ms: f64,
    #[tabled(display = "float2")]
    p99_ms: f64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}

impl From<&OperationSummary> for OperationRow {
    fn from(op: &OperationSummary) -> Self {
        let latency = op.latency.clone().unwrap_or_default();
        Self {
            operation: op.label.clone(),
            attempts: op.attempts,
            successes: op.successes,
            failures: op.failures,
            errors: op.errors,
            success_rate: op.success_rate,
            avg_ms: latency.mean_ms,
            p50_ms: latency.p50_ms,
            p90_ms: latency.p90_ms,
            p99_ms: latency.p99_ms,
            max_ms: latency.max_ms,
        }
    }
}

pub(crate) fn print_summary(report: &SummaryReport) {
    println!("\nSummary of operations");
    let rows = report
        .operations
        .iter()
        .chain(std::iter::once(&report.total))
        .map(OperationRow::from)
        .collect::<Vec<_>>();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");

    if !report.stages.is_empty() {
        println!("\nSummary of stages");
        let rows = report.stages.iter().map(|stage| {
            let latency = stage.latency.clone().unwrap_or_default();
            StageRow {
                stage: stage.index,
                target_vus: stage.target_vus,
                elapsed_s: stage.elapsed_s,
                attempts: stage.attempts,
                failures: stage.failures,
                errors: stage.errors,
                throughput_per_s: stage.throughput_per_s,
                p50_ms: latency.p50_ms,
                p99_ms: latency.p99_ms,
            }
        });
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
    }

    let failures = report
        .operations
        .iter()
        .flat_map(|op| {
            op.failure_statuses
                .iter()
                .map(move |(status, count)| format!("{} -> HTTP {status}: {count}", op.label))
                .chain(
                    op.error_kinds
                        .iter()
                        .map(move |(kind, count)| format!("{} -> {kind}: {count}", op.label)),
                )
        })
        .collect::<Vec<_>>();
    if !failures.is_empty() {
        println!("\nFailures (unexpected status) and errors (no response)");
        for line in failures {
            println!("  {line}");
        }
    }

    println!(
        "\nPeak virtual users: {}, skipped iterations: {}, dropped samples: {}, elapsed: {:.2}s",
        report.peak_vus, report.skipped_iterations, report.dropped_samples, report.elapsed_s
    );
}
