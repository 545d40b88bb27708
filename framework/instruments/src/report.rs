mod aggregator;
mod outcome_file;
mod summary_table;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geo_tunnel_summary_model::SummaryReport;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::outcome::RequestOutcome;
use aggregator::Aggregator;
use outcome_file::OutcomeFileWriter;

pub use aggregator::StagePlan;

/// How many outcomes can wait for the consumer before the oldest ones are dropped.
pub const DEFAULT_BUFFER_CAPACITY: usize = 65_536;

/// Configuration for the [Reporter].
#[derive(Debug, Clone)]
pub struct ReportConfig {
    print_summary: bool,
    outcomes_path: Option<PathBuf>,
    stages: Vec<StagePlan>,
    buffer_capacity: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            print_summary: false,
            outcomes_path: None,
            stages: Vec::new(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ReportConfig {
    /// Print summary tables when the reporter is finalized.
    pub fn enable_summary(mut self) -> Self {
        self.print_summary = true;
        self
    }

    /// Write every outcome to `path` as a JSON line.
    pub fn enable_outcome_file(mut self, path: PathBuf) -> Self {
        self.outcomes_path = Some(path);
        self
    }

    /// The planned stages, used for per-stage throughput.
    pub fn with_stages(mut self, stages: Vec<StagePlan>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Start the consumer task on `runtime` and return the reporter that feeds it.
    pub fn init(self, runtime: &tokio::runtime::Handle) -> anyhow::Result<Reporter> {
        let outcome_file = self
            .outcomes_path
            .as_deref()
            .map(OutcomeFileWriter::create)
            .transpose()?;

        let (sender, receiver) = broadcast::channel(self.buffer_capacity);
        let state = Arc::new(Mutex::new(Aggregator::new(self.stages)));
        let close = Arc::new(Notify::new());

        let consumer = runtime.spawn(consume(
            receiver,
            state.clone(),
            close.clone(),
            outcome_file,
        ));

        Ok(Reporter {
            sender,
            state,
            close,
            consumer: Mutex::new(Some(consumer)),
            skipped: AtomicU64::new(0),
            peak_vus: AtomicUsize::new(0),
            print_summary: self.print_summary,
        })
    }
}

/// Collects [RequestOutcome]s from every virtual user.
///
/// Virtual users hand outcomes over through a bounded broadcast buffer and never wait on the
/// consumer. When the buffer is full the oldest outcome that has not been read yet is overwritten
/// and counted as dropped, so a slow consumer cannot slow down the load generator.
#[derive(Debug)]
pub struct Reporter {
    sender: Sender<RequestOutcome>,
    state: Arc<Mutex<Aggregator>>,
    close: Arc<Notify>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    skipped: AtomicU64,
    peak_vus: AtomicUsize,
    print_summary: bool,
}

impl Reporter {
    pub fn add_outcome(&self, outcome: RequestOutcome) {
        if self.sender.send(outcome).is_err() {
            log::trace!("Outcome recorded after the reporter was finalized");
        }
    }

    /// Count an iteration that sent no request.
    pub fn add_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Tell the reporter how many virtual users are active right now.
    pub fn observe_active_vus(&self, active: usize) {
        self.peak_vus.fetch_max(active, Ordering::Relaxed);
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// A report of everything the consumer has processed so far.
    pub fn snapshot(&self, elapsed: Duration) -> SummaryReport {
        self.state.lock().summary(
            elapsed,
            self.skipped.load(Ordering::Relaxed),
            self.peak_vus.load(Ordering::Relaxed),
        )
    }

    /// Drain the buffer, stop the consumer and build the final report.
    ///
    /// Call this once every virtual user has stopped. Outcomes added afterwards are ignored.
    pub async fn finalize(&self, elapsed: Duration) -> SummaryReport {
        self.close.notify_one();

        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.await {
                log::error!("Outcome consumer failed: {e:?}");
            }
        }

        let report = self.snapshot(elapsed);
        if report.dropped_samples > 0 {
            log::warn!(
                "{} outcomes were dropped because the reporter could not keep up",
                report.dropped_samples
            );
        }
        if self.print_summary {
            summary_table::print_summary(&report);
        }

        report
    }
}

async fn consume(
    mut receiver: Receiver<RequestOutcome>,
    state: Arc<Mutex<Aggregator>>,
    close: Arc<Notify>,
    mut outcome_file: Option<OutcomeFileWriter>,
) {
    loop {
        tokio::select! {
            biased;
            received = receiver.recv() => match received {
                Ok(outcome) => record(&state, &mut outcome_file, outcome).await,
                Err(RecvError::Lagged(count)) => lagged(&state, count),
                Err(RecvError::Closed) => break,
            },
            _ = close.notified() => break,
        }
    }

    loop {
        match receiver.try_recv() {
            Ok(outcome) => record(&state, &mut outcome_file, outcome).await,
            Err(TryRecvError::Lagged(count)) => lagged(&state, count),
            Err(_) => break,
        }
    }

    if let Some(file) = outcome_file.as_mut() {
        if let Err(e) = file.flush().await {
            log::error!("Failed to flush outcome file: {e:?}");
        }
    }
}

async fn record(
    state: &Mutex<Aggregator>,
    outcome_file: &mut Option<OutcomeFileWriter>,
    outcome: RequestOutcome,
) {
    state.lock().record(&outcome);

    if let Some(file) = outcome_file.as_mut() {
        if let Err(e) = file.write(&outcome).await {
            log::error!("Failed to write outcome, no more outcomes will be written: {e:?}");
            *outcome_file = None;
        }
    }
}

fn lagged(state: &Mutex<Aggregator>, count: u64) {
    let mut state = state.lock();
    if state.dropped() == 0 {
        log::warn!("Reporter is falling behind, dropping the oldest unrecorded outcomes");
    }
    state.record_dropped(count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ErrorKind, OutcomeKind};
    use chrono::Utc;

    fn outcome(kind: OutcomeKind) -> RequestOutcome {
        RequestOutcome::new("write", kind, Duration::from_millis(3), Utc::now())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_producers_are_all_counted() {
        let reporter = Arc::new(
            ReportConfig::default()
                .init(&tokio::runtime::Handle::current())
                .unwrap(),
        );

        let mut handles = Vec::new();
        for vu in 0..50 {
            let reporter = reporter.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let kind = match i % 10 {
                        0 => OutcomeKind::Failure { status: 500 },
                        1 => OutcomeKind::Error {
                            kind: ErrorKind::Connect,
                        },
                        _ => OutcomeKind::Success { status: 200 },
                    };
                    reporter.add_outcome(outcome(kind).with_vu_id(vu));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let report = reporter.finalize(Duration::from_secs(1)).await;
        assert_eq!(0, report.dropped_samples);
        assert_eq!(10_000, report.total.attempts);
        assert_eq!(1_000, report.total.failures);
        assert_eq!(1_000, report.total.errors);
        assert_eq!(8_000, report.total.successes);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_buffer_drops_oldest_without_blocking() {
        let reporter = ReportConfig::default()
            .with_buffer_capacity(8)
            .init(&tokio::runtime::Handle::current())
            .unwrap();

        // On a current thread runtime the consumer cannot run until this task yields, so all of
        // these land in the buffer at once.
        for _ in 0..100 {
            reporter.add_outcome(outcome(OutcomeKind::Success { status: 200 }));
        }

        let report = reporter.finalize(Duration::from_secs(1)).await;
        assert_eq!(92, report.dropped_samples);
        assert_eq!(8, report.total.attempts);
    }

    #[tokio::test]
    async fn outcome_file_gets_one_line_per_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("outcomes.jsonl");

        let reporter = ReportConfig::default()
            .enable_outcome_file(path.clone())
            .init(&tokio::runtime::Handle::current())
            .unwrap();

        reporter.add_outcome(outcome(OutcomeKind::Success { status: 202 }).with_stage(1));
        reporter.add_outcome(outcome(OutcomeKind::Error {
            kind: ErrorKind::Timeout,
        }));
        reporter.finalize(Duration::from_secs(1)).await;

        let content = std::fs::read_to_string(path).unwrap();
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(2, lines.len());

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!("success", first["outcome"]);
        assert_eq!(202, first["status"]);
        assert_eq!(1, first["stage"]);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!("error", second["outcome"]);
        assert_eq!("timeout", second["error"]);
        assert!(second["status"].is_null());
    }

    #[tokio::test]
    async fn skipped_iterations_and_peak_vus_are_reported() {
        let reporter = ReportConfig::default()
            .init(&tokio::runtime::Handle::current())
            .unwrap();

        reporter.add_skipped();
        reporter.add_skipped();
        reporter.observe_active_vus(3);
        reporter.observe_active_vus(7);
        reporter.observe_active_vus(2);

        let report = reporter.finalize(Duration::from_secs(1)).await;
        assert_eq!(2, report.skipped_iterations);
        assert_eq!(7, report.peak_vus);
        assert_eq!(0, report.total.attempts);
    }
}
