use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geo_tunnel_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use geo_tunnel_instruments::Reporter;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::executor::Executor;
use crate::schedule::Schedule;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// Settings for the run that the CLI can override, exposed to the scenario's hooks.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunSettings {
    pub(crate) run_id: String,
    pub(crate) backend: Option<String>,
    pub(crate) dataset: Option<std::path::PathBuf>,
    pub(crate) connection_string: Option<String>,
    pub(crate) pacing: Duration,
}

/// State shared by every virtual user in the run.
///
/// The scenario's setup hook gets mutable access before any virtual user starts, after that it is
/// read only.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    schedule: Schedule,
    settings: RunSettings,
    started: Instant,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        schedule: Schedule,
        settings: RunSettings,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            schedule,
            settings,
            started: Instant::now(),
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn run_id(&self) -> &str {
        &self.settings.run_id
    }

    /// The backend selected on the command line, if any.
    pub fn backend(&self) -> Option<&str> {
        self.settings.backend.as_deref()
    }

    pub fn dataset_path(&self) -> Option<&Path> {
        self.settings.dataset.as_deref()
    }

    /// A base URL override from the command line, if any.
    pub fn connection_string(&self) -> Option<&str> {
        self.settings.connection_string.as_deref()
    }

    /// How long each virtual user sleeps between iterations.
    pub fn pacing(&self) -> Duration {
        self.settings.pacing
    }

    pub fn set_pacing(&mut self, pacing: Duration) {
        self.settings.pacing = pacing;
    }

    /// Stop the scenario early. Virtual users finish their current iteration and exit.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn shutdown_listener(&self) -> DelegatedShutdownListener {
        self.shutdown_handle.new_listener()
    }

    /// Time since virtual users started being scheduled.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn current_stage(&self) -> usize {
        self.schedule.stage_index_at(self.elapsed())
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = Instant::now();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// State owned by a single virtual user. Never shared with another virtual user.
pub struct VirtualUserContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: usize,
    iteration: u64,
    global_iteration: Option<u64>,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    rng: StdRng,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VirtualUserContext<RV, V> {
    pub(crate) fn new(
        vu_id: usize,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_id,
            iteration: 0,
            global_iteration: None,
            runner_context,
            shutdown_listener,
            rng: StdRng::from_entropy(),
            value: Default::default(),
        }
    }

    /// 1-based id of this virtual user. Ids are unique among the active virtual users and get
    /// reused after a virtual user has been retired.
    pub fn vu_id(&self) -> usize {
        self.vu_id
    }

    /// How many iterations this virtual user has completed.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The iteration index claimed for the current iteration of a shared iterations scenario.
    /// Unique across all virtual users.
    pub fn global_iteration(&self) -> Option<u64> {
        self.global_iteration
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        self.runner_context.reporter()
    }

    /// Signalled when the scheduler retires this virtual user.
    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn current_stage(&self) -> usize {
        self.runner_context.current_stage()
    }

    pub(crate) fn set_global_iteration(&mut self, global_iteration: u64) {
        self.global_iteration = Some(global_iteration);
    }

    pub(crate) fn complete_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
