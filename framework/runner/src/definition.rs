use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use geo_tunnel_core::prelude::ConfigurationError;

use crate::cli::{GeoTunnelScenarioCli, ReporterOpt};
use crate::context::{RunnerContext, UserValuesConstraint, VirtualUserContext};
use crate::schedule::{ScenarioExecutor, Stage};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VirtualUserHookMut<RV, V> = fn(&mut VirtualUserContext<RV, V>) -> HookResult;

/// One iteration of a virtual user. Called over and over until the virtual user is retired.
///
/// Write these as a plain function that boxes an async block:
///
/// ```ignore
/// fn behaviour(ctx: &mut VirtualUserContext<RV, V>) -> BoxFuture<'_, HookResult> {
///     Box::pin(async move { Ok(()) })
/// }
/// ```
pub type VirtualUserBehaviour<RV, V> =
    for<'a> fn(&'a mut VirtualUserContext<RV, V>) -> BoxFuture<'a, HookResult>;

/// How often the scheduler compares the active population to the schedule.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How long the run waits for retiring virtual users to finish their iteration.
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: GeoTunnelScenarioCli,
    /// How virtual users are scheduled, unless the command line overrides it.
    executor: Option<ScenarioExecutor>,
    graceful_ramp_down: Duration,
    tick_interval: Duration,
    default_pacing: Duration,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, which will be run once for each virtual user as it starts.
    setup_vu_fn: Option<VirtualUserHookMut<RV, V>>,
    /// The behaviour every virtual user runs, once per iteration.
    behaviour: Option<VirtualUserBehaviour<RV, V>>,
    /// Teardown hook for a virtual user, run once it has stopped iterating.
    teardown_vu_fn: Option<VirtualUserHookMut<RV, V>>,
    /// Global teardown hook, run once all virtual users have stopped. Best effort, a failure is
    /// logged and does not fail the run.
    teardown_fn: Option<GlobalHook<RV>>,
}

/// A validated scenario with the command line applied.
pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) executor: ScenarioExecutor,
    pub(crate) graceful_ramp_down: Duration,
    pub(crate) tick_interval: Duration,
    pub(crate) default_pacing: Duration,
    pub(crate) backend: Option<String>,
    pub(crate) dataset: Option<std::path::PathBuf>,
    pub(crate) connection_string: Option<String>,
    pub(crate) no_progress: bool,
    pub(crate) reporter: ReporterOpt,
    pub(crate) outcomes_path: Option<std::path::PathBuf>,
    pub(crate) run_summary_path: Option<std::path::PathBuf>,
    pub(crate) run_id: Option<String>,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) hooks: VirtualUserHooks<RV, V>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
}

/// The per virtual user hooks, copied into every virtual user task.
pub(crate) struct VirtualUserHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) setup: Option<VirtualUserHookMut<RV, V>>,
    pub(crate) behaviour: VirtualUserBehaviour<RV, V>,
    pub(crate) teardown: Option<VirtualUserHookMut<RV, V>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VirtualUserHooks<RV, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Copy for VirtualUserHooks<RV, V> {}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Initialise a new scenario definition with an already parsed command line.
    /// See the [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: GeoTunnelScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            executor: None,
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
            tick_interval: DEFAULT_TICK_INTERVAL,
            default_pacing: Duration::ZERO,
            setup_fn: None,
            setup_vu_fn: None,
            behaviour: None,
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// Ramp through `stages`, starting with no virtual users.
    pub fn with_stages(self, stages: &[Stage]) -> Self {
        self.with_ramping_vus(0, stages)
    }

    pub fn with_ramping_vus(mut self, start_vus: usize, stages: &[Stage]) -> Self {
        self.executor = Some(ScenarioExecutor::RampingVus {
            start_vus,
            stages: stages.to_vec(),
        });
        self
    }

    pub fn with_constant_vus(mut self, vus: usize, duration: Duration) -> Self {
        self.executor = Some(ScenarioExecutor::ConstantVus { vus, duration });
        self
    }

    /// Share `iterations` between `vus` virtual users. Each iteration index is run exactly once.
    pub fn with_shared_iterations(
        mut self,
        vus: usize,
        iterations: u64,
        max_duration: Duration,
    ) -> Self {
        self.executor = Some(ScenarioExecutor::SharedIterations {
            vus,
            iterations,
            max_duration,
        });
        self
    }

    /// How long to wait at the end of the run for virtual users to finish the iteration they are in.
    pub fn with_graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.graceful_ramp_down = graceful_ramp_down;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// The sleep between iterations, until the setup hook sets another with
    /// [RunnerContext::set_pacing].
    pub fn with_default_pacing(mut self, pacing: Duration) -> Self {
        self.default_pacing = pacing;
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_vu_fn] for this scenario.
    pub fn use_vu_setup(mut self, setup_vu_fn: VirtualUserHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Set the virtual user behaviour [ScenarioDefinitionBuilder::behaviour] for this scenario.
    pub fn use_vu_behaviour(mut self, behaviour: VirtualUserBehaviour<RV, V>) -> Self {
        self.behaviour = Some(behaviour);
        self
    }

    /// Set the virtual user teardown hook [ScenarioDefinitionBuilder::teardown_vu_fn] for this scenario.
    pub fn use_vu_teardown(mut self, teardown_vu_fn: VirtualUserHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Apply the command line to the configured executor.
    fn resolve_executor(&self) -> Result<ScenarioExecutor, ConfigurationError> {
        let cli = &self.cli;
        let duration = cli.duration.map(Duration::from_secs);

        match self.executor.clone() {
            Some(ScenarioExecutor::SharedIterations {
                vus,
                iterations,
                max_duration,
            }) => Ok(ScenarioExecutor::SharedIterations {
                vus: cli.vus.unwrap_or(vus),
                iterations: cli.iterations.unwrap_or(iterations),
                max_duration: duration.unwrap_or(max_duration),
            }),
            _ if cli.iterations.is_some() => Err(ConfigurationError::invalid(
                "iterations",
                "--iterations only applies to a shared iterations scenario",
            )),
            executor => match (cli.vus, duration, executor) {
                (Some(vus), Some(duration), _) => {
                    Ok(ScenarioExecutor::ConstantVus { vus, duration })
                }
                (Some(_), None, _) => Err(ConfigurationError::invalid(
                    "vus",
                    "--vus needs --duration for a stage based scenario",
                )),
                (None, Some(duration), Some(ScenarioExecutor::ConstantVus { vus, .. })) => {
                    Ok(ScenarioExecutor::ConstantVus { vus, duration })
                }
                (None, Some(_), _) => Err(ConfigurationError::invalid(
                    "duration",
                    "--duration needs --vus to replace the scenario's stages",
                )),
                (None, None, Some(executor)) => Ok(executor),
                (None, None, None) => Err(ConfigurationError::NoStages),
            },
        }
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let executor = self.resolve_executor()?;
        executor.validate()?;

        let behaviour = self.behaviour.ok_or(ConfigurationError::NoBehaviour)?;

        if self.tick_interval.is_zero() {
            return Err(
                ConfigurationError::invalid("tick interval", "must be greater than zero").into(),
            );
        }

        Ok(ScenarioDefinition {
            name: self.name,
            executor,
            graceful_ramp_down: self.graceful_ramp_down,
            tick_interval: self.tick_interval,
            default_pacing: self.default_pacing,
            backend: self.cli.backend,
            dataset: self.cli.dataset,
            connection_string: self.cli.connection_string,
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            outcomes_path: self.cli.outcomes_path,
            run_summary_path: self.cli.run_summary_path,
            run_id: self.cli.run_id,
            setup_fn: self.setup_fn,
            hooks: VirtualUserHooks {
                setup: self.setup_vu_fn,
                behaviour,
                teardown: self.teardown_vu_fn,
            },
            teardown_fn: self.teardown_fn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Default)]
    struct Values;

    impl UserValuesConstraint for Values {}

    fn behaviour(_ctx: &mut VirtualUserContext<Values, Values>) -> BoxFuture<'_, HookResult> {
        Box::pin(async move { Ok(()) })
    }

    fn cli(args: &[&str]) -> GeoTunnelScenarioCli {
        GeoTunnelScenarioCli::parse_from(std::iter::once("test").chain(args.iter().copied()))
    }

    fn builder(args: &[&str]) -> ScenarioDefinitionBuilder<Values, Values> {
        ScenarioDefinitionBuilder::new("test", cli(args)).use_vu_behaviour(behaviour)
    }

    fn stages() -> Vec<Stage> {
        vec![
            Stage::new(Duration::from_secs(30), 200),
            Stage::new(Duration::from_secs(120), 200),
            Stage::new(Duration::from_secs(30), 0),
        ]
    }

    #[test]
    fn stages_are_used_without_overrides() {
        let definition = builder(&[]).with_stages(&stages()).build().unwrap();

        assert_eq!(
            ScenarioExecutor::RampingVus {
                start_vus: 0,
                stages: stages()
            },
            definition.executor
        );
        assert_eq!(DEFAULT_GRACEFUL_RAMP_DOWN, definition.graceful_ramp_down);
    }

    #[test]
    fn vus_and_duration_replace_stages() {
        let definition = builder(&["--vus", "10", "--duration", "30"])
            .with_stages(&stages())
            .build()
            .unwrap();

        assert_eq!(
            ScenarioExecutor::ConstantVus {
                vus: 10,
                duration: Duration::from_secs(30)
            },
            definition.executor
        );
    }

    #[test]
    fn vus_without_duration_is_rejected() {
        let err = builder(&["--vus", "10"])
            .with_stages(&stages())
            .build()
            .err()
            .unwrap();

        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::Invalid { .. })
        ));
    }

    #[test]
    fn shared_iterations_take_overrides() {
        let definition = builder(&["--vus", "5", "--iterations", "50", "--duration", "10"])
            .with_shared_iterations(100, 100_000, Duration::from_secs(300))
            .build()
            .unwrap();

        assert_eq!(
            ScenarioExecutor::SharedIterations {
                vus: 5,
                iterations: 50,
                max_duration: Duration::from_secs(10)
            },
            definition.executor
        );
    }

    #[test]
    fn iterations_need_shared_iterations() {
        let err = builder(&["--iterations", "50"])
            .with_stages(&stages())
            .build()
            .err()
            .unwrap();

        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[test]
    fn missing_behaviour_is_a_configuration_error() {
        let err = ScenarioDefinitionBuilder::<Values, Values>::new("test", cli(&[]))
            .with_stages(&stages())
            .build()
            .err()
            .unwrap();

        assert_eq!(
            Some(&ConfigurationError::NoBehaviour),
            err.downcast_ref::<ConfigurationError>()
        );
    }

    #[test]
    fn missing_executor_is_a_configuration_error() {
        let err = builder(&[]).build().err().unwrap();

        assert_eq!(
            Some(&ConfigurationError::NoStages),
            err.downcast_ref::<ConfigurationError>()
        );
    }
}
