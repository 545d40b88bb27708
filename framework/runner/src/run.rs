use std::sync::Arc;

use anyhow::Context;
use geo_tunnel_core::prelude::{ShutdownHandle, ShutdownSignalError, VirtualUserBailError};
use geo_tunnel_instruments::ReportConfig;
use geo_tunnel_summary_model::{append_run_summary, RunSummary, SummaryReport};

use crate::cli::ReporterOpt;
use crate::context::{RunSettings, RunnerContext, UserValuesConstraint, VirtualUserContext};
use crate::definition::{ScenarioDefinitionBuilder, VirtualUserHooks};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::schedule::IterationBudget;
use crate::scheduler::drive;
use crate::shutdown::start_shutdown_listener;

/// Run a scenario to completion and return its report.
///
/// Configuration errors, and errors from the setup hook such as a dataset that cannot be loaded,
/// are returned before any virtual user starts. Anything that goes wrong while the scenario is
/// running is logged and counted, it never fails the run.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<SummaryReport> {
    let definition = definition.build()?;

    log::info!("Running scenario: {}", definition.name);
    log::info!("Executor: {}", definition.executor);

    let schedule = definition.executor.schedule();
    let planned_duration = schedule.total_duration();
    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));

    let mut report_config = ReportConfig::default().with_stages(schedule.stage_plans());
    if definition.reporter == ReporterOpt::InMemory {
        report_config = report_config.enable_summary();
    }
    if let Some(path) = &definition.outcomes_path {
        report_config = report_config.enable_outcome_file(path.clone());
    }
    let reporter = Arc::new(report_config.init(executor.handle())?);

    let mut runner_context = RunnerContext::new(
        executor.clone(),
        reporter.clone(),
        shutdown_handle.clone(),
        schedule.clone(),
        RunSettings {
            run_id: run_id.clone(),
            backend: definition.backend.clone(),
            dataset: definition.dataset.clone(),
            connection_string: definition.connection_string.clone(),
            pacing: definition.default_pacing,
        },
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let started_at = chrono::Utc::now();
    runner_context.mark_started();
    let runner_context = Arc::new(runner_context);

    // Progress and the resource monitor stop on this handle once the run is over, which may be
    // well after the scenario shutdown signal while virtual users wind down.
    let run_complete = ShutdownHandle::new();
    if !definition.no_progress {
        start_progress(planned_duration, reporter.clone(), run_complete.new_listener());
    }
    start_monitor(run_complete.new_listener());

    let budget = definition
        .executor
        .iterations()
        .map(|iterations| Arc::new(IterationBudget::new(iterations)));
    let hooks = definition.hooks;
    let tick_interval = definition.tick_interval;
    let graceful_ramp_down = definition.graceful_ramp_down;

    let elapsed = {
        let runner_context = runner_context.clone();
        let budget = budget.clone();
        executor.block_on(async move {
            drive(
                &schedule,
                tick_interval,
                graceful_ramp_down,
                budget.as_deref(),
                runner_context.reporter(),
                runner_context.shutdown_listener(),
                |vu_id, retire| {
                    tokio::spawn(run_virtual_user(
                        vu_id,
                        runner_context.clone(),
                        hooks,
                        retire,
                        budget.clone(),
                    ))
                },
            )
            .await
        })
    };

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    run_complete.shutdown();
    let report = executor.block_on(reporter.finalize(elapsed));

    if let Some(budget) = &budget {
        log::info!("Completed {} shared iterations", budget.claimed());
    }

    if let Some(path) = definition.run_summary_path {
        let mut summary = RunSummary::new(
            run_id,
            definition.name.clone(),
            definition.backend.clone().unwrap_or_default(),
            started_at.timestamp(),
            Some(planned_duration.as_secs()),
            definition.executor.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        if let Ok(level) = std::env::var("RUST_LOG") {
            summary.add_env("RUST_LOG".to_string(), level);
        }
        summary.set_report(report.clone());

        log::info!("Run summary fingerprint: {}", summary.fingerprint());
        append_run_summary(&summary, path.clone())
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    Ok(report)
}

/// One virtual user: set up, iterate until retired, tear down.
///
/// Iterations are strictly sequential. The retire signal is only checked between iterations and
/// during the pacing sleep, so an iteration that has started always runs to completion.
async fn run_virtual_user<RV: UserValuesConstraint, V: UserValuesConstraint>(
    vu_id: usize,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VirtualUserHooks<RV, V>,
    retire: ShutdownHandle,
    budget: Option<Arc<IterationBudget>>,
) {
    let mut retire_listener = retire.new_listener();
    let mut scenario_listener = runner_context.shutdown_listener();
    let mut context =
        VirtualUserContext::new(vu_id, runner_context.clone(), retire.new_listener());

    log::debug!("Starting virtual user {vu_id}");

    if let Some(setup) = hooks.setup {
        if let Err(e) = setup(&mut context) {
            log::error!("Virtual user setup failed for virtual user {vu_id}: {e:?}");
            return;
        }
    }

    loop {
        if retire_listener.should_shutdown() || scenario_listener.should_shutdown() {
            log::debug!("Stopping virtual user {vu_id}");
            break;
        }

        if let Some(budget) = &budget {
            match budget.claim() {
                Some(global_iteration) => context.set_global_iteration(global_iteration),
                None => break,
            }
        }

        match (hooks.behaviour)(&mut context).await {
            Ok(()) => {}
            Err(e) if e.is::<ShutdownSignalError>() => {
                // Expected while the virtual user is being retired, the check at the top of the
                // loop will catch this and break out.
            }
            Err(e) if e.is::<VirtualUserBailError>() => {
                log::warn!("Virtual user {vu_id} bailed: {e}");
                break;
            }
            Err(e) => {
                log::error!("Virtual user behaviour failed: {:?}", e);
            }
        }
        context.complete_iteration();

        let pacing = runner_context.pacing();
        if pacing.is_zero() {
            // A behaviour that never waits would otherwise hold its worker thread forever.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(pacing) => {}
                _ = retire_listener.wait_for_shutdown() => {}
                _ = scenario_listener.wait_for_shutdown() => {}
            }
        }
    }

    if let Some(teardown) = hooks.teardown {
        if let Err(e) = teardown(&mut context) {
            log::error!("Virtual user teardown failed for virtual user {vu_id}: {e:?}");
        }
    }
}
