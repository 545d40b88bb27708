use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use geo_http_client_instrumented::prelude::HttpClient;
use geo_tunnel_dataset::prelude::Dataset;
use geo_tunnel_runner::prelude::{
    BoxFuture, ConfigurationError, GeoTunnelResult, HookResult, RunnerContext,
    UserValuesConstraint, VirtualUserBailError, VirtualUserContext,
};

use crate::builder::build_request;
use crate::context::LocationUserContext;
use crate::operation::Identity;
use crate::runner_context::LocationRunnerContext;
use crate::workload::LocationWorkload;

/// Used when the scenario is not given `--dataset`.
pub const DEFAULT_DATASET_PATH: &str = "grab_posisi_data.csv";

/// The virtual user context type used by location scenarios.
pub type LocationContext<SV> = VirtualUserContext<LocationRunnerContext, LocationUserContext<SV>>;

/// Creates the workload for one backend.
pub type WorkloadFn = fn() -> GeoTunnelResult<LocationWorkload>;

/// What one iteration of [run_iteration] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// A request was sent and its outcome recorded.
    Dispatched,
    /// The sampled record was missing a required field. Nothing was sent or recorded.
    Skipped,
}

/// Pick the workload for the backend named on the command line.
///
/// Each entry pairs a backend name with a function that creates its workload. Without
/// `--backend` the first entry is used.
///
/// ```rust
/// use geo_tunnel_http_runner::prelude::*;
///
/// fn rdbms() -> GeoTunnelResult<LocationWorkload> {
///     Ok(LocationWorkload::new(
///         BackendProfile::rdbms(),
///         WeightedMix::uniform(vec![OperationTemplate::write()])?,
///     ))
/// }
///
/// fn setup(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
///     let workload = select_workload(ctx, &[("rdbms", rdbms)])?;
///     configure_workload(ctx, workload)?;
///     Ok(())
/// }
/// ```
pub fn select_workload(
    ctx: &RunnerContext<LocationRunnerContext>,
    workloads: &[(&str, WorkloadFn)],
) -> GeoTunnelResult<LocationWorkload> {
    let available = || {
        workloads
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let (name, workload) = match ctx.backend() {
        Some(backend) => workloads
            .iter()
            .find(|(name, _)| *name == backend)
            .ok_or_else(|| ConfigurationError::UnknownBackend {
                name: backend.to_string(),
                available: available(),
            })?,
        None => workloads
            .first()
            .ok_or_else(|| ConfigurationError::invalid("backends", "none are defined"))?,
    };

    log::info!("Using backend [{name}]");
    workload()
}

/// Load the dataset and prepare the workload for the virtual users.
///
/// Method:
/// - Loads the dataset from `--dataset`, or [DEFAULT_DATASET_PATH].
/// - Continues as [install_workload].
pub fn configure_workload(
    ctx: &mut RunnerContext<LocationRunnerContext>,
    workload: LocationWorkload,
) -> HookResult {
    let path = ctx
        .dataset_path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_PATH));

    let dataset = Dataset::load(&path)
        .with_context(|| format!("Failed to load dataset from {}", path.display()))?;

    install_workload(ctx, workload, dataset)
}

/// Prepare the workload with a dataset that has already been built.
///
/// Method:
/// - Points every route at `--connection-string`, if it was given.
/// - Validates the workload, a [ConfigurationError] fails the setup.
/// - Creates the HTTP client with the workload's request timeout.
/// - Sets the pacing for every virtual user to the workload's pacing.
pub fn install_workload(
    ctx: &mut RunnerContext<LocationRunnerContext>,
    mut workload: LocationWorkload,
    dataset: Dataset,
) -> HookResult {
    if let Some(base_url) = ctx.connection_string() {
        log::info!("Sending all requests to {base_url}");
        workload.profile = workload.profile.with_single_base_url(base_url);
    }

    workload.validate()?;

    log::info!(
        "Workload for [{}]: {}, pacing {:?}, timeout {:?}",
        workload.profile.name,
        workload.describe_mix(),
        workload.pacing,
        workload.timeout
    );

    let client = HttpClient::new(workload.timeout)?;
    ctx.set_pacing(workload.pacing);

    let values = ctx.get_mut();
    values.client = Some(client);
    values.dataset = Some(Arc::new(dataset));
    values.workload = Some(workload);

    Ok(())
}

/// Run one iteration of the standard location workload.
///
/// Samples a record, skips the iteration if the record is incomplete, otherwise picks an
/// operation from the mix, builds the request, sends it and records the outcome.
pub async fn run_iteration<SV: UserValuesConstraint>(
    ctx: &mut LocationContext<SV>,
) -> anyhow::Result<IterationOutcome> {
    let runner_context = ctx.runner_context().clone();
    let values = runner_context.get();
    let workload = values.workload()?;
    let dataset = values.dataset()?;
    let client = values.client()?;

    let record = dataset.sample(ctx.rng());
    let Some(fields) = record.required() else {
        log::trace!("Skipping incomplete record in virtual user {}", ctx.vu_id());
        ctx.reporter().add_skipped();
        ctx.get_mut().skipped += 1;
        return Ok(IterationOutcome::Skipped);
    };

    let identity = Identity {
        vu_id: ctx.vu_id(),
        iteration: ctx.iteration(),
        global_iteration: ctx.global_iteration(),
    };
    let Some(user_id) = workload
        .user_ids
        .user_id(fields.trajectory_id, identity, ctx.rng())
    else {
        log::error!(
            "User id strategy {:?} needs a shared iterations executor",
            workload.user_ids
        );
        return Err(VirtualUserBailError::default().into());
    };

    let spec = workload
        .mix
        .resolve(ctx.rng())
        .instantiate(ctx.rng(), user_id);
    let request = build_request(record, &spec, &workload.profile, Utc::now())?;

    // Attributed to the stage the request was issued in, not the one it completed in.
    let stage = ctx.current_stage();
    let outcome = client
        .send(&request)
        .await
        .with_stage(stage)
        .with_vu_id(ctx.vu_id());
    ctx.reporter().add_outcome(outcome);
    ctx.get_mut().dispatched += 1;

    Ok(IterationOutcome::Dispatched)
}

/// The standard location behaviour, pass it to `use_vu_behaviour`.
pub fn location_behaviour<SV: UserValuesConstraint>(
    ctx: &mut LocationContext<SV>,
) -> BoxFuture<'_, HookResult> {
    Box::pin(async move {
        run_iteration(ctx).await?;
        Ok(())
    })
}

/// Log how much this virtual user did, pass it to `use_vu_teardown`.
pub fn log_virtual_user_totals<SV: UserValuesConstraint>(
    ctx: &mut LocationContext<SV>,
) -> HookResult {
    log::debug!(
        "Virtual user {} sent {} requests and skipped {} iterations",
        ctx.vu_id(),
        ctx.get().dispatched(),
        ctx.get().skipped()
    );
    Ok(())
}
