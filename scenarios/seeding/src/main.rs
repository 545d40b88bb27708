use geo_tunnel_http_runner::prelude::*;
use std::time::Duration;

/// One write for each of `user_0` to `user_99999`, so that the mixed scenarios find the users
/// they look up.
const USERS: u64 = 100_000;

fn seed(profile: BackendProfile, user_ids: UserIdStrategy) -> GeoTunnelResult<LocationWorkload> {
    Ok(LocationWorkload::new(
        profile.with_telemetry(Telemetry::zero()),
        WeightedMix::uniform(vec![OperationTemplate::write()])?,
    )
    .with_user_ids(user_ids)
    .with_pacing(Duration::ZERO))
}

fn rdbms() -> GeoTunnelResult<LocationWorkload> {
    seed(
        BackendProfile::rdbms().with_service_type(ServiceType::Fixed("RDBMS".to_string())),
        UserIdStrategy::GlobalIteration,
    )
}

fn kafka() -> GeoTunnelResult<LocationWorkload> {
    seed(
        BackendProfile::kafka()
            .with_service_type(ServiceType::Fixed("KAFKA".to_string()))
            .with_timestamp(TimestampFormat::WallClockMillis),
        UserIdStrategy::GlobalIteration,
    )
}

// TODO switch to GlobalIteration once the stream consumer has been checked against ids from
//      every virtual user, with per virtual user iteration counts the ids overlap.
fn redis_streams() -> GeoTunnelResult<LocationWorkload> {
    seed(
        BackendProfile::redis_streams()
            .with_write(Route::new(
                "/redis/update",
                200,
                Payload::Json(PayloadShape::raw_ping("driving", "android")),
            ))
            .with_timestamp(TimestampFormat::WallClockMillis),
        UserIdStrategy::LocalIteration,
    )
}

fn setup(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
    let workload = select_workload(
        ctx,
        &[
            ("rdbms", rdbms),
            ("kafka", kafka),
            ("redis_streams", redis_streams),
        ],
    )?;
    configure_workload(ctx, workload)?;
    Ok(())
}

/// Virtual users and maximum duration for seeding `backend`. The relational store takes fewer
/// concurrent writers and more time.
fn seeding_executor(backend: Option<&str>) -> (usize, Duration) {
    match backend {
        Some("kafka") | Some("redis_streams") => (100, Duration::from_secs(5 * 60)),
        // rdbms, which is also the default backend.
        _ => (50, Duration::from_secs(10 * 60)),
    }
}

fn main() -> GeoTunnelResult<()> {
    let cli = init();
    let (vus, max_duration) = seeding_executor(cli.backend.as_deref());

    let builder = ScenarioDefinitionBuilder::<LocationRunnerContext, LocationUserContext>::new(
        env!("CARGO_PKG_NAME"),
        cli,
    )
    .with_shared_iterations(vus, USERS, max_duration)
    .use_setup(setup)
    .use_vu_behaviour(location_behaviour)
    .use_vu_teardown(log_virtual_user_totals);

    run(builder)?;

    Ok(())
}
