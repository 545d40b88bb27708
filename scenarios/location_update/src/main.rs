use geo_tunnel_http_runner::prelude::*;
use std::time::Duration;

const USER_POOL: u32 = 100_000;

fn updates(profile: BackendProfile, random_bearing: bool) -> GeoTunnelResult<LocationWorkload> {
    let mix = WeightedMix::uniform(vec![OperationTemplate::Write { random_bearing }])?;

    Ok(LocationWorkload::new(profile, mix)
        .with_user_ids(UserIdStrategy::RandomPool { size: USER_POOL })
        .with_pacing(Duration::from_millis(100)))
}

fn rdbms() -> GeoTunnelResult<LocationWorkload> {
    updates(
        BackendProfile::rdbms()
            .with_service_type(ServiceType::Fixed("RDBMS".to_string()))
            .with_telemetry(Telemetry::zero()),
        false,
    )
}

fn kafka() -> GeoTunnelResult<LocationWorkload> {
    updates(
        BackendProfile::kafka()
            .with_service_type(ServiceType::Fixed("KAFKA".to_string()))
            .with_telemetry(Telemetry::zero())
            .with_timestamp(TimestampFormat::WallClockMillis),
        false,
    )
}

/// Drivers on the move, with a ten times shorter pause than the other backends.
fn redis_streams() -> GeoTunnelResult<LocationWorkload> {
    let profile = BackendProfile::redis_streams()
        .with_write(Route::new(
            "/redis/update",
            200,
            Payload::Json(PayloadShape::raw_ping("stress-test", "android")),
        ))
        .with_telemetry(Telemetry::Fixed {
            speed: 50.0,
            bearing: 0.0,
            accuracy: 1.0,
        })
        .with_timestamp(TimestampFormat::WallClockMillis);

    Ok(updates(profile, true)?.with_pacing(Duration::from_millis(10)))
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

fn main() -> GeoTunnelResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<LocationRunnerContext, LocationUserContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_stages(&[
            Stage::new(Duration::from_secs(30), 200),
            Stage::new(Duration::from_secs(120), 200),
            Stage::new(Duration::from_secs(30), 0),
        ])
        .use_setup(setup)
        .use_vu_behaviour(location_behaviour)
        .use_vu_teardown(log_virtual_user_totals);

    run(builder)?;

    Ok(())
}
