use geo_tunnel_http_runner::prelude::*;
use std::time::Duration;

/// Size of the user pool that `seeding` fills.
const USER_POOL: u32 = 100_000;

/// 90% updates to users from the seeded pool, 10% point, range and nearest neighbour searches.
fn mix(range: RadiusTemplate) -> GeoTunnelResult<WeightedMix<OperationTemplate>> {
    let reads = WeightedMix::builder()
        .with(0.33, OperationTemplate::point(USER_POOL))
        .with(0.33, OperationTemplate::range(range))
        .with(
            0.34,
            OperationTemplate::knn(CountTemplate::Uniform { min: 10, max: 50 }),
        )
        .build()?;

    Ok(WeightedMix::builder()
        .with(0.9, OperationTemplate::write())
        .with_nested(0.1, reads)
        .build()?)
}

fn workload(profile: BackendProfile, range: RadiusTemplate) -> GeoTunnelResult<LocationWorkload> {
    Ok(LocationWorkload::new(profile, mix(range)?)
        .with_user_ids(UserIdStrategy::RandomPool { size: USER_POOL })
        .with_pacing(Duration::from_millis(100)))
}

fn search(path: &str, shape: PayloadShape, parameter: &str) -> Route {
    Route::new(path, 200, Payload::Json(shape)).with_parameter(parameter)
}

fn rdbms() -> GeoTunnelResult<LocationWorkload> {
    let profile = BackendProfile::rdbms()
        .with_service_type(ServiceType::Fixed("RDBMS".to_string()))
        .with_telemetry(Telemetry::zero())
        .with_range(search("/search/range", PayloadShape::SearchCenter, "radius"))
        .with_knn(search("/search/knn", PayloadShape::SearchCenter, "n"));

    workload(profile, RadiusTemplate::UniformMetres { min: 500, max: 5000 })
}

fn kafka() -> GeoTunnelResult<LocationWorkload> {
    let profile = BackendProfile::kafka()
        .with_service_type(ServiceType::Fixed("KAFKA".to_string()))
        .with_telemetry(Telemetry::zero())
        .with_timestamp(TimestampFormat::WallClockMillis)
        .with_range(search("/search/redis/range", PayloadShape::SearchCenter, "radius"))
        .with_knn(search("/search/redis/knn", PayloadShape::SearchCenter, "n"));

    workload(profile, RadiusTemplate::UniformMetres { min: 500, max: 5000 })
}

fn redis_streams() -> GeoTunnelResult<LocationWorkload> {
    let ping = PayloadShape::raw_ping("mixed-test", "android");
    let profile = BackendProfile::redis_streams()
        .with_telemetry(Telemetry::zero())
        .with_timestamp(TimestampFormat::WallClockMillis)
        .with_write(Route::new("/redis/update", 200, Payload::Json(ping.clone())))
        .with_point(Route::new("/point", 200, Payload::Json(ping.clone())))
        .with_range(search("/range", ping.clone(), "radius"))
        .with_knn(search("/knn", ping, "n"));

    workload(
        profile,
        RadiusTemplate::UniformKilometres {
            min: 1.0,
            max: 10.0,
        },
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
