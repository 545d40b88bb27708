use geo_tunnel_http_runner::prelude::*;
use std::time::Duration;

const USER_POOL: u32 = 100_000;

fn mix(first: OperationTemplate, range: RadiusTemplate) -> GeoTunnelResult<WeightedMix<OperationTemplate>> {
    Ok(WeightedMix::builder()
        .with(0.33, first)
        .with(0.33, OperationTemplate::range(range))
        .with(
            0.34,
            OperationTemplate::knn(CountTemplate::Uniform { min: 10, max: 50 }),
        )
        .build()?)
}

fn search(path: &str, shape: PayloadShape, parameter: &str) -> Route {
    Route::new(path, 200, Payload::Json(shape)).with_parameter(parameter)
}

fn rdbms() -> GeoTunnelResult<LocationWorkload> {
    let profile = BackendProfile::rdbms()
        .with_service_type(ServiceType::Fixed("RDBMS".to_string()))
        .with_range(search("/search/range", PayloadShape::SearchCenter, "radius"))
        .with_knn(search("/search/knn", PayloadShape::SearchCenter, "n"));

    Ok(LocationWorkload::new(
        profile,
        mix(
            OperationTemplate::point(USER_POOL),
            RadiusTemplate::UniformMetres { min: 500, max: 5000 },
        )?,
    )
    .with_pacing(Duration::from_millis(100)))
}

/// The in-memory index has no point lookup, polygon searches take its place.
fn kafka() -> GeoTunnelResult<LocationWorkload> {
    let profile = BackendProfile::kafka()
        .with_service_type(ServiceType::Fixed("KAFKA".to_string()))
        .with_range(search("/search/redis/range", PayloadShape::SearchCenter, "radiusMeter"))
        .with_knn(search("/search/redis/knn", PayloadShape::SearchCenter, "n"))
        .with_pip(Route::new(
            "/search/redis/pip",
            200,
            Payload::Polygon {
                encoding: PolygonEncoding::CoordinateListsBody,
                closed_ring: false,
            },
        ));

    Ok(LocationWorkload::new(
        profile,
        mix(
            OperationTemplate::pip(0.05, PipAnchor::Corner),
            RadiusTemplate::UniformMetres { min: 500, max: 5000 },
        )?,
    )
    .with_pacing(Duration::from_millis(100)))
}

fn redis_streams() -> GeoTunnelResult<LocationWorkload> {
    let ping = PayloadShape::raw_ping("searching", "test-client");
    let profile = BackendProfile::redis_streams()
        .with_telemetry(Telemetry::zero())
        .with_timestamp(TimestampFormat::WallClockMillis)
        .with_point(Route::new("/point", 200, Payload::Json(ping.clone())))
        .with_range(search("/range", ping.clone(), "radius"))
        .with_knn(search("/knn", ping, "n"));

    Ok(LocationWorkload::new(
        profile,
        mix(
            OperationTemplate::point(USER_POOL),
            RadiusTemplate::UniformKilometres { min: 1.0, max: 5.0 },
        )?,
    )
    .with_pacing(Duration::from_millis(100)))
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
