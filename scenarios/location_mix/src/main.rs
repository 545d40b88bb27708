use geo_tunnel_http_runner::prelude::*;
use std::time::Duration;

/// 80% location updates, the rest split evenly between range, nearest neighbour and polygon
/// searches around the sampled position.
fn mix(range: Radius) -> GeoTunnelResult<WeightedMix<OperationTemplate>> {
    let reads = WeightedMix::uniform(vec![
        OperationTemplate::range(RadiusTemplate::Fixed(range)),
        OperationTemplate::knn(CountTemplate::Fixed(5)),
        OperationTemplate::pip(0.01, PipAnchor::Center),
    ])?;

    Ok(WeightedMix::builder()
        .with(0.8, OperationTemplate::write())
        .with_nested(0.2, reads)
        .build()?)
}

fn rdbms() -> GeoTunnelResult<LocationWorkload> {
    Ok(LocationWorkload::new(
        BackendProfile::rdbms(),
        mix(Radius::Metres(5000))?,
    ))
}

fn kafka() -> GeoTunnelResult<LocationWorkload> {
    Ok(
        LocationWorkload::new(BackendProfile::kafka(), mix(Radius::Metres(5000))?)
            .with_pacing(Duration::from_millis(100)),
    )
}

fn redis_streams() -> GeoTunnelResult<LocationWorkload> {
    // The stream consumer takes its radius in kilometres.
    Ok(LocationWorkload::new(
        BackendProfile::redis_streams(),
        mix(Radius::Kilometres(5.0))?,
    ))
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
        .with_graceful_ramp_down(Duration::from_secs(30))
        .use_setup(setup)
        .use_vu_behaviour(location_behaviour)
        .use_vu_teardown(log_virtual_user_totals);

    run(builder)?;

    Ok(())
}
