use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use geo_tunnel_http_runner::prelude::*;
use tokio::runtime::Runtime;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

type Builder = ScenarioDefinitionBuilder<LocationRunnerContext, LocationUserContext>;

fn cli(server: &MockServer, backend: &str) -> GeoTunnelScenarioCli {
    GeoTunnelScenarioCli {
        backend: Some(backend.to_string()),
        dataset: None,
        connection_string: Some(server.uri()),
        vus: None,
        duration: None,
        iterations: None,
        no_progress: true,
        reporter: ReporterOpt::Noop,
        outcomes_path: None,
        run_summary_path: None,
        run_id: None,
    }
}

fn records() -> Dataset {
    Dataset::from_records(vec![
        Record::new("70124", 1.3, 103.8)
            .with_speed(10.0)
            .with_accuracy(3.9)
            .with_driving_mode("car"),
        Record::new("70125", 1.31, 103.81)
            .with_speed(4.5)
            .with_accuracy(8.0)
            .with_driving_mode("motorcycle"),
    ])
    .unwrap()
}

fn location_mix() -> GeoTunnelResult<WeightedMix<OperationTemplate>> {
    let mix = WeightedMix::builder()
        .with(0.8, OperationTemplate::write())
        .with_nested(
            0.2,
            WeightedMix::uniform(vec![
                OperationTemplate::range(RadiusTemplate::Fixed(Radius::Metres(5000))),
                OperationTemplate::knn(CountTemplate::Fixed(5)),
                OperationTemplate::pip(0.01, PipAnchor::Center),
            ])?,
        )
        .build()?;
    Ok(mix)
}

fn rdbms() -> GeoTunnelResult<LocationWorkload> {
    Ok(LocationWorkload::new(BackendProfile::rdbms(), location_mix()?)
        .with_pacing(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5)))
}

fn setup(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
    let workload = select_workload(ctx, &[("rdbms", rdbms)])?;
    install_workload(ctx, workload, records())?;
    Ok(())
}

fn start_server(rt: &Runtime, responder: impl Respond + 'static) -> MockServer {
    rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(responder)
            .mount(&server)
            .await;
        server
    })
}

#[test]
fn ramp_against_a_healthy_service() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, ResponseTemplate::new(200));

    let scenario = Builder::new("ramp_against_a_healthy_service", cli(&server, "rdbms"))
        .with_stages(&[
            Stage::new(Duration::from_millis(300), 4),
            Stage::new(Duration::from_millis(600), 4),
            Stage::new(Duration::from_millis(300), 0),
        ])
        .with_tick_interval(Duration::from_millis(20))
        .use_setup(setup)
        .use_vu_behaviour(location_behaviour)
        .use_vu_teardown(log_virtual_user_totals);

    let report = run(scenario).unwrap();

    let received = rt.block_on(server.received_requests()).unwrap();
    assert!(report.total.attempts > 20, "only {} attempts", report.total.attempts);
    assert_eq!(received.len() as u64, report.total.attempts);
    assert_eq!(report.total.attempts, report.total.successes);
    assert_eq!(0, report.total.failures);
    assert_eq!(0, report.total.errors);
    assert_eq!(1.0, report.total.success_rate);
    assert_eq!(0, report.skipped_iterations);
    assert_eq!(4, report.peak_vus);
    assert!(report.operation("write").is_some());

    let write = received
        .iter()
        .find(|r| r.url.path() == "/update")
        .expect("no write was sent");
    let body: serde_json::Value = serde_json::from_slice(&write.body).unwrap();
    assert!(body["userId"].as_str().unwrap().contains("_v"));
}

#[test]
fn failures_are_not_counted_as_errors() {
    /// Every tenth request gets a server error.
    struct EveryTenthFails(AtomicUsize);

    impl Respond for EveryTenthFails {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if self.0.fetch_add(1, Ordering::SeqCst) % 10 == 9 {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200)
            }
        }
    }

    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, EveryTenthFails(AtomicUsize::new(0)));

    let scenario = Builder::new("failures_are_not_counted_as_errors", cli(&server, "rdbms"))
        .with_constant_vus(4, Duration::from_millis(800))
        .with_tick_interval(Duration::from_millis(20))
        .use_setup(setup)
        .use_vu_behaviour(location_behaviour);

    let report = run(scenario).unwrap();

    let total = &report.total;
    assert!(total.attempts >= 50, "only {} attempts", total.attempts);
    assert_eq!(0, total.errors);
    assert_eq!(total.attempts, total.successes + total.failures);
    assert_eq!(total.attempts / 10, total.failures);
    assert_eq!(Some(&total.failures), total.failure_statuses.get(&500));
}

#[test]
fn incomplete_records_are_skipped_without_an_outcome() {
    fn setup_incomplete(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
        let workload = select_workload(ctx, &[("rdbms", rdbms)])?;
        let record = Record {
            latitude: None,
            ..Record::new("70124", 1.3, 103.8).with_speed(10.0)
        };
        install_workload(ctx, workload, Dataset::from_records(vec![record])?)?;
        Ok(())
    }

    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, ResponseTemplate::new(200));

    let scenario = Builder::new(
        "incomplete_records_are_skipped_without_an_outcome",
        cli(&server, "rdbms"),
    )
    .with_constant_vus(2, Duration::from_millis(200))
    .with_tick_interval(Duration::from_millis(20))
    .use_setup(setup_incomplete)
    .use_vu_behaviour(location_behaviour);

    let report = run(scenario).unwrap();

    assert!(report.skipped_iterations > 0);
    assert_eq!(0, report.total.attempts);
    assert!(report.operations.is_empty());
    assert!(rt.block_on(server.received_requests()).unwrap().is_empty());
}

#[test]
fn seeding_sends_each_user_once() {
    fn seed() -> GeoTunnelResult<LocationWorkload> {
        Ok(LocationWorkload::new(
            BackendProfile::kafka(),
            WeightedMix::uniform(vec![OperationTemplate::write()])?,
        )
        .with_user_ids(UserIdStrategy::GlobalIteration)
        .with_pacing(Duration::ZERO))
    }

    fn setup_seed(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
        let workload = select_workload(ctx, &[("kafka", seed)])?;
        install_workload(ctx, workload, records())?;
        Ok(())
    }

    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, ResponseTemplate::new(202));

    let scenario = Builder::new("seeding_sends_each_user_once", cli(&server, "kafka"))
        .with_shared_iterations(5, 60, Duration::from_secs(30))
        .with_tick_interval(Duration::from_millis(20))
        .use_setup(setup_seed)
        .use_vu_behaviour(location_behaviour);

    let report = run(scenario).unwrap();

    assert_eq!(60, report.total.attempts);
    assert_eq!(60, report.total.successes);

    let received = rt.block_on(server.received_requests()).unwrap();
    let user_ids = received
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["userId"].as_str().unwrap().to_string()
        })
        .collect::<HashSet<_>>();
    let expected = (0..60).map(|i| format!("user_{i}")).collect::<HashSet<_>>();
    assert_eq!(expected, user_ids);
}

#[test]
fn unknown_backend_fails_before_any_traffic() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, ResponseTemplate::new(200));

    let scenario = Builder::new(
        "unknown_backend_fails_before_any_traffic",
        cli(&server, "cassandra"),
    )
    .with_constant_vus(1, Duration::from_millis(200))
    .use_setup(setup)
    .use_vu_behaviour(location_behaviour);

    let err = run(scenario).unwrap_err();

    assert_eq!(
        Some(&ConfigurationError::UnknownBackend {
            name: "cassandra".to_string(),
            available: "rdbms".to_string()
        }),
        err.downcast_ref::<ConfigurationError>()
    );
    assert!(rt.block_on(server.received_requests()).unwrap().is_empty());
}

#[test]
fn missing_dataset_fails_the_setup() {
    fn setup_from_file(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
        let workload = select_workload(ctx, &[("rdbms", rdbms)])?;
        configure_workload(ctx, workload)?;
        Ok(())
    }

    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, ResponseTemplate::new(200));
    let dir = tempfile::tempdir().unwrap();

    let mut cli = cli(&server, "rdbms");
    cli.dataset = Some(dir.path().join("missing.csv"));
    let scenario = Builder::new("missing_dataset_fails_the_setup", cli)
        .with_constant_vus(1, Duration::from_millis(200))
        .use_setup(setup_from_file)
        .use_vu_behaviour(location_behaviour);

    let err = run(scenario).unwrap_err();

    assert!(err.downcast_ref::<DataLoadError>().is_some(), "{err:?}");
}

#[test]
fn dataset_is_loaded_from_the_command_line_path() {
    fn setup_from_file(ctx: &mut RunnerContext<LocationRunnerContext>) -> HookResult {
        let workload = select_workload(ctx, &[("rdbms", rdbms)])?;
        configure_workload(ctx, workload)?;
        Ok(())
    }

    let rt = Runtime::new().unwrap();
    let server = start_server(&rt, ResponseTemplate::new(200));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posisi.csv");
    std::fs::write(
        &path,
        "trj_id,driving_mode,osname,pingtimestamp,rawlat,rawlng,speed,bearing,accuracy\n\
         70124,car,android,1554198358,1.3,103.8,10.0,90,3.9\n\
         70125,motorcycle,ios,1554198359,,103.8,4.0,90,3.9\n",
    )
    .unwrap();

    let mut cli = cli(&server, "rdbms");
    cli.dataset = Some(path);
    let scenario = Builder::new("dataset_is_loaded_from_the_command_line_path", cli)
        .with_constant_vus(2, Duration::from_millis(300))
        .with_tick_interval(Duration::from_millis(20))
        .use_setup(setup_from_file)
        .use_vu_behaviour(location_behaviour);

    let report = run(scenario).unwrap();

    // The incomplete row was dropped while loading, so nothing is skipped at run time.
    assert_eq!(0, report.skipped_iterations);
    assert!(report.total.attempts > 0);
    assert_eq!(report.total.attempts, report.total.successes);
}

#[test]
fn slow_responses_count_towards_the_stage_they_were_sent_in() {
    let rt = Runtime::new().unwrap();
    let server = start_server(
        &rt,
        ResponseTemplate::new(200).set_delay(Duration::from_millis(350)),
    );

    // One virtual user from the start, so its first request leaves at the beginning of the first
    // stage and only completes in the second one.
    let scenario = Builder::new(
        "slow_responses_count_towards_the_stage_they_were_sent_in",
        cli(&server, "rdbms"),
    )
    .with_ramping_vus(
        1,
        &[
            Stage::new(Duration::from_millis(300), 1),
            Stage::new(Duration::from_millis(300), 1),
        ],
    )
    .with_tick_interval(Duration::from_millis(20))
    .use_setup(setup)
    .use_vu_behaviour(location_behaviour);

    let report = run(scenario).unwrap();

    assert_eq!(2, report.stages.len());
    assert_eq!(1, report.stages[0].attempts);
    let latency = report.stages[0].latency.as_ref().unwrap();
    assert!(latency.p50_ms >= 350.0, "p50 {}", latency.p50_ms);
    assert!(report.stages[1].attempts >= 1);
    assert_eq!(
        report.total.attempts,
        report.stages.iter().map(|s| s.attempts).sum::<u64>()
    );
}
