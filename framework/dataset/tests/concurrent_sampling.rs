use geo_tunnel_dataset::prelude::{DataLoadError, Dataset};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use std::sync::Arc;

fn write_dataset(rows: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "trj_id,driving_mode,osname,pingtimestamp,rawlat,rawlng,speed,bearing,accuracy"
    )
    .unwrap();
    for i in 0..rows {
        writeln!(
            file,
            "{},{},android,{},{},{},{},{},3.9",
            70_000 + i,
            if i % 2 == 0 { "car" } else { "motorcycle" },
            1_554_737_720 + i,
            -6.2 - (i as f64) * 1e-4,
            106.8 + (i as f64) * 1e-4,
            (i % 20) as f64 * 0.5,
            i % 360,
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn load_from_file() {
    let file = write_dataset(100);
    let dataset = Dataset::load(file.path()).unwrap();

    assert_eq!(100, dataset.len());
    assert_eq!(0, dataset.dropped());

    let first = dataset.get(0).unwrap();
    pretty_assertions::assert_eq!(Some("70000".to_string()), first.trajectory_id);
    assert_eq!(Some(1_554_737_720), first.timestamp);
    assert_eq!(Some("car".to_string()), first.driving_mode);
}

#[test]
fn missing_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Dataset::load(dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, DataLoadError::NotFound { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_sampling_returns_complete_records() {
    let file = write_dataset(500);
    let dataset = Arc::new(Dataset::load(file.path()).unwrap());

    let mut handles = Vec::with_capacity(1_000);
    for task in 0..1_000u64 {
        let dataset = dataset.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(task);
            for _ in 0..10_000 {
                let record = dataset.sample(&mut rng);
                let required = record.required().expect("sampled an incomplete record");
                assert!(!required.trajectory_id.is_empty());
                assert!(required.latitude < 0.0);
                assert!(required.longitude > 100.0);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}
