//! End-to-end run of the aggregation pipeline: generated input files,
//! partitioned batches, parallel workers, and a shared on-disk progress
//! store, checked against independently computed reference sums.

use salescope::columns;
use salescope::datagen::DataGenerator;
use salescope::engine::ProgressSink;
use salescope::registry::JobRegistry;
use salescope::scheduler::{partition, run_all};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Reference totals computed with plain line splitting, independent of the
/// streaming engine.
fn reference_totals(path: &PathBuf) -> (f64, HashMap<String, f64>) {
    let contents = std::fs::read_to_string(path).unwrap();
    let mut lines = contents.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let total_idx = header.iter().position(|c| *c == columns::TOTAL_PRICE).unwrap();
    let country_idx = header.iter().position(|c| *c == columns::COUNTRY).unwrap();

    let mut total = 0.0;
    let mut by_country: HashMap<String, f64> = HashMap::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        let value: f64 = fields[total_idx].parse().unwrap();
        total += value;
        *by_country.entry(fields[country_idx].to_string()).or_insert(0.0) += value;
    }
    (total, by_country)
}

#[test]
fn test_full_pipeline_with_shared_progress_store() {
    let data_dir = tempfile::tempdir().unwrap();
    let files = DataGenerator::new(42)
        .unwrap()
        .generate(data_dir.path(), 2015, 5, 200)
        .unwrap();

    let db_dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(JobRegistry::open(db_dir.path().join("processes.sqlite")).unwrap());
    let sink: Arc<dyn ProgressSink> = registry.clone();

    let batches = partition(&files, 2);
    assert_eq!(batches.len(), 2);
    let mut sizes: Vec<_> = batches.iter().map(|b| b.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, [2, 3]);

    let results = run_all(batches, b',', Some(sink));
    assert_eq!(results.len(), 5);

    for result in &results {
        let info = result.as_ref().unwrap();
        let source = files
            .iter()
            .find(|path| {
                path.file_stem().unwrap().to_string_lossy() == info.file_name
            })
            .unwrap();
        let (expected_total, expected_by_country) = reference_totals(source);

        assert!((info.total_revenue - expected_total).abs() < 1e-6);
        assert_eq!(info.revenue_per_region.len(), expected_by_country.len());
        for (country, expected) in &expected_by_country {
            assert!((info.revenue_per_region[country] - expected).abs() < 1e-6);
        }

        let region_sum: f64 = info.revenue_per_region.values().sum();
        assert!((region_sum - info.total_revenue).abs() < 1e-6);
    }

    // Three tracked operations per file, all completed.
    let jobs = registry.read_all().unwrap();
    assert_eq!(jobs.len(), 15);
    for job in &jobs {
        assert_eq!(job.percentage, Some(100.0));
        assert!(job.end_time.is_some());
        assert!(job.time_taken >= 0.0);
    }
    let described = jobs
        .iter()
        .filter(|j| j.description.as_deref() == Some("describe"))
        .count();
    assert_eq!(described, 5);
}

#[test]
fn test_unreadable_file_fails_alone() {
    let data_dir = tempfile::tempdir().unwrap();
    let mut files = DataGenerator::new(7)
        .unwrap()
        .generate(data_dir.path(), 2019, 2, 50)
        .unwrap();
    files.push(data_dir.path().join("not_there.csv"));

    let registry = Arc::new(JobRegistry::open_in_memory().unwrap());
    let sink: Arc<dyn ProgressSink> = registry.clone();

    let results = run_all(partition(&files, 1), b',', Some(sink));

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);

    // The failed file never opened, so it registered no jobs.
    let jobs = registry.read_all().unwrap();
    assert_eq!(jobs.len(), 6);
    assert!(jobs.iter().all(|j| j.end_time.is_some()));
}

#[test]
fn test_concurrent_workers_share_one_store() {
    let data_dir = tempfile::tempdir().unwrap();
    let files = DataGenerator::new(11)
        .unwrap()
        .generate(data_dir.path(), 2016, 4, 100)
        .unwrap();

    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("processes.sqlite");

    // Each worker thread writes through the same file-backed store handle.
    let registry = Arc::new(JobRegistry::open(&db_path).unwrap());
    let sink: Arc<dyn ProgressSink> = registry.clone();
    let results = run_all(partition(&files, 4), b',', Some(sink));
    assert!(results.iter().all(|r| r.is_ok()));

    // A fresh handle, as the broadcast server would open one, sees all rows.
    let reader = JobRegistry::open(&db_path).unwrap();
    let jobs = reader.read_all().unwrap();
    assert_eq!(jobs.len(), 12);
    assert!(jobs.iter().all(|j| j.percentage == Some(100.0)));
}
