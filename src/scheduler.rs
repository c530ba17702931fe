//! Batch Scheduler - balanced partitioning and parallel fan-out.
//!
//! `partition` is a pure function so the balancing rules are testable without
//! spawning anything. `run_all` launches one OS thread per batch; the file
//! scanning inside a worker is blocking, synchronous work that wants true
//! parallelism rather than cooperative interleaving.

use crate::columns;
use crate::engine::{DataProcessor, ProgressSink};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// Aggregate output for one input file.
///
/// `revenue_per_region` keys are exactly the distinct grouping values seen in
/// the file; their sum equals `total_revenue` up to floating-point tolerance.
#[derive(Debug, Clone, Serialize)]
pub struct SalesInformation {
    pub total_revenue: f64,
    pub revenue_per_region: BTreeMap<String, f64>,
    pub file_name: String,
}

/// Split `file_paths` into at most `worker_count` batches.
///
/// With `worker_count >= len` every file gets its own singleton batch.
/// Otherwise files are cut into `worker_count` contiguous groups of
/// `floor(len / worker_count)` and the remainder is dealt one per batch to
/// the first batches, so sizes differ by at most one. Every input file lands
/// in exactly one batch. A `worker_count` of zero is treated as one.
pub fn partition(file_paths: &[PathBuf], worker_count: usize) -> Vec<Vec<PathBuf>> {
    let worker_count = worker_count.max(1);
    if worker_count >= file_paths.len() {
        return file_paths.iter().map(|path| vec![path.clone()]).collect();
    }

    let base = file_paths.len() / worker_count;
    let mut batches: Vec<Vec<PathBuf>> = file_paths
        .chunks(base)
        .take(worker_count)
        .map(|chunk| chunk.to_vec())
        .collect();

    for (i, path) in file_paths[base * worker_count..].iter().enumerate() {
        batches[i].push(path.clone());
    }
    batches
}

/// Full aggregation of one sales file: per-column stats on the price columns,
/// the revenue total, and revenue grouped by country.
pub fn sales_information(
    path: &Path,
    delimiter: u8,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<SalesInformation> {
    let dp = DataProcessor::new(path, delimiter, progress)?;

    let stats = dp.describe(&[columns::UNIT_PRICE, columns::TOTAL_PRICE])?;
    for (column, summary) in &stats {
        info!(
            "{} {}: count={} min={:?} max={:?} mean={:?} std={:?}",
            dp.file_name(),
            column,
            summary.count,
            summary.min,
            summary.max,
            summary.mean,
            summary.std_dev
        );
    }

    let total_revenue = dp.aggregate_total(columns::TOTAL_PRICE)?;
    let revenue_per_region = dp.aggregate_by_group(columns::COUNTRY, columns::TOTAL_PRICE)?;

    Ok(SalesInformation {
        total_revenue,
        revenue_per_region,
        file_name: file_stem(path),
    })
}

/// Run every batch on its own worker thread and flatten the results.
///
/// Best-effort: each file yields its own `Result`, so one unreadable file is
/// reported in place without dropping the rest of its batch or disturbing
/// sibling workers. Per-batch order is preserved in the flattened output;
/// there is no ordering guarantee across batches.
pub fn run_all(
    batches: Vec<Vec<PathBuf>>,
    delimiter: u8,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Vec<Result<SalesInformation>> {
    let mut handles = Vec::with_capacity(batches.len());
    for (batch_no, batch) in batches.into_iter().enumerate() {
        let progress = progress.clone();
        handles.push(thread::spawn(move || {
            info!("Worker {} starting on {} file(s)", batch_no, batch.len());
            batch
                .iter()
                .map(|path| {
                    let result = sales_information(path, delimiter, progress.clone());
                    if let Err(e) = &result {
                        error!("Worker {} failed on {}: {}", batch_no, path.display(), e);
                    }
                    result
                })
                .collect::<Vec<_>>()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(batch_results) => results.extend(batch_results),
            Err(_) => error!("A worker thread panicked; its batch produced no results"),
        }
    }
    results
}

/// File name without its extension, matching the name used in aggregate
/// output objects.
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
