//! Aggregation Engine - single sequential passes over one sales file.
//!
//! A `DataProcessor` is constructed per file: construction reads the header
//! and pre-counts data rows with one full scan, so progress percentages can
//! be derived later. Each aggregation operation then makes one fresh
//! forward-only pass, optionally reporting its progress into an injected
//! `ProgressSink` every `PROGRESS_EVERY_ROWS` rows.

use crate::error::Result;
use crate::reader::{read_column_names, RowReader};
use crate::stats::{ColumnStats, Stats};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Fixed textual timestamp format used in the progress store (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rows between successive percentage updates.
const PROGRESS_EVERY_ROWS: u64 = 10_000;

/// Fields recorded when a tracked job starts.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub process_id: String,
    pub start_time: String,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub description: Option<String>,
}

/// Capability for recording job progress.
///
/// The job registry implements this; handing the engine `None` instead
/// disables tracking without changing any aggregation behavior.
pub trait ProgressSink: Send + Sync {
    fn insert(&self, job: &NewJob) -> Result<()>;
    fn update_percentage(&self, process_id: &str, percentage: f64) -> Result<()>;
    fn update_end_time(&self, process_id: &str, end_time: &str) -> Result<()>;
}

pub struct DataProcessor {
    path: PathBuf,
    file_name: String,
    delimiter: u8,
    columns: Arc<Vec<String>>,
    row_count: u64,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl DataProcessor {
    /// Open `path`, read its header, and pre-count data rows with one full
    /// scan. The scan cost is paid once here, not per aggregation call.
    pub fn new(
        path: impl AsRef<Path>,
        delimiter: u8,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let columns = Arc::new(read_column_names(&path, delimiter)?);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut row_count = 0u64;
        for record in RowReader::open(&path, delimiter, Arc::clone(&columns))? {
            record?;
            row_count += 1;
        }
        info!(
            "Opened {} with {} columns and {} data rows",
            file_name,
            columns.len(),
            row_count
        );

        Ok(Self {
            path,
            file_name,
            delimiter,
            columns,
            row_count,
            progress,
        })
    }

    /// Number of data rows, established at construction.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Per-column distribution summaries, one sequential pass.
    pub fn describe(&self, column_names: &[&str]) -> Result<HashMap<String, ColumnStats>> {
        let process_id = self.start_job("describe")?;

        let mut stats: HashMap<String, Stats> = column_names
            .iter()
            .map(|&name| (name.to_string(), Stats::new()))
            .collect();

        let mut rows_processed = 0u64;
        for record in self.reader()? {
            let record = record?;
            self.report_progress(process_id.as_deref(), rows_processed)?;
            for (name, acc) in stats.iter_mut() {
                if let Some(raw) = record.get(name) {
                    acc.update(raw);
                }
            }
            rows_processed += 1;
        }

        self.finish_job(process_id.as_deref())?;
        Ok(stats
            .into_iter()
            .map(|(name, acc)| (name, acc.snapshot()))
            .collect())
    }

    /// Sum of the successfully-parsed values of `column_name` across all
    /// rows. Unparseable cells contribute zero rather than failing the pass.
    pub fn aggregate_total(&self, column_name: &str) -> Result<f64> {
        let process_id = self.start_job("aggregate_total")?;

        let mut total = 0.0;
        let mut rows_processed = 0u64;
        for record in self.reader()? {
            let record = record?;
            self.report_progress(process_id.as_deref(), rows_processed)?;
            if let Some(val) = record.get(column_name).and_then(to_float) {
                total += val;
            }
            rows_processed += 1;
        }

        self.finish_job(process_id.as_deref())?;
        Ok(total)
    }

    /// Totals of `value_column` keyed by the raw `group_column` value.
    ///
    /// Every distinct group value observed becomes a key, initialized to
    /// zero before its first addition.
    pub fn aggregate_by_group(
        &self,
        group_column: &str,
        value_column: &str,
    ) -> Result<BTreeMap<String, f64>> {
        let process_id = self.start_job("aggregate_by_group")?;

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        let mut rows_processed = 0u64;
        for record in self.reader()? {
            let record = record?;
            self.report_progress(process_id.as_deref(), rows_processed)?;
            if let Some(key) = record.get(group_column) {
                let entry = totals.entry(key.to_string()).or_insert(0.0);
                if let Some(val) = record.get(value_column).and_then(to_float) {
                    *entry += val;
                }
            }
            rows_processed += 1;
        }

        self.finish_job(process_id.as_deref())?;
        Ok(totals)
    }

    /// A pass is not restartable; every operation opens a fresh reader.
    fn reader(&self) -> Result<RowReader> {
        RowReader::open(&self.path, self.delimiter, Arc::clone(&self.columns))
    }

    /// Register a job for `operation` and return its process id, if a sink
    /// is attached.
    fn start_job(&self, operation: &str) -> Result<Option<String>> {
        let Some(sink) = &self.progress else {
            return Ok(None);
        };

        let process_id = Uuid::new_v4().to_string();
        sink.insert(&NewJob {
            process_id: process_id.clone(),
            start_time: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            file_name: Some(self.file_name.clone()),
            file_path: Some(self.path.display().to_string()),
            description: Some(operation.to_string()),
        })?;
        Ok(Some(process_id))
    }

    fn report_progress(&self, process_id: Option<&str>, rows_processed: u64) -> Result<()> {
        let (Some(sink), Some(id)) = (&self.progress, process_id) else {
            return Ok(());
        };
        // Empty files never report intermediate progress (no dividing by zero).
        if self.row_count == 0 || rows_processed % PROGRESS_EVERY_ROWS != 0 {
            return Ok(());
        }
        sink.update_percentage(id, 100.0 * rows_processed as f64 / self.row_count as f64)
    }

    fn finish_job(&self, process_id: Option<&str>) -> Result<()> {
        let (Some(sink), Some(id)) = (&self.progress, process_id) else {
            return Ok(());
        };
        sink.update_percentage(id, 100.0)?;
        sink.update_end_time(id, &Utc::now().format(TIMESTAMP_FORMAT).to_string())
    }
}

fn to_float(raw: &str) -> Option<f64> {
    raw.trim().parse().ok()
}
