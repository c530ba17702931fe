use salescope::datagen::DataGenerator;
use salescope::engine::ProgressSink;
use salescope::registry::JobRegistry;
use salescope::scheduler::{partition, run_all};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "salescope")]
#[command(about = "Streaming aggregation over delimited sales files with tracked progress")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate every CSV file under a data directory
    Run {
        /// Directory scanned for *.csv input files
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Number of parallel workers
        #[arg(short, long, default_value_t = 4)]
        workers: usize,

        /// Field delimiter (single ASCII character)
        #[arg(long, default_value_t = ',')]
        delimiter: char,

        /// SQLite progress store shared with the server
        #[arg(long, env = "SALESCOPE_DB", default_value = "processes.sqlite")]
        db: PathBuf,

        /// Folder receiving one <file>.json aggregate per input file
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Disable job tracking entirely
        #[arg(long)]
        no_progress: bool,
    },
    /// Generate synthetic sales CSV files
    Generate {
        /// Directory the generated files are written to
        #[arg(short, long, default_value = "data")]
        out_dir: PathBuf,

        /// First year; files are named sales_<year>.csv for consecutive years
        #[arg(long, default_value_t = 2015)]
        start_year: i32,

        /// Number of files to generate
        #[arg(short, long, default_value_t = 3)]
        files: u32,

        /// Data rows per file
        #[arg(short, long, default_value_t = 10_000)]
        rows: u64,

        /// Seed for the deterministic generator
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Print every tracked job in the progress store
    Jobs {
        /// SQLite progress store to read
        #[arg(long, env = "SALESCOPE_DB", default_value = "processes.sqlite")]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Commands::Run {
            data_dir,
            workers,
            delimiter,
            db,
            output_dir,
            no_progress,
        } => run(data_dir, workers, delimiter, db, output_dir, no_progress),
        Commands::Generate {
            out_dir,
            start_year,
            files,
            rows,
            seed,
        } => {
            let paths = DataGenerator::new(seed)?.generate(&out_dir, start_year, files, rows)?;
            info!("Generated {} file(s) under {}", paths.len(), out_dir.display());
            Ok(())
        }
        Commands::Jobs { db } => {
            let registry = JobRegistry::open(&db)?;
            let jobs = registry.read_all()?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(())
        }
    }
}

fn run(
    data_dir: PathBuf,
    workers: usize,
    delimiter: char,
    db: PathBuf,
    output_dir: PathBuf,
    no_progress: bool,
) -> Result<()> {
    if !delimiter.is_ascii() {
        anyhow::bail!("delimiter must be a single ASCII character");
    }

    let files = discover_csv_files(&data_dir)?;
    if files.is_empty() {
        anyhow::bail!("no .csv files found under {}", data_dir.display());
    }
    info!(
        "Aggregating {} file(s) across {} worker(s)",
        files.len(),
        workers
    );

    let progress: Option<Arc<dyn ProgressSink>> = if no_progress {
        None
    } else {
        Some(Arc::new(JobRegistry::open(&db)?))
    };

    let save_folder = output_dir.join(Local::now().format("%B %d %Y %H-%M-%S").to_string());
    fs::create_dir_all(&save_folder)?;

    let batches = partition(&files, workers);
    let results = run_all(batches, delimiter as u8, progress);

    let mut failures = 0usize;
    for result in &results {
        match result {
            Ok(info) => {
                let path = save_folder.join(format!("{}.json", info.file_name));
                fs::write(&path, serde_json::to_string(info)?)?;
            }
            Err(e) => {
                failures += 1;
                error!("File failed to aggregate: {}", e);
            }
        }
    }

    info!(
        "Wrote {} aggregate(s) to {} ({} failure(s))",
        results.len() - failures,
        save_folder.display(),
        failures
    );
    Ok(())
}

/// Non-recursive listing of the CSV files in `dir`, in name order so batch
/// assignment is stable run to run.
fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
