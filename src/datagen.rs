//! Synthetic sales data generator.
//!
//! Seeded and fully deterministic, so generated fixtures are reproducible.
//! Not on the aggregation hot path; this exists to produce realistic input
//! files for the pipeline.

use crate::columns;
use crate::error::{Result, SalesError};
use chrono::{Duration, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Catalogue sampled for generated rows: stock code, description, unit price.
const SEED_ITEMS: &[(&str, &str, f64)] = &[
    ("22180", "RETROSPOT LAMP", 19.96),
    ("23017", "APOTHECARY JAR", 24.96),
    ("84732D", "IVORY STRING CURTAIN WITH POLE", 0.39),
    ("85123A", "WHITE HANGING HEART T-LIGHT HOLDER", 2.55),
    ("22423", "REGENCY CAKESTAND 3 TIER", 12.75),
    ("47566", "PARTY BUNTING", 4.95),
    ("20725", "LUNCH BAG RED RETROSPOT", 1.65),
    ("23084", "RABBIT NIGHT LIGHT", 2.08),
    ("22556", "PLASTERS IN TIN CIRCUS PARADE", 1.65),
    ("21754", "HOME BUILDING BLOCK WORD", 5.95),
];

const COUNTRIES: &[(&str, f64)] = &[
    ("United States", 0.2),
    ("China", 0.05),
    ("Japan", 0.05),
    ("Germany", 0.1),
    ("India", 0.1),
    ("United Kingdom", 0.2),
    ("France", 0.1),
    ("Canada", 0.1),
    ("Russia", 0.05),
    ("Italy", 0.05),
];

/// Weights for quantities 1 through 10; small orders dominate.
const QUANTITY_WEIGHTS: [f64; 10] = [0.2, 0.2, 0.25, 0.11, 0.08, 0.07, 0.03, 0.03, 0.02, 0.01];

const DATE_FORMAT: &str = "%Y/%m/%d";

pub struct DataGenerator {
    rng: StdRng,
    country_dist: WeightedIndex<f64>,
    quantity_dist: WeightedIndex<f64>,
}

impl DataGenerator {
    pub fn new(seed: u64) -> Result<Self> {
        let country_dist = WeightedIndex::new(COUNTRIES.iter().map(|(_, w)| *w))
            .map_err(|e| SalesError::Datagen(e.to_string()))?;
        let quantity_dist = WeightedIndex::new(QUANTITY_WEIGHTS)
            .map_err(|e| SalesError::Datagen(e.to_string()))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            country_dist,
            quantity_dist,
        })
    }

    /// Write `sales_<year>.csv` files for `file_count` consecutive years
    /// starting at `start_year`, each with `rows_per_file` data rows.
    pub fn generate(
        &mut self,
        dir: &Path,
        start_year: i32,
        file_count: u32,
        rows_per_file: u64,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut paths = Vec::with_capacity(file_count as usize);
        for year in start_year..start_year + file_count as i32 {
            paths.push(self.generate_year_file(dir, year, rows_per_file)?);
        }
        Ok(paths)
    }

    /// One year's file: header plus `rows` generated records.
    pub fn generate_year_file(&mut self, dir: &Path, year: i32, rows: u64) -> Result<PathBuf> {
        let path = dir.join(format!("sales_{year}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(columns::ALL)?;

        for _ in 0..rows {
            let (stock_code, description, unit_price) =
                SEED_ITEMS[self.rng.gen_range(0..SEED_ITEMS.len())];
            let quantity = 1 + self.quantity_dist.sample(&mut self.rng);
            let total_price = unit_price * quantity as f64;
            let country = COUNTRIES[self.country_dist.sample(&mut self.rng)].0;
            // Deterministic invoice ids come from the seeded rng, not the
            // system entropy source.
            let invoice_no = Uuid::from_u128(self.rng.gen()).to_string();
            let date = self.random_date(year);

            writer.write_record([
                stock_code,
                description,
                unit_price.to_string().as_str(),
                quantity.to_string().as_str(),
                total_price.to_string().as_str(),
                country,
                invoice_no.as_str(),
                date.as_str(),
            ])?;
        }
        writer.flush()?;

        info!("Generated {} with {} rows", path.display(), rows);
        Ok(path)
    }

    /// A random date within `year`, formatted for the Date column.
    fn random_date(&mut self, year: i32) -> String {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default();
        let date = start + Duration::days(self.rng.gen_range(0..365));
        date.format(DATE_FORMAT).to_string()
    }
}
