//! Row Stream Reader - lazy, single-pass iteration over delimited files.
//!
//! A `RowReader` wraps one open file and yields its data rows as `Record`s,
//! front to back, exactly once. The header line is consumed at construction;
//! re-reading a file means opening a fresh reader.

use crate::error::{Result, SalesError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// One data row: the shared column list plus this row's raw field values.
///
/// Field values are raw strings; numeric coercion is the caller's concern.
#[derive(Debug, Clone)]
pub struct Record {
    columns: Arc<Vec<String>>,
    values: Vec<String>,
}

impl Record {
    /// Raw value of `column`, or `None` if the file has no such column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }

    /// Column names, in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Field values, in file order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Parse the header line of `path` into column names.
pub fn read_column_names(path: &Path, delimiter: u8) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut header = String::new();
    if BufReader::new(file).read_line(&mut header)? == 0 {
        return Err(SalesError::MissingHeader(path.display().to_string()));
    }

    Ok(header
        .trim_end_matches(['\n', '\r'])
        .split(delimiter as char)
        .map(|name| name.trim().to_string())
        .collect())
}

/// Forward-only iterator over the data rows of one delimited file.
pub struct RowReader {
    path: PathBuf,
    columns: Arc<Vec<String>>,
    records: csv::StringRecordsIntoIter<File>,
    line: u64,
}

impl RowReader {
    /// Open a reader over the data rows of `path`.
    ///
    /// The header row is consumed here; iteration yields data rows only.
    /// Quoting is disabled, so fields are split on every delimiter byte.
    pub fn open(path: &Path, delimiter: u8, columns: Arc<Vec<String>>) -> Result<Self> {
        let file = File::open(path)?;
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .trim(csv::Trim::All)
            .from_reader(file);

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            records: reader.into_records(),
            line: 1,
        })
    }

    pub fn columns(&self) -> &Arc<Vec<String>> {
        &self.columns
    }
}

impl Iterator for RowReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;

            // Rows whose field count disagrees with the header are skipped,
            // never surfaced.
            if record.len() != self.columns.len() {
                warn!(
                    "Skipping malformed row at {}:{}: expected {} fields, found {}",
                    self.path.display(),
                    self.line,
                    self.columns.len(),
                    record.len()
                );
                continue;
            }

            let values = record.iter().map(|field| field.to_string()).collect();
            return Some(Ok(Record {
                columns: Arc::clone(&self.columns),
                values,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_header_parsing() {
        let file = write_file("StockCode,UnitPrice,Country\n22180,19.96,Russia\n");
        let columns = read_column_names(file.path(), b',').unwrap();
        assert_eq!(columns, vec!["StockCode", "UnitPrice", "Country"]);
    }

    #[test]
    fn test_rows_are_raw_strings_in_order() {
        let file = write_file("a,b\n1,x\n2,y\n");
        let columns = Arc::new(read_column_names(file.path(), b',').unwrap());
        let rows: Vec<_> = RowReader::open(file.path(), b',', columns)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("a"), Some("1"));
        assert_eq!(rows[0].get("b"), Some("x"));
        assert_eq!(rows[1].values(), ["2", "y"]);
        assert_eq!(rows[0].get("missing"), None);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let file = write_file("a,b,c\n1,2,3\n4,5\n6,7,8,9\n10,11,12\n");
        let columns = Arc::new(read_column_names(file.path(), b',').unwrap());
        let rows: Vec<_> = RowReader::open(file.path(), b',', columns)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("a"), Some("1"));
        assert_eq!(rows[1].get("c"), Some("12"));
    }

    #[test]
    fn test_missing_header() {
        let file = write_file("");
        assert!(matches!(
            read_column_names(file.path(), b','),
            Err(SalesError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_alternate_delimiter() {
        let file = write_file("a;b\n1;2\n");
        let columns = Arc::new(read_column_names(file.path(), b';').unwrap());
        let rows: Vec<_> = RowReader::open(file.path(), b';', columns)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0].get("b"), Some("2"));
    }
}
