//! The daily attendance register: `YYYY-MM-DD.csv`, one `name,HH-MM-SS` row per person.

use chrono::NaiveDate;
use rollcall_core::AttendanceRecord;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("cannot create register {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write register {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("cannot flush register {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Register file name for a date.
pub fn file_name(date: NaiveDate) -> String {
    format!("{}.csv", date.format("%Y-%m-%d"))
}

/// CSV writer for one run. The file is truncated on creation.
pub struct AttendanceLedger {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl AttendanceLedger {
    pub fn create(dir: &Path, date: NaiveDate) -> Result<Self, LedgerError> {
        let path = dir.join(file_name(date));
        let file = File::create(&path).map_err(|source| LedgerError::Create {
            path: path.clone(),
            source,
        })?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        tracing::info!(path = %path.display(), "attendance register created");
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    pub fn append(&mut self, records: &[AttendanceRecord]) -> Result<(), LedgerError> {
        for record in records {
            self.writer
                .write_record([record.name.as_str(), record.time_label().as_str()])
                .map_err(|source| LedgerError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            self.rows += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LedgerError> {
        self.writer.flush().map_err(|source| LedgerError::Flush {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and close the file, returning its path.
    pub fn finish(mut self) -> Result<PathBuf, LedgerError> {
        self.flush()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn record(name: &str, h: u32, m: u32, s: u32) -> AttendanceRecord {
        AttendanceRecord {
            name: name.into(),
            time: NaiveTime::from_hms_opt(h, m, s).unwrap(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(date()), "2024-03-07.csv");
    }

    #[test]
    fn test_rows_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = AttendanceLedger::create(dir.path(), date()).unwrap();
        ledger
            .append(&[record("MonaLisa", 9, 1, 2), record("Ratan Tata", 17, 30, 0)])
            .unwrap();
        assert_eq!(ledger.rows(), 2);
        let path = ledger.finish().unwrap();

        assert_eq!(path, dir.path().join("2024-03-07.csv"));
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "MonaLisa,09-01-02\nRatan Tata,17-30-00\n");
    }

    #[test]
    fn test_names_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = AttendanceLedger::create(dir.path(), date()).unwrap();
        ledger.append(&[record("Tata, Ratan", 8, 0, 0)]).unwrap();
        let text = std::fs::read_to_string(ledger.finish().unwrap()).unwrap();
        assert_eq!(text, "\"Tata, Ratan\",08-00-00\n");
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(file_name(date()));
        std::fs::write(&path, "Stale,01-01-01\n").unwrap();

        let ledger = AttendanceLedger::create(dir.path(), date()).unwrap();
        ledger.finish().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn test_create_in_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = AttendanceLedger::create(&dir.path().join("missing"), date());
        assert!(matches!(result, Err(LedgerError::Create { .. })));
    }
}
