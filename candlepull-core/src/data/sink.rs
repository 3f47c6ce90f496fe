//! Flat-file output: one comma-delimited text file per instrument.
//!
//! Layout: `{output_dir}/{TICKER}.txt`, starting with the fixed header line.
//! Rows are appended one period at a time and flushed after each period, so
//! an interrupted run leaves only whole periods on disk.

use super::provider::DataError;
use crate::domain::{Candle, ResetPolicy};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// First line of every output file.
pub const HEADER: &str = "<DATE>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>";

/// Creates and opens per-instrument output files under one directory.
#[derive(Debug, Clone)]
pub struct OutputSink {
    output_dir: PathBuf,
}

impl OutputSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Path of the output file for an instrument: `{output_dir}/{id}.txt`
    pub fn file_path(&self, instrument_id: &str) -> PathBuf {
        self.output_dir.join(format!("{instrument_id}.txt"))
    }

    /// Prepare the instrument's file and return an open handle for appending.
    ///
    /// - [`ResetPolicy::Append`]: a missing file is created with the header;
    ///   an existing file is left as it is.
    /// - [`ResetPolicy::Replace`]: any existing file is removed first, then
    ///   recreated with the header.
    pub fn ensure_ready(
        &self,
        instrument_id: &str,
        policy: ResetPolicy,
    ) -> Result<SeriesFile, DataError> {
        let path = self.file_path(instrument_id);

        if policy == ResetPolicy::Replace {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed previous series"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(DataError::fs(&path, e)),
            }
        }

        // create_new makes the header decision atomic with file creation
        let file = match OpenOptions::new().append(true).create_new(true).open(&path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                writeln!(writer, "{HEADER}")
                    .and_then(|_| writer.flush())
                    .map_err(|e| DataError::fs(&path, e))?;
                writer
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .map_err(|e| DataError::fs(&path, e))?;
                BufWriter::new(file)
            }
            Err(e) => return Err(DataError::fs(&path, e)),
        };

        Ok(SeriesFile { path, writer: file })
    }
}

/// Open output file for one instrument, held for the duration of a worker's run.
pub struct SeriesFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SeriesFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one period's candles and flush them to disk.
    pub fn append(&mut self, records: &[Candle]) -> Result<(), DataError> {
        for candle in records {
            writeln!(self.writer, "{}", candle.to_row())
                .map_err(|e| DataError::fs(&self.path, e))?;
        }
        self.writer.flush().map_err(|e| DataError::fs(&self.path, e))
    }
}
