//! CSV file writer for recording sessions
//!
//! One [`CsvRecorder`] lives inside the sampling loop and is opened/closed by
//! the loop's recording state machine. Every recording session gets its own
//! file named `[<prepend>-]datastream-<YYYY-MM-DD-HH-mm-ss>.csv`, created in
//! the configured directory (the working directory by default). Rows are
//! flushed as they are written: durability over throughput.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Writes one recording session's header and rows to a CSV file
pub(crate) struct CsvRecorder {
    directory: Option<PathBuf>,
    prepend: Option<String>,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    rows_written: u64,
}

impl CsvRecorder {
    pub fn new(directory: Option<PathBuf>, prepend: Option<String>) -> Self {
        Self {
            directory,
            prepend,
            writer: None,
            path: None,
            rows_written: 0,
        }
    }

    /// Whether a recording file is currently open
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Open a new recording file and write the header line
    ///
    /// The filename embeds the optional prefix and the current wall-clock
    /// time with one-second resolution; a session opened within the same
    /// second as the previous one reuses its name and truncates it.
    pub fn open(&mut self, header: &str) -> io::Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
        let filename = match &self.prepend {
            Some(prefix) => format!("{}-datastream-{}.csv", prefix, stamp),
            None => format!("datastream-{}.csv", stamp),
        };
        let path = match &self.directory {
            Some(dir) => dir.join(filename),
            None => PathBuf::from(filename),
        };

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header)?;
        writer.flush()?;

        self.writer = Some(writer);
        self.path = Some(path.clone());
        self.rows_written = 0;
        tracing::info!(path = %path.display(), "recording started");
        Ok(path)
    }

    /// Append one fully assembled row and flush it
    pub fn write_row(&mut self, row: &str) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writeln!(writer, "{}", row)?;
        writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Close the current file, returning its path and the number of rows
    /// written
    pub fn close(&mut self) -> (Option<PathBuf>, u64) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        let path = self.path.take();
        let rows = self.rows_written;
        if let Some(ref path) = path {
            tracing::info!(path = %path.display(), rows, "recording stopped");
        }
        (path, rows)
    }
}
