//! Append-only CSV log of received records.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Header row written when a log file is created.
pub const HEADER: [&str; 5] = [
    "Time (seconds since epoch)",
    "field2",
    "field3",
    "field4",
    "field5",
];

/// A CSV file receiving one row per serial data event.
pub struct CsvLog {
    path: PathBuf,
    file: File,
}

impl CsvLog {
    /// Create `serial-log-<unix seconds>.csv` inside `dir` and write the header.
    pub async fn create_in(dir: &Path, unix_secs: u64) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Log(format!("failed to create {}: {e}", dir.display())))?;
        Self::create(dir.join(format!("serial-log-{unix_secs}.csv"))).await
    }

    /// Create (or truncate) a log at `path` and write the header.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| Error::Log(format!("failed to open {}: {e}", path.display())))?;

        let mut log = Self { path, file };
        log.write_row(&HEADER).await?;
        info!(path = %log.path.display(), "CSV log created");
        Ok(log)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it.
    pub async fn append(&mut self, fields: &[String]) -> Result<()> {
        self.write_row(fields).await?;
        debug!(fields = fields.len(), "logged record");
        Ok(())
    }

    async fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let line = encode_row(fields);
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Log(format!("write to {} failed: {e}", self.path.display())))?;
        self.file
            .flush()
            .await
            .map_err(|e| Error::Log(format!("flush of {} failed: {e}", self.path.display())))
    }
}

/// Encode one CSV row terminated by `\n`.
pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Quote a field if it holds a comma, quote, CR or LF.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
