//! Result persistence.
//!
//! Three sinks share the [`ResultSink`] trait:
//! 1. **[`CsvDirSink`]:** One `<name>_result.csv` per experiment (header + row, overwritten).
//! 2. **[`JsonTableSink`]:** One JSON document keyed by configuration name, rewritten atomically.
//! 3. **[`MemorySink`]:** Rows kept in memory for summaries and tests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::common::error::SinkError;

use super::result::ExperimentResult;

/// Destination for result rows.
pub trait ResultSink {
    /// Persists one row. Rows for other configurations must be left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the row cannot be written.
    fn append(&mut self, result: &ExperimentResult) -> Result<(), SinkError>;
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `<dir>/<name>_result.csv` per experiment.
#[derive(Debug, Clone)]
pub struct CsvDirSink {
    dir: PathBuf,
}

impl CsvDirSink {
    /// Sink writing into `dir` (created on first append).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File a configuration's row is written to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_result.csv"))
    }
}

/// Quotes a CSV field when it contains a separator, quote, or newline.
fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => csv_field(s),
        Value::Null => String::new(),
        other => csv_field(&other.to_string()),
    }
}

impl ResultSink for CsvDirSink {
    fn append(&mut self, result: &ExperimentResult) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let columns = result.columns();
        let header: Vec<String> = columns.iter().map(|(k, _)| csv_field(k)).collect();
        let row: Vec<String> = columns.iter().map(|(_, v)| csv_value(v)).collect();
        let text = format!("{}\n{}\n", header.join(","), row.join(","));

        let path = self.path_for(&result.name);
        fs::write(&path, text).map_err(io_error(&path))?;
        tracing::info!(path = %path.display(), "result saved");
        Ok(())
    }
}

/// Maintains one JSON object `{ "<name>": { column: value, ... }, ... }`.
///
/// Each append reads the table, replaces one entry, and renames a temporary file over the
/// original, so an interrupted write never loses earlier rows.
#[derive(Debug, Clone)]
pub struct JsonTableSink {
    path: PathBuf,
}

impl JsonTableSink {
    /// Sink backed by `path` (created on first append).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current table; a missing file is an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] or [`SinkError::Json`] for an unreadable table.
    pub fn load(&self) -> Result<BTreeMap<String, Map<String, Value>>, SinkError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(SinkError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl ResultSink for JsonTableSink {
    fn append(&mut self, result: &ExperimentResult) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut table = self.load()?;
        if table.insert(result.name.clone(), result.row()).is_some() {
            tracing::debug!(config = %result.name, "replacing existing result");
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_string_pretty(&table)?).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_error(&self.path))?;
        tracing::info!(path = %self.path.display(), config = %result.name, "result saved");
        Ok(())
    }
}

/// Keeps one row per configuration name in memory; a rerun replaces its earlier row.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// One row per configuration name, in first-append order.
    pub results: Vec<ExperimentResult>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, result: &ExperimentResult) -> Result<(), SinkError> {
        match self.results.iter_mut().find(|r| r.name == result.name) {
            Some(existing) => *existing = result.clone(),
            None => self.results.push(result.clone()),
        }
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn append(&mut self, result: &ExperimentResult) -> Result<(), SinkError> {
        (**self).append(result)
    }
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn append(&mut self, result: &ExperimentResult) -> Result<(), SinkError> {
        (**self).append(result)
    }
}
