//! Counter dump parsing.
//!
//! The kernel writes one counter per line: `<dotted.key> <number> [# description]`. Section
//! banners, blank lines, and lines whose second field is not a finite number are skipped. A
//! dump may contain several periodic sections; later values replace earlier ones.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::common::error::StatsError;

/// Suffix gem5-style dumps append to aggregate counters.
pub const TOTAL_SUFFIX: &str = "::total";

/// Immutable map from fully-qualified counter name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    counters: BTreeMap<String, f64>,
    duplicates: usize,
}

impl StatsSnapshot {
    /// Parses dump lines.
    pub fn parse<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counters = BTreeMap::new();
        let mut duplicates = 0;
        for line in lines {
            let Some((key, value)) = parse_line(line.as_ref()) else {
                continue;
            };
            if counters.insert(key.to_string(), value).is_some() {
                duplicates += 1;
                tracing::trace!(key, "duplicate counter overwritten");
            }
        }
        if duplicates > 0 {
            tracing::warn!(
                duplicates,
                "counter dump repeats keys; keeping the last value of each"
            );
        }
        Self {
            counters,
            duplicates,
        }
    }

    /// Parses a whole dump held in memory.
    pub fn parse_str(text: &str) -> Self {
        Self::parse(text.lines())
    }

    /// Parses a raw dump. Lines that are not valid UTF-8 are skipped like any other malformed line.
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        Self::parse(bytes.split(|&b| b == b'\n').filter_map(|line| {
            let decoded = std::str::from_utf8(line).ok();
            if decoded.is_none() {
                tracing::debug!(len = line.len(), "skipping non-UTF-8 dump line");
            }
            decoded
        }))
    }

    /// Reads and parses a dump file.
    ///
    /// # Errors
    ///
    /// * [`StatsError::Unavailable`] if the file does not exist.
    /// * [`StatsError::Io`] for any other read failure.
    pub fn from_path(path: &Path) -> Result<Self, StatsError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Self::parse_bytes(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StatsError::Unavailable {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(StatsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Value of an exact key.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.counters.get(key).copied()
    }

    /// Value of `key`, falling back to `key::total`.
    pub fn get_total(&self, key: &str) -> Option<f64> {
        self.get(key).or_else(|| {
            if key.ends_with(TOTAL_SUFFIX) {
                None
            } else {
                self.get(&format!("{key}{TOTAL_SUFFIX}"))
            }
        })
    }

    /// Whether `key` (or `key::total`) is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get_total(key).is_some()
    }

    /// Number of distinct counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the dump held no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// How many lines replaced an earlier value of the same key.
    pub const fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Counters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Renders the snapshot back into dump format, one `key value` line per counter.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.counters {
            out.push_str(key);
            out.push(' ');
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }
}

/// `Some((key, value))` for a counter line, `None` for anything else.
fn parse_line(line: &str) -> Option<(&str, f64)> {
    let mut fields = line.split_whitespace();
    let key = fields.next()?;
    if key.starts_with('#') || key.starts_with("---") {
        return None;
    }
    let value: f64 = fields.next()?.parse().ok()?;
    value.is_finite().then_some((key, value))
}
