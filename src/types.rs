use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical identifier of a marketplace export source, e.g. `amazon_us`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformKey(String);

impl PlatformKey {
    /// Keys are stored lower-case with `_` as the only separator so they can be
    /// compared against normalized file names.
    pub fn new(key: &str) -> Self {
        PlatformKey(crate::platform::normalize_key(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named tabular file handed to the merge step.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Header row plus data rows. Each row holds one cell per header, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Copy of rows `range`, keeping the headers.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Dataset {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        Dataset {
            headers: self.headers.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    /// True when both datasets carry the same column names, ignoring order.
    pub fn same_columns(&self, headers: &[String]) -> bool {
        if self.headers.len() != headers.len() {
            return false;
        }
        let mut ours: Vec<&String> = self.headers.iter().collect();
        let mut theirs: Vec<&String> = headers.iter().collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }

    /// Reorder columns to `headers`. Returns `None` if the column sets differ.
    pub fn aligned_to(self, headers: &[String]) -> Option<Dataset> {
        if self.headers == headers {
            return Some(self);
        }
        if !self.same_columns(headers) {
            return None;
        }

        let order: Vec<usize> = headers
            .iter()
            .map(|h| self.column_index(h))
            .collect::<Option<_>>()?;
        let rows = self
            .rows
            .into_iter()
            .map(|row| order.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Some(Dataset {
            headers: headers.to_vec(),
            rows,
        })
    }

    pub fn append(&mut self, other: Dataset) {
        self.rows.extend(other.rows);
    }
}

/// Per-platform bookkeeping reported after a distribution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformSummary {
    pub total: usize,
    pub distributed: usize,
    pub remaining: usize,
    pub leftover_path: Option<PathBuf>,
}

/// Rows emitted per day and platform.
pub type DailyCounts = BTreeMap<NaiveDate, BTreeMap<PlatformKey, usize>>;

/// Everything `distribute` hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionResult {
    pub start_date: NaiveDate,
    pub accounts: usize,
    pub rows_per_account: usize,
    pub days_distributed: usize,
    pub archive_path: Option<PathBuf>,
    pub platforms: BTreeMap<PlatformKey, PlatformSummary>,
    pub daily_counts: DailyCounts,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeywordStats {
    pub generated: usize,
    pub failed: usize,
    pub skipped: usize,
}
