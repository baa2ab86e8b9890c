//! Record and dataset types
//!
//! A [`Record`] is whatever JSON value the source API returned for one row.
//! No schema is assumed. A [`Dataset`] is the ordered accumulation of
//! records across every page of a single endpoint: page order first, then
//! the order within each page. Duplicates are kept.

use serde::{Deserialize, Serialize};

/// One opaque JSON-compatible record
pub type Record = serde_json::Value;

/// All records fetched for one endpoint, fully materialized in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Append records in iteration order
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Apply `f` to every record, producing a new dataset
    pub fn map(&self, f: impl Fn(&Record) -> Record) -> Self {
        Self {
            records: self.records.iter().map(f).collect(),
        }
    }
}

impl From<Vec<Record>> for Dataset {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
