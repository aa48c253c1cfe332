//! Core dataset rows exchanged between nodes
//!
//! A node publishes its core tables as a [`CoreDataset`]; peers merge it row
//! by row using each row's `(updated_at, origin)` stamp.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Tables that take part in synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreTable {
    Site,
    IntervalSchedule,
    Sequence,
    Pins,
    Assets,
}

impl CoreTable {
    pub const ALL: [CoreTable; 5] = [
        CoreTable::Site,
        CoreTable::IntervalSchedule,
        CoreTable::Sequence,
        CoreTable::Pins,
        CoreTable::Assets,
    ];

    /// SQL table name
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreTable::Site => "site",
            CoreTable::IntervalSchedule => "interval_schedule",
            CoreTable::Sequence => "sequence",
            CoreTable::Pins => "pins",
            CoreTable::Assets => "assets",
        }
    }
}

impl fmt::Display for CoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of a core table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreRow {
    pub table: CoreTable,
    /// Primary key values joined with `/`, e.g. `RTU1/D3`
    pub key: String,
    /// Data columns by name, excluding the stamp columns
    pub values: BTreeMap<String, serde_json::Value>,
    /// Milliseconds since the Unix epoch of the last write
    pub updated_at: i64,
    /// Node that made the last write
    pub origin: String,
}

impl CoreRow {
    /// Compare write stamps: time first, origin breaks ties
    pub fn cmp_stamp(&self, other: &CoreRow) -> Ordering {
        (self.updated_at, self.origin.as_str()).cmp(&(other.updated_at, other.origin.as_str()))
    }

    /// True when both rows carry the same data, ignoring stamps
    pub fn same_content(&self, other: &CoreRow) -> bool {
        self.values == other.values
    }
}

/// Version of a node's core dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbVersion {
    pub node: String,
    /// Incremented on every applied core write
    pub counter: i64,
    /// Hex SHA-256 over the canonical core rows
    pub fingerprint: String,
}

/// Full core dataset as published on `SYNCHRONIZE/DATA/<node>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreDataset {
    pub node: String,
    pub version: DbVersion,
    pub rows: Vec<CoreRow>,
}

/// A message in transit; never persisted beyond handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEnvelope {
    pub topic: String,
    pub payload: String,
}

impl SyncEnvelope {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
