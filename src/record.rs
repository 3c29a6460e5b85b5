use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One interview row of the output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(rename = "Record Number")]
    pub id: u64,
    #[serde(rename = "Title")]
    pub title: String,
    /// Never empty after trimming.
    #[serde(rename = "Interview Text")]
    pub dialogue: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Records in arrival order, at most one per identifier.
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<ExtractedRecord>,
    ids: HashSet<u64>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the first record) if the id is already present.
    pub fn insert(&mut self, record: ExtractedRecord) -> bool {
        if !self.ids.insert(record.id) {
            return false;
        }
        self.records.push(record);
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn sort_by_id(&mut self) {
        self.records.sort_by_key(|r| r.id);
    }
}
