//! Path registry
//!
//! Remembers exactly which files each installed package wrote, so removal
//! deletes those files and nothing else. Entries are shared slices: a
//! package that survives a reconciliation keeps the very same entry.

use super::PackageSet;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRegistry {
    /// Archive filename -> files it materialized
    entries: BTreeMap<String, Arc<[String]>>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<&Arc<[String]>> {
        self.entries.get(filename)
    }

    pub fn insert(&mut self, filename: impl Into<String>, paths: Vec<String>) {
        self.entries.insert(filename.into(), paths.into());
    }

    /// Insert an existing entry without copying it
    pub fn insert_shared(&mut self, filename: impl Into<String>, paths: Arc<[String]>) {
        self.entries.insert(filename.into(), paths);
    }

    pub fn remove(&mut self, filename: &str) -> Option<Arc<[String]>> {
        self.entries.remove(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// True when there is exactly one entry per installed record
    pub fn matches(&self, installed: &PackageSet) -> bool {
        self.entries.len() == installed.len()
            && installed
                .iter()
                .all(|(_, record)| self.entries.contains_key(&record.filename))
    }
}
