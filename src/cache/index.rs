//! The metadata index (`meta.json`).
//!
//! The whole map is rewritten on every change. Writers serialize on a
//! [`FileLock`]; readers take no lock and treat a missing or malformed file
//! as an empty index.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::StorageError;
use super::fsio::write_atomic;
use super::keys::PageKey;
use super::layout::CacheLayout;
use super::lock::FileLock;

const SOURCE: &str = "cache::index";

/// Metadata for one cached page variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub url: String,
    pub file: String,
    /// Unix seconds.
    pub created: i64,
    /// Unix seconds; the entry is fresh while `now < expires`.
    pub expires: i64,
    pub mobile: bool,
}

impl MetaRecord {
    pub fn is_fresh(&self, now: i64) -> bool {
        now < self.expires
    }
}

pub(crate) type IndexMap = BTreeMap<String, MetaRecord>;

#[derive(Debug)]
pub(crate) struct MetaIndex {
    dir: PathBuf,
    path: PathBuf,
    lock: FileLock,
}

impl MetaIndex {
    pub(crate) fn new(layout: &CacheLayout) -> Self {
        let path = layout.meta_path().to_path_buf();
        Self {
            dir: layout.base().to_path_buf(),
            lock: FileLock::for_file(&path),
            path,
        }
    }

    pub(crate) fn get(&self, key: &PageKey) -> Option<MetaRecord> {
        self.load().remove(key.as_str())
    }

    pub(crate) fn load(&self) -> IndexMap {
        read_index(&self.path)
    }

    pub(crate) fn upsert(&self, key: &PageKey, record: MetaRecord) -> Result<(), StorageError> {
        self.lock.with_exclusive(SOURCE, "upsert", || {
            let mut index = self.load();
            index.insert(key.as_str().to_string(), record);
            self.write(&index)
        })
    }

    /// Remove a record. Returns whether one was present.
    pub(crate) fn remove(&self, key: &PageKey) -> Result<bool, StorageError> {
        self.lock.with_exclusive(SOURCE, "remove", || {
            let mut index = self.load();
            if index.remove(key.as_str()).is_none() {
                return Ok(false);
            }
            self.write(&index)?;
            Ok(true)
        })
    }

    pub(crate) fn reset(&self) -> Result<(), StorageError> {
        self.lock
            .with_exclusive(SOURCE, "reset", || self.write(&IndexMap::new()))
    }

    fn write(&self, index: &IndexMap) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.dir, &self.path, &bytes)
    }
}

fn read_index(path: &Path) -> IndexMap {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return IndexMap::new(),
        Err(err) => {
            warn!(
                op = "cache::index::read",
                result = "io_error",
                cache_path = %path.display(),
                error = %err,
                "Failed to read cache index; treating as empty"
            );
            return IndexMap::new();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(index) => index,
        Err(err) => {
            warn!(
                op = "cache::index::read",
                result = "corrupt",
                cache_path = %path.display(),
                error = %err,
                "Cache index is malformed; treating as empty"
            );
            IndexMap::new()
        }
    }
}
