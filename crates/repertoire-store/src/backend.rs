//! Storage backends the content store sits on.

use crate::content::{AssetRecord, Content};
use bytes::Bytes;
use dashmap::DashMap;
use repertoire_core::{AssetKind, PackageCoordinate, Result};
use std::fmt;

/// Persistence for asset records and their blobs.
///
/// Each call is atomic on its own: a reader sees either the previous or the
/// new state of a path, never a blob from one write with the record of another.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Load the asset at `path`.
    fn get(&self, path: &str) -> Result<Option<Content>>;

    /// Create or replace the asset at `record.path`.
    fn put(&self, record: AssetRecord, blob: Bytes) -> Result<()>;

    /// Replace the record of an existing asset, keeping its blob.
    ///
    /// Returns `false` if no asset exists at the path.
    fn put_record(&self, record: AssetRecord) -> Result<bool>;

    /// Remove the asset at `path`; returns whether one existed.
    fn delete(&self, path: &str) -> Result<bool>;

    /// Load the key-value index snapshot called `name`.
    fn load_index(&self, name: &str) -> Result<Option<Bytes>>;

    /// Replace the key-value index snapshot called `name`.
    fn save_index(&self, name: &str, snapshot: Bytes) -> Result<()>;

    /// Records of every asset belonging to `coordinate`.
    fn find_by_coordinate(&self, coordinate: &PackageCoordinate) -> Result<Vec<AssetRecord>>;

    /// Records of every asset, optionally restricted to one kind, ordered by path.
    fn browse(&self, kind: Option<AssetKind>) -> Result<Vec<AssetRecord>>;
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    assets: DashMap<String, Content>,
    indexes: DashMap<String, Bytes>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, path: &str) -> Result<Option<Content>> {
        Ok(self.assets.get(path).map(|entry| entry.value().clone()))
    }

    fn put(&self, record: AssetRecord, blob: Bytes) -> Result<()> {
        self.assets
            .insert(record.path.clone(), Content::new(blob, record));
        Ok(())
    }

    fn put_record(&self, record: AssetRecord) -> Result<bool> {
        match self.assets.get_mut(&record.path) {
            Some(mut entry) => {
                let blob = entry.payload().clone();
                *entry = Content::new(blob, record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.assets.remove(path).is_some())
    }

    fn load_index(&self, name: &str) -> Result<Option<Bytes>> {
        Ok(self.indexes.get(name).map(|entry| entry.value().clone()))
    }

    fn save_index(&self, name: &str, snapshot: Bytes) -> Result<()> {
        self.indexes.insert(name.to_string(), snapshot);
        Ok(())
    }

    fn find_by_coordinate(&self, coordinate: &PackageCoordinate) -> Result<Vec<AssetRecord>> {
        let mut records: Vec<AssetRecord> = self
            .assets
            .iter()
            .filter(|entry| &entry.record().component == coordinate)
            .map(|entry| entry.record().clone())
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    fn browse(&self, kind: Option<AssetKind>) -> Result<Vec<AssetRecord>> {
        let mut records: Vec<AssetRecord> = self
            .assets
            .iter()
            .filter(|entry| kind.is_none_or(|kind| entry.kind() == kind))
            .map(|entry| entry.record().clone())
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }
}
