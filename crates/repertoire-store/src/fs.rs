//! Filesystem backend.
//!
//! Blobs are content-addressed under `blobs/` by SHA-256 and never modified.
//! Each asset is a JSON record under `assets/` naming its blob. Index
//! snapshots live under `indexes/`. Records and snapshots are replaced with a
//! rename, so a write is visible all at once.

use crate::backend::StorageBackend;
use crate::content::{AssetRecord, Content};
use bytes::Bytes;
use repertoire_core::{AssetKind, Error, PackageCoordinate, Result, json};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

const RECORD_SUFFIX: &str = ".asset.json";

/// Backend storing assets in a directory tree.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns error if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [root.join("assets"), root.join("blobs"), root.join("indexes")] {
            std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        debug!(root = ?root, "opened filesystem store");
        Ok(Self { root })
    }

    /// Store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, path: &str) -> Result<PathBuf> {
        let mut target = self.root.join("assets");
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        if segments.peek().is_none() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        while let Some(segment) = segments.next() {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(Error::InvalidPath(path.to_string()));
            }
            if segments.peek().is_some() {
                target.push(segment);
            } else {
                target.push(format!("{segment}{RECORD_SUFFIX}"));
            }
        }
        Ok(target)
    }

    fn index_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::InvalidPath(name.to_string()));
        }
        Ok(self.root.join("indexes").join(format!("{name}.json")))
    }

    fn blob_path(&self, sha256: &str) -> PathBuf {
        let prefix = sha256.get(..2).unwrap_or("00");
        self.root.join("blobs").join(prefix).join(sha256)
    }

    fn read_record(file: &Path) -> Result<Option<AssetRecord>> {
        match std::fs::read(file) {
            Ok(data) => json::from_json_slice(&data).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(file, e)),
        }
    }

    fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| Error::InvalidPath(target.display().to_string()))?;
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
        temp.write_all(data).map_err(|e| Error::io(target, e))?;
        temp.as_file().sync_all().map_err(|e| Error::io(target, e))?;
        temp.persist(target).map_err(|e| Error::io(target, e.error))?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, path: &str) -> Result<Option<Content>> {
        let Some(record) = Self::read_record(&self.record_path(path)?)? else {
            return Ok(None);
        };
        let blob_path = self.blob_path(&record.hashes.sha256);
        let blob = std::fs::read(&blob_path)
            .map_err(|e| Error::store(path, format!("blob {}: {e}", blob_path.display())))?;
        Ok(Some(Content::new(Bytes::from(blob), record)))
    }

    fn put(&self, record: AssetRecord, blob: Bytes) -> Result<()> {
        let record_path = self.record_path(&record.path)?;
        let blob_path = self.blob_path(&record.hashes.sha256);
        if !blob_path.exists() {
            Self::write_atomic(&blob_path, &blob)?;
        }
        Self::write_atomic(&record_path, &json::to_json_vec(&record)?)
    }

    fn put_record(&self, record: AssetRecord) -> Result<bool> {
        let record_path = self.record_path(&record.path)?;
        if !record_path.exists() {
            return Ok(false);
        }
        Self::write_atomic(&record_path, &json::to_json_vec(&record)?)?;
        Ok(true)
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let record_path = self.record_path(path)?;
        match std::fs::remove_file(&record_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(&record_path, e)),
        }
    }

    fn load_index(&self, name: &str) -> Result<Option<Bytes>> {
        let file = self.index_path(name)?;
        match std::fs::read(&file) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&file, e)),
        }
    }

    fn save_index(&self, name: &str, snapshot: Bytes) -> Result<()> {
        Self::write_atomic(&self.index_path(name)?, &snapshot)
    }

    fn find_by_coordinate(&self, coordinate: &PackageCoordinate) -> Result<Vec<AssetRecord>> {
        Ok(self
            .browse(None)?
            .into_iter()
            .filter(|record| &record.component == coordinate)
            .collect())
    }

    fn browse(&self, kind: Option<AssetKind>) -> Result<Vec<AssetRecord>> {
        let assets = self.root.join("assets");
        let mut records = Vec::new();

        for entry in WalkDir::new(&assets).min_depth(1) {
            let entry = entry.map_err(|e| Error::store(assets.display().to_string(), e))?;
            if !entry.file_type().is_file()
                || !entry.file_name().to_string_lossy().ends_with(RECORD_SUFFIX)
            {
                continue;
            }
            match Self::read_record(entry.path()) {
                Ok(Some(record)) if kind.is_none_or(|kind| record.kind == kind) => {
                    records.push(record);
                }
                Ok(_) => {}
                Err(e) => warn!(file = ?entry.path(), error = %e, "skipping unreadable asset record"),
            }
        }

        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }
}
