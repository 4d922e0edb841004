//! Content store for repertoire repositories.
//!
//! [`ContentStore`] is the policy layer every repository type writes through:
//! it tags assets with their kind, records hashes and zipball attributes, and
//! serialises writes per path so concurrent puts never interleave. Bytes and
//! records live in a [`StorageBackend`].

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod backend;
pub mod content;
pub mod fs;

pub use backend::{MemoryBackend, StorageBackend};
pub use content::{AssetRecord, CacheInfo, Content, FormatAttributes, Provenance};
pub use fs::FileBackend;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use repertoire_core::{AssetKind, Hashes, PackageCoordinate, Result, normalize_path};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Number of write locks paths are spread across.
const LOCK_STRIPES: usize = 64;

/// Composer content store over a storage backend.
#[derive(Debug, Clone)]
pub struct ContentStore {
    backend: Arc<dyn StorageBackend>,
    locks: Arc<[Mutex<()>]>,
}

impl ContentStore {
    /// Create a store over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Store backed by memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Content stored at `path`.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    pub fn get(&self, path: &str) -> Result<Option<Content>> {
        self.backend.get(&normalize_path(path))
    }

    /// Whether an asset exists at `path`.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.get(path)?.is_some())
    }

    /// Store `payload` at `path` as `kind`, replacing any previous asset.
    ///
    /// Zipballs additionally get their vendor, project and version from the
    /// path and, when possible, the `composer.json` inside the archive.
    ///
    /// # Errors
    /// Returns error if the backend write fails.
    pub fn put(&self, path: &str, payload: impl Into<Bytes>, kind: AssetKind) -> Result<Content> {
        self.write(path, payload.into(), kind, None)
    }

    /// Store an imported zipball together with where it came from.
    ///
    /// # Errors
    /// Returns error if the backend write fails.
    pub fn put_with_source(
        &self,
        path: &str,
        payload: impl Into<Bytes>,
        provenance: Provenance,
    ) -> Result<Content> {
        self.write(path, payload.into(), AssetKind::Zipball, Some(provenance))
    }

    /// Attach proxy validation info to the asset `content` was read from.
    ///
    /// Does nothing if the asset is gone or has been replaced since.
    ///
    /// # Errors
    /// Returns error if the backend write fails.
    pub fn set_cache_info(&self, path: &str, content: &Content, cache_info: CacheInfo) -> Result<()> {
        let path = normalize_path(path);
        let _guard = self.lock(&path);

        let current = match self.backend.get(&path)? {
            Some(current) if current.hashes() == content.hashes() => current,
            _ => {
                debug!(path = %path, "no matching asset for cache info, skipping");
                return Ok(());
            }
        };

        if !self
            .backend
            .put_record(current.record().with_cache_info(cache_info))?
        {
            debug!(path = %path, "asset removed before cache info was recorded");
        }
        Ok(())
    }

    /// Remove the asset at `path`; returns whether one existed.
    ///
    /// # Errors
    /// Returns error if the backend write fails.
    pub fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.remove(path)?.is_some())
    }

    /// Remove the asset at `path` and return the record it had.
    ///
    /// The lookup and the delete happen under the path's write lock, so the
    /// returned record is the one that was removed.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read or written.
    pub fn remove(&self, path: &str) -> Result<Option<AssetRecord>> {
        let path = normalize_path(path);
        let _guard = self.lock(&path);
        let Some(existing) = self.backend.get(&path)? else {
            return Ok(None);
        };
        if !self.backend.delete(&path)? {
            return Ok(None);
        }
        info!(path = %path, kind = %existing.kind(), "deleted asset");
        Ok(Some(existing.record().clone()))
    }

    /// Snapshot of the key-value index called `name`, if one was saved.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    pub fn load_index(&self, name: &str) -> Result<Option<Bytes>> {
        self.backend.load_index(name)
    }

    /// Replace the snapshot of the key-value index called `name`.
    ///
    /// # Errors
    /// Returns error if the backend write fails.
    pub fn save_index(&self, name: &str, snapshot: impl Into<Bytes>) -> Result<()> {
        let snapshot = snapshot.into();
        debug!(index = name, size = snapshot.len(), "saving index snapshot");
        self.backend.save_index(name, snapshot)
    }

    /// Re-create an asset from a recovered blob.
    ///
    /// Returns `None` without writing if an asset already exists at `path`.
    ///
    /// # Errors
    /// Returns error if the backend write fails.
    pub fn restore(&self, path: &str, payload: impl Into<Bytes>) -> Result<Option<Content>> {
        let normalized = normalize_path(path);
        let kind = repertoire_core::Route::classify(&normalized)
            .and_then(|route| route.asset_kind())
            .unwrap_or(AssetKind::Zipball);

        let _guard = self.lock(&normalized);
        if self.backend.get(&normalized)?.is_some() {
            debug!(path = %normalized, "asset exists, nothing to restore");
            return Ok(None);
        }
        let content = self.build(&normalized, payload.into(), kind, None);
        self.backend
            .put(content.record().clone(), content.payload().clone())?;
        info!(path = %normalized, kind = %kind, "restored asset from blob");
        Ok(Some(content))
    }

    /// Records of every asset belonging to `coordinate`.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    pub fn find_by_coordinate(&self, coordinate: &PackageCoordinate) -> Result<Vec<AssetRecord>> {
        self.backend.find_by_coordinate(coordinate)
    }

    /// Records of every asset of `kind`, ordered by path.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    pub fn browse(&self, kind: AssetKind) -> Result<Vec<AssetRecord>> {
        self.backend.browse(Some(kind))
    }

    fn write(
        &self,
        path: &str,
        payload: Bytes,
        kind: AssetKind,
        provenance: Option<Provenance>,
    ) -> Result<Content> {
        let path = normalize_path(path);
        let content = self.build(&path, payload, kind, provenance);

        let _guard = self.lock(&path);
        self.backend
            .put(content.record().clone(), content.payload().clone())?;

        info!(
            path = %path,
            kind = %kind,
            size = content.record().size,
            "stored asset"
        );
        Ok(content)
    }

    fn build(
        &self,
        path: &str,
        payload: Bytes,
        kind: AssetKind,
        provenance: Option<Provenance>,
    ) -> Content {
        let component = PackageCoordinate::from_path(path);
        let format = (kind == AssetKind::Zipball)
            .then(|| Self::format_attributes(path, &component, &payload, provenance));

        let record = AssetRecord {
            path: path.to_string(),
            kind,
            component,
            content_type: kind.content_type().to_string(),
            size: payload.len() as u64,
            hashes: Hashes::compute(&payload),
            last_modified: Utc::now(),
            cache_info: None,
            format,
        };
        Content::new(payload, record)
    }

    fn format_attributes(
        path: &str,
        component: &PackageCoordinate,
        payload: &[u8],
        provenance: Option<Provenance>,
    ) -> FormatAttributes {
        let composer = match archive::extract_composer_json(payload) {
            Ok(composer) => Some(composer),
            Err(e) => {
                error!(path = %path, error = %e, "could not extract composer.json from zipball");
                None
            }
        };
        FormatAttributes {
            vendor: component.vendor.clone(),
            project: component.project.clone(),
            version: component.version.clone(),
            composer,
            provenance,
        }
    }

    fn lock(&self, path: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let stripe = (hasher.finish() as usize) % self.locks.len();
        self.locks[stripe].lock()
    }
}
