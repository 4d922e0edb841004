//! Hosted repositories: uploaded zipballs plus generated metadata.

mod index;
mod rebuild;
mod upload;

pub use index::{DEFAULT_PAGING_SIZE, MetadataIndex, Page, index_key, package_name};
pub use rebuild::RebuildSummary;
use rebuild::rebuild_metadata;
pub use upload::ComponentUpload;

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::Mutex;
use repertoire_core::{AssetKind, Result, Route, json, normalize_path};
use repertoire_metadata::{MetadataProcessor, VersionMetadata, is_dev_version};
use repertoire_store::{AssetRecord, Content, ContentStore, Provenance};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Name of the index snapshot in the repository's store.
pub const INDEX_SNAPSHOT: &str = "composer-metadata";

/// A repository that stores uploaded zipballs.
///
/// Metadata documents are never stored; they are generated on request from
/// the [`MetadataIndex`], which is saved to the store after every change.
#[derive(Debug)]
pub struct HostedRepository {
    name: String,
    store: ContentStore,
    processor: MetadataProcessor,
    index: MetadataIndex,
    // Held across a store write, its index update and the snapshot save.
    writes: Mutex<()>,
}

#[derive(Serialize)]
struct Source<'a> {
    #[serde(rename = "type")]
    source_type: &'a str,
    url: &'a str,
    reference: &'a str,
}

impl HostedRepository {
    /// Create a hosted repository served at `base_url`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        store: ContentStore,
        paging_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            processor: MetadataProcessor::new(base_url),
            index: MetadataIndex::new(paging_size),
            writes: Mutex::new(()),
        }
    }

    /// Load the saved index snapshot, replacing the in-memory index.
    ///
    /// Returns `false` if no snapshot was saved yet.
    ///
    /// # Errors
    /// Returns error if the snapshot cannot be read or does not parse.
    pub fn load_index(&self) -> Result<bool> {
        let Some(snapshot) = self.store.load_index(INDEX_SNAPSHOT)? else {
            return Ok(false);
        };
        let loaded = self.index.load_snapshot(INDEX_SNAPSHOT, &snapshot)?;
        info!(repository = %self.name, entries = loaded, "loaded metadata index");
        Ok(true)
    }


    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing store.
    #[must_use]
    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Processor bound to this repository's URL.
    #[must_use]
    pub const fn processor(&self) -> &MetadataProcessor {
        &self.processor
    }

    /// Metadata index.
    #[must_use]
    pub const fn index(&self) -> &MetadataIndex {
        &self.index
    }

    /// Serve a GET.
    ///
    /// # Errors
    /// Returns error if the store cannot be read or a document cannot be built.
    pub fn get(&self, route: &Route) -> Result<Option<Content>> {
        let Some(kind) = route.asset_kind() else {
            return Ok(None);
        };
        let path = route.path();

        let generated = match route {
            Route::Zipball(_) => return self.store.get(&path),
            Route::Upload(_) => return Ok(None),
            Route::Packages => {
                let list = MetadataProcessor::build_package_list(self.index.package_names())?;
                self.processor.generate_packages_from_list(&list)?
            }
            Route::List => MetadataProcessor::build_package_list(self.index.package_names())?,
            Route::Provider { vendor, project } => {
                let name = format!("{vendor}/{project}");
                let versions = self.index.versions_of(&name);
                if versions.is_empty() {
                    return Ok(None);
                }
                MetadataProcessor::build_provider_json(&name, versions)?
            }
            Route::Package {
                vendor,
                project,
                dev,
            } => {
                let name = format!("{vendor}/{project}");
                let versions = self.index.versions_of(&name);
                let matching = versions.iter().any(|metadata| {
                    metadata
                        .version
                        .as_deref()
                        .is_some_and(|version| is_dev_version(version) == *dev)
                });
                if !matching {
                    return Ok(None);
                }
                MetadataProcessor::build_package_json(&name, versions, *dev)?
            }
        };

        debug!(repository = %self.name, path = %path, "generated metadata");
        Ok(Some(Content::transient(&path, kind, generated)))
    }

    /// Store an upload arriving on an upload route.
    ///
    /// # Errors
    /// Returns [`repertoire_core::Error::InvalidUpload`] for bad fields and
    /// storage errors otherwise.
    pub fn put(&self, route: &Route, payload: Bytes) -> Result<Content> {
        self.upload(&ComponentUpload::from_route(route, payload)?)
    }

    /// Store an uploaded zipball and index it.
    ///
    /// # Errors
    /// Returns error if storing or indexing fails.
    pub fn upload(&self, upload: &ComponentUpload) -> Result<Content> {
        let _guard = self.writes.lock();
        let content = self.store.put(
            &upload.asset_path(),
            upload.payload().clone(),
            AssetKind::Zipball,
        )?;
        self.index_asset(content.record())?;
        self.persist_index()?;
        info!(
            repository = %self.name,
            package = %upload.coordinate(),
            sha1 = %content.hashes().sha1,
            "uploaded component"
        );
        Ok(content)
    }

    /// Store a mirrored zipball with its provenance and index it.
    ///
    /// # Errors
    /// Returns error if storing or indexing fails.
    pub fn import(&self, upload: &ComponentUpload, provenance: Provenance) -> Result<Content> {
        let _guard = self.writes.lock();
        let content =
            self.store
                .put_with_source(&upload.asset_path(), upload.payload().clone(), provenance)?;
        self.index_asset(content.record())?;
        self.persist_index()?;
        info!(repository = %self.name, package = %upload.coordinate(), "imported component");
        Ok(content)
    }

    /// Delete the asset at `path`, dropping its index entry if it was a zipball.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn delete(&self, path: &str) -> Result<bool> {
        let _guard = self.writes.lock();
        let Some(removed) = self.store.remove(&normalize_path(path))? else {
            return Ok(false);
        };
        if removed.kind == AssetKind::Zipball
            && self.index.remove_package_metadata(&index_key(&removed))
        {
            self.persist_index()?;
        }
        Ok(true)
    }

    /// Re-index stored zipballs and save the result.
    ///
    /// # Errors
    /// Returns error if the store cannot be browsed or the index cannot be saved.
    pub fn rebuild(&self, full: bool, cancel: &CancellationToken) -> Result<RebuildSummary> {
        let _guard = self.writes.lock();
        let summary = rebuild_metadata(self, full, cancel)?;
        self.persist_index()?;
        Ok(summary)
    }

    fn persist_index(&self) -> Result<()> {
        let snapshot = self.index.to_snapshot()?;
        if let Err(e) = self.store.save_index(INDEX_SNAPSHOT, snapshot) {
            warn!(repository = %self.name, error = %e, "failed to save metadata index");
            return Err(e);
        }
        Ok(())
    }

    /// Write the in-memory index entry for one zipball record.
    ///
    /// Returns `false` if the record carries no format attributes. The
    /// snapshot is not saved; callers save once after a batch.
    ///
    /// # Errors
    /// Returns error if the metadata cannot be serialized.
    pub fn index_asset(&self, record: &AssetRecord) -> Result<bool> {
        let Some(metadata) = self.version_metadata(record)? else {
            debug!(path = %record.path, "asset has no format attributes, not indexing");
            return Ok(false);
        };
        self.index.add_package_metadata(&index_key(record), &metadata);
        Ok(true)
    }

    /// Version entry for a zipball: its `composer.json` fields with name and
    /// version taken from the path and a dist pointing at this repository.
    fn version_metadata(&self, record: &AssetRecord) -> Result<Option<VersionMetadata>> {
        let Some(format) = &record.format else {
            return Ok(None);
        };
        let coordinate = format.coordinate();

        let mut extra = IndexMap::new();
        extra.insert("name".to_string(), json::to_json_value(&coordinate.name())?);
        if let Some(composer) = &format.composer {
            for (key, value) in composer {
                if !matches!(key.as_str(), "name" | "version" | "dist" | "source") {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(provenance) = &format.provenance {
            let source = Source {
                source_type: &provenance.source_type,
                url: &provenance.source_url,
                reference: &provenance.source_reference,
            };
            extra.insert("source".to_string(), json::to_json_value(&source)?);
        }

        Ok(Some(VersionMetadata {
            version: Some(coordinate.version.clone()),
            dist: Some(
                self.processor
                    .hosted_dist(&coordinate, &record.hashes.sha1),
            ),
            extra,
        }))
    }
}
