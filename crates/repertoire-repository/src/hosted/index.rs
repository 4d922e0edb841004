//! Key-value index of per-version metadata for hosted repositories.

use parking_lot::RwLock;
use repertoire_core::{Result, json};
use repertoire_metadata::VersionMetadata;
use repertoire_store::AssetRecord;
use sonic_rs::JsonValueTrait;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use tracing::debug;

/// Default number of entries returned per browse page.
pub const DEFAULT_PAGING_SIZE: usize = 100;

/// Index key of a zipball asset.
#[must_use]
pub fn index_key(record: &AssetRecord) -> String {
    format!("composer-{}-{}", record.component, record.path)
}

/// One page of index values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Version metadata, ordered by key.
    pub values: Vec<VersionMetadata>,
    /// Key to resume after, `None` on the last page.
    pub continuation: Option<String>,
}

#[derive(Debug, Default)]
struct Entries {
    by_key: BTreeMap<String, VersionMetadata>,
    by_name: BTreeMap<String, BTreeSet<String>>,
}

impl Entries {
    fn insert(&mut self, key: String, metadata: VersionMetadata) {
        self.remove(&key);
        if let Some(name) = package_name(&metadata) {
            self.by_name
                .entry(name.to_string())
                .or_default()
                .insert(key.clone());
        }
        self.by_key.insert(key, metadata);
    }

    fn remove(&mut self, key: &str) -> bool {
        let Some(previous) = self.by_key.remove(key) else {
            return false;
        };
        if let Some(name) = package_name(&previous) {
            self.unlink(name, key);
        }
        true
    }

    fn unlink(&mut self, name: &str, key: &str) {
        if let Some(keys) = self.by_name.get_mut(name) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_name.remove(name);
            }
        }
    }
}

/// Per-version metadata keyed by [`index_key`].
///
/// Values carry a `name` field; a secondary map from package name to keys
/// serves per-package lookups without scanning the whole index. The index
/// can be written to and read back from a JSON snapshot.
#[derive(Debug)]
pub struct MetadataIndex {
    entries: RwLock<Entries>,
    paging_size: usize,
}

impl MetadataIndex {
    /// Create an empty index browsing `paging_size` entries at a time.
    #[must_use]
    pub fn new(paging_size: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            paging_size: paging_size.max(1),
        }
    }

    /// Store `metadata` under `key`, replacing any previous value.
    pub fn add_package_metadata(&self, key: &str, metadata: &VersionMetadata) {
        debug!(key, "indexing package metadata");
        self.entries
            .write()
            .insert(key.to_string(), metadata.clone());
    }

    /// Remove the entry under `key`.
    pub fn remove_package_metadata(&self, key: &str) -> bool {
        self.entries.write().remove(key)
    }

    /// Remove every entry.
    pub fn remove_all(&self) {
        *self.entries.write() = Entries::default();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().by_key.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().by_key.is_empty()
    }

    /// One page of values after `continuation`.
    #[must_use]
    pub fn browse(&self, continuation: Option<&str>) -> Page {
        let entries = self.entries.read();
        let lower = continuation.map_or(Bound::Unbounded, Bound::Excluded);
        let mut page: Vec<(&String, &VersionMetadata)> = entries
            .by_key
            .range::<str, _>((lower, Bound::Unbounded))
            .take(self.paging_size + 1)
            .collect();

        let continuation = if page.len() > self.paging_size {
            page.truncate(self.paging_size);
            page.last().map(|(key, _)| (*key).clone())
        } else {
            None
        };

        Page {
            values: page.into_iter().map(|(_, value)| value.clone()).collect(),
            continuation,
        }
    }

    /// Every indexed version, paging through the whole index.
    #[must_use]
    pub fn browse_all(&self) -> Vec<VersionMetadata> {
        let mut versions = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self.browse(continuation.as_deref());
            versions.extend(page.values);
            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }
        versions
    }

    /// Indexed versions of package `name`, ordered by key.
    #[must_use]
    pub fn versions_of(&self, name: &str) -> Vec<VersionMetadata> {
        let entries = self.entries.read();
        entries.by_name.get(name).map_or_else(Vec::new, |keys| {
            keys.iter()
                .filter_map(|key| entries.by_key.get(key).cloned())
                .collect()
        })
    }

    /// Distinct package names, sorted.
    #[must_use]
    pub fn package_names(&self) -> Vec<String> {
        self.entries.read().by_name.keys().cloned().collect()
    }

    /// Serialize every entry as a JSON object keyed by index key.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        json::to_json_vec(&self.entries.read().by_key)
    }

    /// Replace the contents with a snapshot from [`Self::to_snapshot`].
    ///
    /// Returns the number of entries loaded.
    ///
    /// # Errors
    /// Returns [`repertoire_core::Error::MalformedMetadata`] if the snapshot
    /// does not parse; the index is left unchanged.
    pub fn load_snapshot(&self, origin: &str, snapshot: &[u8]) -> Result<usize> {
        let by_key: BTreeMap<String, VersionMetadata> = json::from_metadata_slice(origin, snapshot)?;
        let mut loaded = Entries::default();
        for (key, metadata) in by_key {
            loaded.insert(key, metadata);
        }
        let count = loaded.by_key.len();
        *self.entries.write() = loaded;
        Ok(count)
    }
}

impl Default for MetadataIndex {
    fn default() -> Self {
        Self::new(DEFAULT_PAGING_SIZE)
    }
}

/// `name` field of an indexed version.
#[must_use]
pub fn package_name(metadata: &VersionMetadata) -> Option<&str> {
    metadata.extra.get("name").and_then(|name| name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str, version: &str) -> VersionMetadata {
        let json = format!(r#"{{"name":"{name}","version":"{version}"}}"#);
        json::from_json_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn add_replace_and_remove() {
        let index = MetadataIndex::default();
        index.add_package_metadata("composer-a", &version("a/b", "1.0.0"));
        index.add_package_metadata("composer-a", &version("a/b", "1.0.1"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.browse_all()[0].version.as_deref(), Some("1.0.1"));

        assert!(index.remove_package_metadata("composer-a"));
        assert!(!index.remove_package_metadata("composer-a"));
        assert!(index.is_empty());
    }

    #[test]
    fn browse_pages_through_everything() {
        let index = MetadataIndex::new(2);
        for i in 0..5 {
            index
                .add_package_metadata(&format!("composer-{i}"), &version("a/b", &format!("1.0.{i}")));
        }

        let first = index.browse(None);
        assert_eq!(first.values.len(), 2);
        assert_eq!(first.continuation.as_deref(), Some("composer-1"));

        let second = index.browse(first.continuation.as_deref());
        assert_eq!(second.values.len(), 2);
        let third = index.browse(second.continuation.as_deref());
        assert_eq!(third.values.len(), 1);
        assert!(third.continuation.is_none());

        assert_eq!(index.browse_all().len(), 5);
    }

    #[test]
    fn names_and_versions() {
        let index = MetadataIndex::default();
        index.add_package_metadata("composer-1", &version("z/z", "1.0.0"));
        index.add_package_metadata("composer-2", &version("a/b", "1.0.0"));
        index.add_package_metadata("composer-3", &version("a/b", "dev-main"));

        assert_eq!(index.package_names(), vec!["a/b".to_string(), "z/z".to_string()]);
        assert_eq!(index.versions_of("a/b").len(), 2);
        assert!(index.versions_of("missing/pkg").is_empty());

        index.remove_all();
        assert!(index.package_names().is_empty());
    }

    #[test]
    fn replacing_an_entry_moves_it_between_names() {
        let index = MetadataIndex::default();
        index.add_package_metadata("composer-1", &version("a/b", "1.0.0"));
        index.add_package_metadata("composer-1", &version("c/d", "1.0.0"));

        assert_eq!(index.package_names(), vec!["c/d".to_string()]);
        assert!(index.versions_of("a/b").is_empty());
        assert_eq!(index.versions_of("c/d").len(), 1);
    }

    #[test]
    fn snapshot_restores_entries_and_names() {
        let index = MetadataIndex::default();
        index.add_package_metadata("composer-1", &version("a/b", "1.0.0"));
        index.add_package_metadata("composer-2", &version("a/b", "2.0.0"));
        let snapshot = index.to_snapshot().unwrap();

        let restored = MetadataIndex::default();
        restored.add_package_metadata("composer-stale", &version("x/y", "1.0.0"));
        assert_eq!(restored.load_snapshot("snapshot", &snapshot).unwrap(), 2);
        assert_eq!(restored.package_names(), vec!["a/b".to_string()]);
        assert_eq!(restored.versions_of("a/b").len(), 2);

        assert!(restored.load_snapshot("snapshot", b"[1,2]").is_err());
        assert_eq!(restored.len(), 2);
    }
}
