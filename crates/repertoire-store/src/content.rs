//! Stored asset records and the content handed back to callers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use repertoire_core::{AssetKind, Hashes, PackageCoordinate};
use serde::{Deserialize, Serialize};
use sonic_rs::{JsonValueTrait, Value};

/// Proxy cache validation state of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// When the asset was last confirmed against the upstream.
    pub last_verified: DateTime<Utc>,
    /// Upstream entity tag, if one was sent.
    #[serde(default)]
    pub etag: Option<String>,
    /// Upstream `Last-Modified` header, if one was sent.
    #[serde(default)]
    pub version: Option<String>,
}

impl CacheInfo {
    /// Cache info verified at `now` with no upstream validators.
    #[must_use]
    pub const fn verified_at(now: DateTime<Utc>) -> Self {
        Self {
            last_verified: now,
            etag: None,
            version: None,
        }
    }

    /// Whether the asset was verified less than `max_age` before `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_verified) < max_age
    }
}

/// Where an imported zipball came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Source kind, e.g. `git`.
    pub source_type: String,
    /// Source location.
    pub source_url: String,
    /// Source reference, e.g. a commit.
    pub source_reference: String,
}

/// Composer attributes of a zipball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatAttributes {
    /// Vendor from the asset path.
    pub vendor: String,
    /// Project from the asset path.
    pub project: String,
    /// Version from the asset path.
    pub version: String,
    /// `composer.json` found inside the archive, if extraction succeeded.
    #[serde(default)]
    pub composer: Option<IndexMap<String, Value>>,
    /// Import provenance.
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl FormatAttributes {
    /// Package name declared in the embedded `composer.json`.
    #[must_use]
    pub fn declared_name(&self) -> Option<&str> {
        self.composer
            .as_ref()
            .and_then(|composer| composer.get("name"))
            .and_then(|name| name.as_str())
    }

    /// Coordinate taken from the asset path.
    #[must_use]
    pub fn coordinate(&self) -> PackageCoordinate {
        PackageCoordinate::new(&self.vendor, &self.project, &self.version)
    }
}

/// Attributes of one stored asset.
///
/// Records are built fresh on every write and never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Normalized asset path.
    pub path: String,
    /// Content kind.
    pub kind: AssetKind,
    /// Component the asset belongs to.
    pub component: PackageCoordinate,
    /// MIME type.
    pub content_type: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Payload digests.
    pub hashes: Hashes,
    /// When the payload was written.
    pub last_modified: DateTime<Utc>,
    /// Proxy validation state.
    #[serde(default)]
    pub cache_info: Option<CacheInfo>,
    /// Composer attributes, zipballs only.
    #[serde(default)]
    pub format: Option<FormatAttributes>,
}

impl AssetRecord {
    /// Copy of this record carrying `cache_info`.
    #[must_use]
    pub fn with_cache_info(&self, cache_info: CacheInfo) -> Self {
        Self {
            cache_info: Some(cache_info),
            ..self.clone()
        }
    }
}

/// Bytes plus the attributes of the asset they came from.
#[derive(Debug, Clone)]
pub struct Content {
    payload: Bytes,
    record: AssetRecord,
}

impl Content {
    /// Pair a payload with its record.
    #[must_use]
    pub const fn new(payload: Bytes, record: AssetRecord) -> Self {
        Self { payload, record }
    }

    /// Content that is served but never stored, such as generated indexes.
    #[must_use]
    pub fn transient(path: &str, kind: AssetKind, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let record = AssetRecord {
            path: path.to_string(),
            kind,
            component: PackageCoordinate::from_path(path),
            content_type: kind.content_type().to_string(),
            size: payload.len() as u64,
            hashes: Hashes::compute(&payload),
            last_modified: Utc::now(),
            cache_info: None,
            format: None,
        };
        Self { payload, record }
    }

    /// Payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume into payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Asset attributes.
    #[must_use]
    pub const fn record(&self) -> &AssetRecord {
        &self.record
    }

    /// MIME type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.record.content_type
    }

    /// Content kind.
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        self.record.kind
    }

    /// Payload digests.
    #[must_use]
    pub const fn hashes(&self) -> &Hashes {
        &self.record.hashes
    }

    /// Entity tag derived from the SHA-1 digest.
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.record.hashes.sha1)
    }

    /// Last write time.
    #[must_use]
    pub const fn last_modified(&self) -> DateTime<Utc> {
        self.record.last_modified
    }

    /// Proxy validation state.
    #[must_use]
    pub const fn cache_info(&self) -> Option<&CacheInfo> {
        self.record.cache_info.as_ref()
    }

    /// Same payload carrying `cache_info`.
    #[must_use]
    pub fn with_cache_info(self, cache_info: CacheInfo) -> Self {
        Self {
            record: self.record.with_cache_info(cache_info),
            payload: self.payload,
        }
    }

    /// Same payload with different bytes, e.g. after rewriting.
    #[must_use]
    pub fn with_payload(self, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut record = self.record;
        record.size = payload.len() as u64;
        record.hashes = Hashes::compute(&payload);
        Self { payload, record }
    }
}
