//! Composer repository protocol documents.

use indexmap::IndexMap;
use repertoire_core::{Error, Result, json};
use serde::{Deserialize, Deserializer, Serialize};
use sonic_rs::{JsonValueTrait, Value};
use std::fmt;
use std::marker::PhantomData;

/// Marker the Composer metadata minifier uses for a removed key.
const UNSET: &str = "__unset";

/// Value of the `minified` key in minified v2 documents.
const MINIFIED_V2: &str = "composer/2.0";

/// `packages/list.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageList {
    /// Every package name the repository knows.
    #[serde(rename = "packageNames")]
    pub package_names: Vec<String>,
}

impl PackageList {
    /// Parse a list document.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMetadata`] if `packageNames` is missing or not a sequence.
    pub fn from_slice(origin: &str, bytes: &[u8]) -> Result<Self> {
        json::from_metadata_slice(origin, bytes)
    }
}

/// `dist` section of a version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dist {
    /// Archive type, `zip` for everything this server serves.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub archive_type: Option<String>,
    /// Download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Source reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// SHA-1 of the archive; often empty upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
    /// Fields this server does not interpret.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Dist {
    /// Zip dist pointing at `url`.
    #[must_use]
    pub fn zip(url: impl Into<String>, shasum: Option<String>) -> Self {
        Self {
            archive_type: Some("zip".to_string()),
            url: Some(url.into()),
            reference: None,
            shasum,
            extra: IndexMap::new(),
        }
    }

    /// Whether this is a zip archive.
    #[must_use]
    pub fn is_zip(&self) -> bool {
        self.archive_type.as_deref() == Some("zip")
    }
}

/// Metadata of one package version.
///
/// Only `version` and `dist` are interpreted; everything else is carried
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Version string; always present in v2 lists, usually present in v1 maps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Archive location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    /// Fields this server does not interpret.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Versions of one package, in either Composer shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionList {
    /// v2 list; each entry names its own version.
    List(Vec<VersionMetadata>),
    /// v1 map keyed by version.
    Map(IndexMap<String, VersionMetadata>),
}

impl Default for VersionList {
    fn default() -> Self {
        Self::Map(IndexMap::new())
    }
}

impl VersionList {
    /// Exact-match lookup of a version.
    #[must_use]
    pub fn find(&self, version: &str) -> Option<&VersionMetadata> {
        match self {
            Self::Map(map) => map.get(version),
            Self::List(list) => list
                .iter()
                .find(|entry| entry.version.as_deref() == Some(version)),
        }
    }

    /// Iterate `(version, metadata)` pairs; list entries without a version are skipped.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (&str, &VersionMetadata)> + '_> {
        match self {
            Self::Map(map) => Box::new(map.iter().map(|(k, v)| (k.as_str(), v))),
            Self::List(list) => Box::new(
                list.iter()
                    .filter_map(|entry| entry.version.as_deref().map(|v| (v, entry))),
            ),
        }
    }

    /// Iterate mutably as `(version, metadata)` pairs.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&str, &mut VersionMetadata)) {
        match self {
            Self::Map(map) => {
                for (version, entry) in map.iter_mut() {
                    f(version, entry);
                }
            }
            Self::List(list) => {
                for entry in list.iter_mut() {
                    if let Some(version) = entry.version.clone() {
                        f(&version, entry);
                    }
                }
            }
        }
    }

    /// Number of versions.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Map(map) => map.len(),
            Self::List(list) => list.len(),
        }
    }

    /// Whether there are no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Provider (v1) or package (v2) document: `{"packages": {name: versions}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderDocument {
    /// Versions by package name.
    #[serde(deserialize_with = "map_or_empty_array")]
    pub packages: IndexMap<String, VersionList>,
    /// Other root keys.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ProviderDocument {
    /// Parse a provider or package document.
    ///
    /// Minified v2 documents are expanded and lose their `minified` marker.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMetadata`] if the bytes are not a JSON object
    /// with a `packages` mapping.
    pub fn from_slice(origin: &str, bytes: &[u8]) -> Result<Self> {
        let marker: MinifiedMarker = json::from_metadata_slice(origin, bytes)?;
        if !marker.is_minified() {
            return json::from_metadata_slice(origin, bytes);
        }

        // Unset markers may replace typed keys such as `dist`, so expansion
        // runs on raw entries before they are decoded.
        let mut raw: MinifiedDocument = json::from_metadata_slice(origin, bytes)?;
        raw.extra.shift_remove("minified");
        for versions in raw.packages.values_mut() {
            *versions = expand_minified_versions(std::mem::take(versions));
        }
        json::from_metadata_slice(origin, &json::to_json_vec(&raw)?)
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        json::to_json_vec(self)
    }

    /// Whether the document was produced by the v2 minifier.
    #[must_use]
    pub fn is_minified(&self) -> bool {
        self.extra
            .get("minified")
            .and_then(|v| v.as_str())
            .is_some_and(|v| v.starts_with(MINIFIED_V2))
    }

    /// Look up the dist URL of an exact version.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotFound`] if the package or version is absent and
    /// [`Error::MalformedMetadata`] if the version has no dist URL.
    pub fn dist_url(&self, origin: &str, name: &str, version: &str) -> Result<String> {
        let not_found = || Error::VersionNotFound {
            name: name.to_string(),
            version: version.to_string(),
        };
        let metadata = self
            .packages
            .get(name)
            .and_then(|versions| versions.find(version))
            .ok_or_else(not_found)?;

        metadata
            .dist
            .as_ref()
            .and_then(|dist| dist.url.clone())
            .ok_or_else(|| Error::malformed(origin, format!("{name} {version} has no dist url")))
    }
}

/// Just the `minified` key of a provider document.
#[derive(Deserialize)]
struct MinifiedMarker {
    #[serde(default)]
    minified: Option<Value>,
}

impl MinifiedMarker {
    fn is_minified(&self) -> bool {
        self.minified
            .as_ref()
            .and_then(|v| v.as_str())
            .is_some_and(|v| v.starts_with(MINIFIED_V2))
    }
}

/// A minified v2 document with its version entries still undecoded.
#[derive(Serialize, Deserialize)]
struct MinifiedDocument {
    #[serde(deserialize_with = "map_or_empty_array")]
    packages: IndexMap<String, Vec<IndexMap<String, Value>>>,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

/// Entry of the `providers` map of a root document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHash {
    /// SHA-256 of the provider file, `null` when not computed.
    pub sha256: Option<String>,
}

/// Root `packages.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagesDocument {
    /// Inline packages, usually empty.
    #[serde(default, deserialize_with = "map_or_empty_array")]
    pub packages: IndexMap<String, VersionList>,
    /// v1 provider URL template containing `%package%`.
    #[serde(
        rename = "providers-url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub providers_url: Option<String>,
    /// v2 metadata URL template containing `%package%`.
    #[serde(
        rename = "metadata-url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata_url: Option<String>,
    /// Provider include files by path template.
    #[serde(
        rename = "provider-includes",
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "map_or_empty_array"
    )]
    pub provider_includes: IndexMap<String, ProviderHash>,
    /// Providers by package name.
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "map_or_empty_array"
    )]
    pub providers: IndexMap<String, ProviderHash>,
    /// Names served through `metadata-url`.
    #[serde(
        rename = "available-packages",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub available_packages: Vec<String>,
    /// Other root keys.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl PackagesDocument {
    /// Parse a root document.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMetadata`] if the bytes are not a root document.
    pub fn from_slice(origin: &str, bytes: &[u8]) -> Result<Self> {
        json::from_metadata_slice(origin, bytes)
    }

    /// v1 provider URL of a package, expanded from `providers-url`.
    #[must_use]
    pub fn provider_url(&self, name: &str) -> Option<String> {
        self.providers_url
            .as_deref()
            .map(|template| template.replace("%package%", name))
    }

    /// v2 metadata URL of a package, expanded from `metadata-url`.
    #[must_use]
    pub fn metadata_url(&self, name: &str) -> Option<String> {
        self.metadata_url
            .as_deref()
            .map(|template| template.replace("%package%", name))
    }
}

/// Whether a version string names a dev branch.
#[must_use]
pub fn is_dev_version(version: &str) -> bool {
    version.starts_with("dev-") || version.ends_with("-dev")
}

/// Expand a minified v2 version list.
///
/// Each entry starts from the previous expanded entry; keys present in the
/// entry override it and keys set to `"__unset"` are removed, whatever the key.
#[must_use]
pub fn expand_minified_versions(
    versions: Vec<IndexMap<String, Value>>,
) -> Vec<IndexMap<String, Value>> {
    let mut expanded = Vec::with_capacity(versions.len());
    let mut running: IndexMap<String, Value> = IndexMap::new();

    for entry in versions {
        for (key, value) in entry {
            if value.as_str() == Some(UNSET) {
                running.shift_remove(&key);
            } else {
                running.insert(key, value);
            }
        }
        expanded.push(running.clone());
    }

    expanded
}

/// Deserialize a map that PHP may have encoded as an empty array.
fn map_or_empty_array<'de, D, V>(deserializer: D) -> std::result::Result<IndexMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    use serde::de::{self, Visitor};

    struct MapOrEmptyArray<V>(PhantomData<V>);

    impl<'de, V> Visitor<'de> for MapOrEmptyArray<V>
    where
        V: Deserialize<'de>,
    {
        type Value = IndexMap<String, V>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map or an empty array")
        }

        fn visit_map<A>(self, map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            IndexMap::deserialize(de::value::MapAccessDeserializer::new(map))
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            if seq.next_element::<de::IgnoredAny>()?.is_some() {
                return Err(de::Error::custom(
                    "expected empty array for empty map, got non-empty array",
                ));
            }
            Ok(IndexMap::new())
        }
    }

    deserializer.deserialize_any(MapOrEmptyArray(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = r#"{"packages":{"acme/widget":{"1.0.0":{"name":"acme/widget","version":"1.0.0","dist":{"type":"zip","url":"https://codeload.example.com/acme/widget/1.0.0.zip","shasum":"abc","reference":"r1"}}}}}"#;

    const V2_MINIFIED: &str = r#"{"minified":"composer/2.0","packages":{"acme/widget":[
        {"name":"acme/widget","version":"2.0.0","description":"Widgets","license":["MIT"],"dist":{"type":"zip","url":"https://example.com/2.0.0.zip","shasum":""}},
        {"version":"1.0.0","license":"__unset","dist":{"type":"zip","url":"https://example.com/1.0.0.zip","shasum":""}}
    ]}}"#;

    #[test]
    fn parse_v1_map() {
        let doc = ProviderDocument::from_slice("p/acme/widget.json", V1.as_bytes()).unwrap();
        let versions = &doc.packages["acme/widget"];
        assert!(matches!(versions, VersionList::Map(_)));
        let entry = versions.find("1.0.0").unwrap();
        let dist = entry.dist.as_ref().unwrap();
        assert!(dist.is_zip());
        assert_eq!(dist.shasum.as_deref(), Some("abc"));
        assert_eq!(entry.extra["name"].as_str(), Some("acme/widget"));
    }

    #[test]
    fn parse_v2_minified_expands() {
        let doc = ProviderDocument::from_slice("p2/acme/widget.json", V2_MINIFIED.as_bytes())
            .unwrap();
        assert!(!doc.extra.contains_key("minified"));

        let versions = &doc.packages["acme/widget"];
        let old = versions.find("1.0.0").unwrap();
        assert_eq!(old.extra["name"].as_str(), Some("acme/widget"));
        assert_eq!(old.extra["description"].as_str(), Some("Widgets"));
        assert!(!old.extra.contains_key("license"));
        assert_eq!(
            old.dist.as_ref().unwrap().url.as_deref(),
            Some("https://example.com/1.0.0.zip")
        );
    }

    #[test]
    fn minified_unset_removes_typed_keys() {
        let body = br#"{"minified":"composer/2.0","packages":{"a/b":[
            {"name":"a/b","version":"dev-main","dist":{"type":"zip","url":"https://example.com/main.zip"}},
            {"version":"dev-legacy","dist":"__unset"},
            {"version":"__unset","description":"orphan"}
        ]}}"#;
        let doc = ProviderDocument::from_slice("p2/a/b~dev.json", body).unwrap();
        let VersionList::List(entries) = &doc.packages["a/b"] else {
            panic!("expected a version list");
        };
        assert_eq!(entries.len(), 3);

        let legacy = doc.packages["a/b"].find("dev-legacy").unwrap();
        assert!(legacy.dist.is_none());
        assert_eq!(legacy.extra["name"].as_str(), Some("a/b"));

        assert!(entries[2].version.is_none());
        assert!(entries[2].dist.is_none());
        assert_eq!(entries[2].extra["description"].as_str(), Some("orphan"));
        assert!(doc.packages["a/b"].find("dev-main").unwrap().dist.is_some());
    }

    #[test]
    fn php_empty_array_is_empty_map() {
        let doc = ProviderDocument::from_slice("p/x.json", br#"{"packages":[]}"#).unwrap();
        assert!(doc.packages.is_empty());

        let err = ProviderDocument::from_slice("p/x.json", br#"{"packages":[1]}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata { .. }));
    }

    #[test]
    fn rejects_wrong_top_level_shape() {
        let cases: [&[u8]; 4] = [b"[]", b"\"text\"", b"{\"other\":1}", b"{not json"];
        for bad in cases {
            let err = ProviderDocument::from_slice("p/x.json", bad).unwrap_err();
            assert!(matches!(err, Error::MalformedMetadata { .. }), "{err}");
        }
    }

    #[test]
    fn dist_url_lookup() {
        let doc = ProviderDocument::from_slice("p/acme/widget.json", V1.as_bytes()).unwrap();
        assert_eq!(
            doc.dist_url("p", "acme/widget", "1.0.0").unwrap(),
            "https://codeload.example.com/acme/widget/1.0.0.zip"
        );
        assert!(matches!(
            doc.dist_url("p", "acme/widget", "9.9.9"),
            Err(Error::VersionNotFound { .. })
        ));
        assert!(matches!(
            doc.dist_url("p", "acme/other", "1.0.0"),
            Err(Error::VersionNotFound { .. })
        ));
    }

    #[test]
    fn list_requires_package_names() {
        let list = PackageList::from_slice("l", br#"{"packageNames":["a/b"]}"#).unwrap();
        assert_eq!(list.package_names, vec!["a/b"]);
        assert!(PackageList::from_slice("l", br#"{"names":[]}"#).is_err());
        assert!(PackageList::from_slice("l", br#"{"packageNames":"a/b"}"#).is_err());
    }

    #[test]
    fn root_templates() {
        let doc = PackagesDocument::from_slice(
            "packages.json",
            br#"{"packages":[],"providers-url":"/p/%package%.json","metadata-url":"/p2/%package%.json"}"#,
        )
        .unwrap();
        assert_eq!(doc.provider_url("a/b").as_deref(), Some("/p/a/b.json"));
        assert_eq!(doc.metadata_url("a/b").as_deref(), Some("/p2/a/b.json"));
    }

    #[test]
    fn dev_versions() {
        assert!(is_dev_version("dev-main"));
        assert!(is_dev_version("2.x-dev"));
        assert!(!is_dev_version("1.0.0"));
        assert!(!is_dev_version("v1.1.0"));
    }
}
