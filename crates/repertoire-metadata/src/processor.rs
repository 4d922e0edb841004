//! Structural transformations of Composer documents.

use crate::types::{
    Dist, PackageList, PackagesDocument, ProviderDocument, ProviderHash, VersionList,
    VersionMetadata, is_dev_version,
};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use repertoire_core::{Error, PackageCoordinate, Result, Route, json};
use serde::Serialize;
use tracing::{debug, trace, warn};
use url::Url;

const GENERATED_AT: &str = "generated-at";

/// Root of a merged provider document.
#[derive(Debug, Serialize)]
struct MergedProviders {
    packages: IndexMap<String, VersionList>,
    #[serde(rename = "generated-at", skip_serializing_if = "Option::is_none")]
    generated_at: Option<String>,
}

/// Versions of one package collected during a merge.
#[derive(Debug)]
struct MergedVersions {
    as_list: bool,
    versions: IndexMap<String, VersionMetadata>,
}

/// Metadata processor bound to one repository's public base URL.
#[derive(Debug, Clone)]
pub struct MetadataProcessor {
    base_url: Url,
}

impl MetadataProcessor {
    /// Create a processor for a repository served at `base_url`.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { base_url }
    }

    /// Repository base URL, always ending in `/`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of a zipball served by this repository.
    #[must_use]
    pub fn zipball_url(&self, coordinate: &PackageCoordinate) -> String {
        format!("{}{}", self.base_url, coordinate.zipball_path())
    }

    /// `providers-url` template pointing at this repository.
    #[must_use]
    pub fn providers_url_template(&self) -> String {
        format!("{}p/%package%.json", self.base_url)
    }

    /// `metadata-url` template pointing at this repository.
    #[must_use]
    pub fn metadata_url_template(&self) -> String {
        format!("{}p2/%package%.json", self.base_url)
    }

    /// Strip this repository's base URL from an absolute URL and classify the rest.
    #[must_use]
    pub fn route_of(&self, url: &str) -> Option<Route> {
        url.strip_prefix(self.base_url.as_str())
            .and_then(Route::classify)
    }

    /// Turn a `packages/list.json` payload into a routable `packages.json`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMetadata`] if `packageNames` is missing or not a sequence.
    pub fn generate_packages_from_list(&self, list: &[u8]) -> Result<Vec<u8>> {
        let list = PackageList::from_slice("packages/list.json", list)?;

        let mut document = PackagesDocument {
            providers_url: Some(self.providers_url_template()),
            metadata_url: Some(self.metadata_url_template()),
            ..PackagesDocument::default()
        };
        for name in list.package_names {
            if document.providers.contains_key(&name) {
                continue;
            }
            document
                .providers
                .insert(name.clone(), ProviderHash::default());
            document.available_packages.push(name);
        }

        debug!(
            packages = document.providers.len(),
            "generated packages.json from list"
        );
        json::to_json_vec(&document)
    }

    /// Point every zip dist URL of a provider or package document at this repository.
    ///
    /// URLs already under this repository's base URL are left alone, so the
    /// rewrite is idempotent.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMetadata`] if the payload is not a provider document.
    pub fn rewrite_package_json(&self, origin: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let mut document = ProviderDocument::from_slice(origin, payload)?;
        for (name, versions) in &mut document.packages {
            versions.for_each_mut(|version, entry| self.rewrite_dist(name, version, entry));
        }
        document.to_vec()
    }

    fn rewrite_dist(&self, name: &str, version: &str, entry: &mut VersionMetadata) {
        let Some(dist) = entry.dist.as_mut() else {
            return;
        };
        if !dist.is_zip() {
            return;
        }
        if dist
            .url
            .as_deref()
            .is_some_and(|url| url.starts_with(self.base_url.as_str()))
        {
            return;
        }
        let Some(coordinate) = PackageCoordinate::from_name(name, version) else {
            trace!(name, "skipping dist rewrite for unqualified package name");
            return;
        };
        let url = self.zipball_url(&coordinate);
        if !matches!(self.route_of(&url), Some(Route::Zipball(_))) {
            trace!(name, version, "version is not a single path segment, keeping upstream dist");
            return;
        }
        dist.url = Some(url);
    }

    /// Merge provider documents from group members.
    ///
    /// `payloads` are `(origin, bytes)` pairs in member priority order. Version
    /// maps of the same package are unioned; when a version appears in several
    /// payloads the later one wins. Payloads that do not parse are skipped with a
    /// warning. `generated-at` is set to `now` if any source carried one.
    ///
    /// # Errors
    /// Returns [`Error::MalformedMetadata`] if no payload was a valid provider document.
    pub fn merge_provider_json(
        &self,
        payloads: &[(&str, &[u8])],
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let mut merged: IndexMap<String, MergedVersions> = IndexMap::new();
        let mut valid = 0usize;
        let mut stamped = false;

        for (origin, payload) in payloads {
            let document = match ProviderDocument::from_slice(origin, payload) {
                Ok(document) => document,
                Err(e) => {
                    warn!(origin = %origin, error = %e, "skipping provider document in merge");
                    continue;
                }
            };
            valid += 1;
            stamped |= document.extra.contains_key(GENERATED_AT);

            for (name, versions) in document.packages {
                let target = merged.entry(name).or_insert_with(|| MergedVersions {
                    as_list: matches!(versions, VersionList::List(_)),
                    versions: IndexMap::new(),
                });
                match versions {
                    VersionList::Map(map) => target.versions.extend(map),
                    VersionList::List(list) => {
                        for entry in list {
                            if let Some(version) = entry.version.clone() {
                                target.versions.insert(version, entry);
                            }
                        }
                    }
                }
            }
        }

        if valid == 0 {
            return Err(Error::malformed(
                "group merge",
                "no member returned a valid provider document",
            ));
        }

        let packages = merged
            .into_iter()
            .map(|(name, merged)| {
                let versions = if merged.as_list {
                    VersionList::List(merged.versions.into_values().collect())
                } else {
                    VersionList::Map(merged.versions)
                };
                (name, versions)
            })
            .collect();

        json::to_json_vec(&MergedProviders {
            packages,
            generated_at: stamped.then(|| now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        })
    }

    /// Dist URL of an exact version from a v2 package document.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotFound`] if the version is absent and
    /// [`Error::MalformedMetadata`] if the payload is not a package document.
    pub fn get_dist_url_from_package(
        vendor: &str,
        project: &str,
        version: &str,
        payload: &[u8],
    ) -> Result<String> {
        let origin = format!("p2/{vendor}/{project}.json");
        ProviderDocument::from_slice(&origin, payload)?.dist_url(
            &origin,
            &format!("{vendor}/{project}"),
            version,
        )
    }

    /// Dist URL of an exact version from a v1 provider document.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotFound`] if the version is absent and
    /// [`Error::MalformedMetadata`] if the payload is not a provider document.
    pub fn get_dist_url(
        vendor: &str,
        project: &str,
        version: &str,
        payload: &[u8],
    ) -> Result<String> {
        let origin = format!("p/{vendor}/{project}.json");
        ProviderDocument::from_slice(&origin, payload)?.dist_url(
            &origin,
            &format!("{vendor}/{project}"),
            version,
        )
    }

    /// `packages/list.json` for a set of names.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn build_package_list(names: impl IntoIterator<Item = String>) -> Result<Vec<u8>> {
        json::to_json_vec(&PackageList {
            package_names: names.into_iter().collect(),
        })
    }

    /// v1 provider document for one package.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn build_provider_json(
        name: &str,
        versions: impl IntoIterator<Item = VersionMetadata>,
    ) -> Result<Vec<u8>> {
        let map: IndexMap<String, VersionMetadata> = versions
            .into_iter()
            .filter_map(|entry| entry.version.clone().map(|version| (version, entry)))
            .collect();
        let mut document = ProviderDocument::default();
        document
            .packages
            .insert(name.to_string(), VersionList::Map(map));
        document.to_vec()
    }

    /// v2 package document for one package, holding either the stable or the dev versions.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn build_package_json(
        name: &str,
        versions: impl IntoIterator<Item = VersionMetadata>,
        dev: bool,
    ) -> Result<Vec<u8>> {
        let list: Vec<VersionMetadata> = versions
            .into_iter()
            .filter(|entry| {
                entry
                    .version
                    .as_deref()
                    .is_some_and(|version| is_dev_version(version) == dev)
            })
            .collect();
        let mut document = ProviderDocument::default();
        document
            .packages
            .insert(name.to_string(), VersionList::List(list));
        document.to_vec()
    }

    /// Dist entry for a zipball stored in this repository.
    #[must_use]
    pub fn hosted_dist(&self, coordinate: &PackageCoordinate, sha1: &str) -> Dist {
        Dist::zip(self.zipball_url(coordinate), Some(sha1.to_string()))
    }
}
