//! Finding the upstream dist URL of a zipball.

use repertoire_core::{Error, PackageCoordinate, Result, Route};
use repertoire_metadata::MetadataProcessor;
use repertoire_store::Content;
use std::fmt;
use std::future::Future;
use tracing::debug;

/// A metadata document that may name a zipball's dist URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistSource {
    /// `p2/{vendor}/{project}.json`
    Package,
    /// `p2/{vendor}/{project}~dev.json`
    DevPackage,
    /// `p/{vendor}/{project}.json`
    Provider,
}

/// Resolution order: stable v2, dev v2, then the legacy provider document.
pub const RESOLUTION_CHAIN: [DistSource; 3] = [
    DistSource::Package,
    DistSource::DevPackage,
    DistSource::Provider,
];

impl DistSource {
    /// Route of the document for a package.
    #[must_use]
    pub fn route(self, vendor: &str, project: &str) -> Route {
        match self {
            Self::Package => Route::package(vendor, project, false),
            Self::DevPackage => Route::package(vendor, project, true),
            Self::Provider => Route::provider(vendor, project),
        }
    }

    /// Look up the dist URL of `coordinate` in a document of this source.
    ///
    /// # Errors
    /// Returns [`Error::VersionNotFound`] or [`Error::MalformedMetadata`].
    pub fn extract(self, coordinate: &PackageCoordinate, payload: &[u8]) -> Result<String> {
        let PackageCoordinate {
            vendor,
            project,
            version,
        } = coordinate;
        match self {
            Self::Package | Self::DevPackage => {
                MetadataProcessor::get_dist_url_from_package(vendor, project, version, payload)
            }
            Self::Provider => MetadataProcessor::get_dist_url(vendor, project, version, payload),
        }
    }
}

impl fmt::Display for DistSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Package => "package",
            Self::DevPackage => "dev package",
            Self::Provider => "provider",
        })
    }
}

/// Walk `chain` until one document yields the dist URL of `coordinate`.
///
/// `fetch` loads a metadata document; a missing document, a fetch error, or
/// a lookup failure moves on to the next step.
///
/// # Errors
/// Returns [`Error::NonResolvableProvider`] once every step has failed.
pub async fn resolve_dist_url<F, Fut>(
    coordinate: &PackageCoordinate,
    chain: &[DistSource],
    fetch: F,
) -> Result<String>
where
    F: Fn(Route) -> Fut,
    Fut: Future<Output = Result<Option<Content>>>,
{
    for source in chain {
        let route = source.route(&coordinate.vendor, &coordinate.project);
        match fetch(route).await {
            Ok(Some(content)) => match source.extract(coordinate, content.payload()) {
                Ok(url) => {
                    debug!(package = %coordinate, %source, url = %url, "resolved dist url");
                    return Ok(url);
                }
                Err(e) => debug!(package = %coordinate, %source, error = %e, "dist url not in document"),
            },
            Ok(None) => debug!(package = %coordinate, %source, "metadata document not found"),
            Err(e) => debug!(package = %coordinate, %source, error = %e, "metadata document unavailable"),
        }
    }

    Err(Error::NonResolvableProvider {
        vendor: coordinate.vendor.clone(),
        project: coordinate.project.clone(),
        version: coordinate.version.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use repertoire_core::AssetKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const V1: &str = r#"{"packages":{"a/b":{"1.0.0":{"version":"1.0.0","dist":{"type":"zip","url":"https://up.example.com/v1.zip"}}}}}"#;
    const V2: &str = r#"{"packages":{"a/b":[{"version":"1.0.0","dist":{"type":"zip","url":"https://up.example.com/v2.zip"}}]}}"#;
    const DEV: &str = r#"{"packages":{"a/b":[{"version":"dev-main","dist":{"type":"zip","url":"https://up.example.com/dev.zip"}}]}}"#;

    fn documents(entries: &[(&str, &str)]) -> HashMap<String, Content> {
        entries
            .iter()
            .map(|(path, body)| {
                let kind = Route::classify(path).and_then(|r| r.asset_kind()).unwrap_or(AssetKind::Package);
                ((*path).to_string(), Content::transient(path, kind, body.as_bytes().to_vec()))
            })
            .collect()
    }

    async fn resolve(docs: &HashMap<String, Content>, version: &str) -> (Result<String>, Vec<String>) {
        let visited = Mutex::new(Vec::new());
        let coordinate = PackageCoordinate::new("a", "b", version);
        let result = resolve_dist_url(&coordinate, &RESOLUTION_CHAIN, |route| {
            let path = route.path();
            visited.lock().unwrap().push(path.clone());
            let found = docs.get(&path).cloned();
            async move { Ok(found) }
        })
        .await;
        (result, visited.into_inner().unwrap())
    }

    #[tokio::test]
    async fn stable_package_wins_first() {
        let docs = documents(&[("p2/a/b.json", V2), ("p/a/b.json", V1)]);
        let (url, visited) = resolve(&docs, "1.0.0").await;
        assert_eq!(url.unwrap(), "https://up.example.com/v2.zip");
        assert_eq!(visited, vec!["p2/a/b.json"]);
    }

    #[tokio::test]
    async fn dev_versions_come_from_dev_document() {
        let docs = documents(&[("p2/a/b.json", V2), ("p2/a/b~dev.json", DEV)]);
        let (url, visited) = resolve(&docs, "dev-main").await;
        assert_eq!(url.unwrap(), "https://up.example.com/dev.zip");
        assert_eq!(visited, vec!["p2/a/b.json", "p2/a/b~dev.json"]);
    }

    #[tokio::test]
    async fn v1_only_upstream_resolves_via_provider() {
        let docs = documents(&[("p/a/b.json", V1)]);
        let (url, visited) = resolve(&docs, "1.0.0").await;
        assert_eq!(url.unwrap(), "https://up.example.com/v1.zip");
        assert_eq!(visited.len(), 3);
    }

    #[tokio::test]
    async fn exhausted_chain_is_non_resolvable() {
        let docs = documents(&[("p2/a/b.json", V2), ("p/a/b.json", V1)]);
        let (result, _) = resolve(&docs, "9.9.9").await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::NonResolvableProvider { .. }));
        assert_eq!(err.status_code(), 404);
        assert!(err.to_string().contains("vendor a, project b, version 9.9.9"));
    }

    #[tokio::test]
    async fn malformed_documents_fall_through() {
        let docs = documents(&[("p2/a/b.json", "<html>"), ("p/a/b.json", V1)]);
        let (url, _) = resolve(&docs, "1.0.0").await;
        assert_eq!(url.unwrap(), "https://up.example.com/v1.zip");
    }
}
