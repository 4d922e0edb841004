//! Proxy repositories: a caching view of a remote Composer repository.

mod resolve;
mod upstream;

pub use resolve::{DistSource, RESOLUTION_CHAIN, resolve_dist_url};
pub use upstream::{Fetched, HttpUpstream, Upstream, UpstreamConfig};

use crate::task::store_verified;
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use repertoire_core::{AssetKind, Error, PackageCoordinate, Result, Route};
use repertoire_metadata::{MetadataProcessor, PackageList, ProviderDocument};
use repertoire_store::{CacheInfo, Content, ContentStore};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// How long cached assets are served without asking the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Max age of metadata documents.
    pub metadata_max_age: Duration,
    /// Max age of zipballs; `None` never expires.
    pub content_max_age: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            metadata_max_age: Duration::days(1),
            content_max_age: None,
        }
    }
}

impl CachePolicy {
    /// Whether `content` may be served without revalidation.
    #[must_use]
    pub fn is_fresh(&self, content: &Content) -> bool {
        let max_age = if content.kind().is_metadata() {
            Some(self.metadata_max_age)
        } else {
            self.content_max_age
        };
        match (content.cache_info(), max_age) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(info), Some(max_age)) => info.is_fresh(Utc::now(), max_age),
        }
    }
}

/// A repository proxying a remote Composer repository.
#[derive(Debug)]
pub struct ProxyRepository {
    name: String,
    remote: Url,
    store: ContentStore,
    processor: MetadataProcessor,
    upstream: Arc<dyn Upstream>,
    policy: CachePolicy,
}

impl ProxyRepository {
    /// Create a proxy of `remote` served at `base_url`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        mut remote: Url,
        store: ContentStore,
        upstream: Arc<dyn Upstream>,
        policy: CachePolicy,
    ) -> Self {
        if !remote.path().ends_with('/') {
            let path = format!("{}/", remote.path());
            remote.set_path(&path);
        }
        Self {
            name: name.into(),
            remote,
            store,
            processor: MetadataProcessor::new(base_url),
            upstream,
            policy,
        }
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote repository root.
    #[must_use]
    pub const fn remote(&self) -> &Url {
        &self.remote
    }

    /// Cache store.
    #[must_use]
    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Processor bound to this repository's URL.
    #[must_use]
    pub const fn processor(&self) -> &MetadataProcessor {
        &self.processor
    }

    /// Serve a GET, from cache while fresh and from the remote otherwise.
    ///
    /// If the remote fails or no longer has the asset, a stale cached copy is
    /// served instead.
    pub fn get<'a>(&'a self, route: &'a Route) -> BoxFuture<'a, Result<Option<Content>>> {
        Box::pin(async move {
            if route.asset_kind().is_none() {
                return Ok(None);
            }
            let path = route.path();

            let cached = self.store.get(&path)?;
            if let Some(content) = &cached
                && self.policy.is_fresh(content)
            {
                debug!(repository = %self.name, path = %path, "serving fresh cached asset");
                return Ok(cached);
            }

            match self.fetch(route).await {
                Ok(Some(content)) => Ok(Some(content)),
                Ok(None) => {
                    if cached.is_some() {
                        warn!(repository = %self.name, path = %path, "remote no longer has asset, serving stale copy");
                    }
                    Ok(cached)
                }
                Err(e) => match cached {
                    Some(content) => {
                        warn!(repository = %self.name, path = %path, error = %e, "remote failed, serving stale copy");
                        Ok(Some(content))
                    }
                    None => Err(e),
                },
            }
        })
    }

    /// Drop the cached copy of `path`.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub fn evict(&self, path: &str) -> Result<bool> {
        self.store.delete(path)
    }

    /// Upstream dist URL of a zipball, trying each [`DistSource`] in turn.
    ///
    /// # Errors
    /// Returns [`Error::NonResolvableProvider`] if no document lists the version.
    pub async fn zipball_url(&self, coordinate: &PackageCoordinate) -> Result<String> {
        resolve_dist_url(coordinate, &RESOLUTION_CHAIN, |route| async move {
            self.get(&route).await
        })
        .await
    }

    async fn fetch(&self, route: &Route) -> Result<Option<Content>> {
        let path = route.path();
        match route {
            Route::Packages => {
                let Some(list) = self.get(&Route::List).await? else {
                    debug!(repository = %self.name, "remote has no package list");
                    return Ok(None);
                };
                let generated = self.processor.generate_packages_from_list(list.payload())?;
                let content = store_verified(
                    &self.store,
                    &path,
                    Bytes::from(generated),
                    AssetKind::Packages,
                    CacheInfo::verified_at(Utc::now()),
                )
                .await?;
                Ok(Some(content))
            }
            Route::Zipball(coordinate) => {
                let dist_url = self.zipball_url(coordinate).await?;
                let url = self
                    .remote
                    .join(&dist_url)
                    .map_err(|e| Error::upstream(&dist_url, e))?;
                self.fetch_and_store(route, &url).await
            }
            _ => {
                let url = self
                    .remote
                    .join(&path)
                    .map_err(|e| Error::upstream(&path, e))?;
                self.fetch_and_store(route, &url).await
            }
        }
    }

    async fn fetch_and_store(&self, route: &Route, url: &Url) -> Result<Option<Content>> {
        let Some(kind) = route.asset_kind() else {
            return Ok(None);
        };
        let Some(fetched) = self.upstream.fetch(url).await? else {
            return Ok(None);
        };

        let path = route.path();
        let origin = url.as_str();
        match kind {
            AssetKind::List => {
                PackageList::from_slice(origin, &fetched.body)?;
            }
            AssetKind::Provider | AssetKind::Package => {
                ProviderDocument::from_slice(origin, &fetched.body)?;
            }
            AssetKind::Packages | AssetKind::Zipball => {}
        }

        let cache_info = CacheInfo {
            last_verified: Utc::now(),
            etag: fetched.etag,
            version: fetched.last_modified,
        };
        let content = store_verified(&self.store, &path, fetched.body, kind, cache_info).await?;
        info!(repository = %self.name, path = %path, url = %url, "cached remote asset");
        Ok(Some(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use repertoire_metadata::PackagesDocument;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct FakeUpstream {
        responses: Mutex<HashMap<String, Result<Option<Fetched>>>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeUpstream {
        fn serve(&self, url: &str, body: &str) {
            self.responses
                .lock()
                .insert(url.to_string(), Ok(Some(Fetched::body(body.as_bytes().to_vec()))));
        }

        fn fail(&self, url: &str) {
            self.responses
                .lock()
                .insert(url.to_string(), Err(Error::upstream(url, "connection reset")));
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    impl Upstream for FakeUpstream {
        fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Option<Fetched>>> {
            self.requests.lock().push(url.to_string());
            let response = match self.responses.lock().get(url.as_str()) {
                Some(Ok(fetched)) => Ok(fetched.clone()),
                Some(Err(e)) => Err(Error::upstream(url, e)),
                None => Ok(None),
            };
            Box::pin(async move { response })
        }
    }

    const REMOTE: &str = "https://remote.example.com/";
    const V1: &str = r#"{"packages":{"a/b":{"1.0.0":{"version":"1.0.0","dist":{"type":"zip","url":"https://remote.example.com/dl/a-b-1.0.0.zip"}}}}}"#;

    fn proxy(upstream: Arc<FakeUpstream>, policy: CachePolicy) -> ProxyRepository {
        ProxyRepository::new(
            "proxy",
            Url::parse("https://repo.example.com/repository/proxy/").unwrap(),
            Url::parse(REMOTE).unwrap(),
            ContentStore::in_memory(),
            upstream,
            policy,
        )
    }

    #[tokio::test]
    async fn metadata_is_fetched_then_cached() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", V1);
        let repo = proxy(upstream.clone(), CachePolicy::default());

        let route = Route::provider("a", "b");
        let first = repo.get(&route).await.unwrap().unwrap();
        assert_eq!(first.payload().as_ref(), V1.as_bytes());
        assert!(first.cache_info().is_some());

        repo.get(&route).await.unwrap().unwrap();
        assert_eq!(upstream.requests().len(), 1);
        assert!(repo.store().get("p/a/b.json").unwrap().unwrap().cache_info().is_some());
    }

    #[tokio::test]
    async fn expired_metadata_is_refetched() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", V1);
        let policy = CachePolicy {
            metadata_max_age: Duration::zero(),
            content_max_age: None,
        };
        let repo = proxy(upstream.clone(), policy);

        let route = Route::provider("a", "b");
        repo.get(&route).await.unwrap();
        repo.get(&route).await.unwrap();
        assert_eq!(upstream.requests().len(), 2);
    }

    #[tokio::test]
    async fn stale_copy_served_when_remote_fails() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", V1);
        let policy = CachePolicy {
            metadata_max_age: Duration::zero(),
            content_max_age: None,
        };
        let repo = proxy(upstream.clone(), policy);
        let route = Route::provider("a", "b");
        repo.get(&route).await.unwrap();

        upstream.fail("https://remote.example.com/p/a/b.json");
        let stale = repo.get(&route).await.unwrap().unwrap();
        assert_eq!(stale.payload().as_ref(), V1.as_bytes());
    }

    #[tokio::test]
    async fn remote_failure_without_cache_propagates() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.fail("https://remote.example.com/p/a/b.json");
        let repo = proxy(upstream, CachePolicy::default());

        let err = repo.get(&Route::provider("a", "b")).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn malformed_remote_metadata_is_rejected() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", "<html>oops</html>");
        let repo = proxy(upstream, CachePolicy::default());

        let err = repo.get(&Route::provider("a", "b")).await.unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata { .. }));
        assert!(repo.store().get("p/a/b.json").unwrap().is_none());
    }

    #[tokio::test]
    async fn packages_root_is_generated_from_list() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve(
            "https://remote.example.com/packages/list.json",
            r#"{"packageNames":["a/b","c/d"]}"#,
        );
        upstream.serve("https://remote.example.com/packages.json", r#"{"packages":{}}"#);
        let repo = proxy(upstream.clone(), CachePolicy::default());

        let root = repo.get(&Route::Packages).await.unwrap().unwrap();
        let root = PackagesDocument::from_slice("root", root.payload()).unwrap();
        assert_eq!(root.available_packages, vec!["a/b", "c/d"]);
        assert_eq!(
            root.metadata_url("a/b").as_deref(),
            Some("https://repo.example.com/repository/proxy/p2/a/b.json")
        );
        assert!(
            !upstream
                .requests()
                .contains(&"https://remote.example.com/packages.json".to_string())
        );
    }

    #[tokio::test]
    async fn zipball_resolves_through_v1_provider() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", V1);
        upstream.serve("https://remote.example.com/dl/a-b-1.0.0.zip", "PK-zip-bytes");
        let repo = proxy(upstream.clone(), CachePolicy::default());

        let route = Route::Zipball(PackageCoordinate::new("a", "b", "1.0.0"));
        let zip = repo.get(&route).await.unwrap().unwrap();
        assert_eq!(zip.payload().as_ref(), b"PK-zip-bytes");
        assert_eq!(zip.content_type(), "application/zip");
        assert_eq!(
            upstream.requests(),
            vec![
                "https://remote.example.com/p2/a/b.json",
                "https://remote.example.com/p2/a/b~dev.json",
                "https://remote.example.com/p/a/b.json",
                "https://remote.example.com/dl/a-b-1.0.0.zip",
            ]
        );

        repo.get(&route).await.unwrap().unwrap();
        assert_eq!(upstream.requests().len(), 4);
    }

    #[tokio::test]
    async fn unresolvable_zipball_is_not_found() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", V1);
        let repo = proxy(upstream, CachePolicy::default());

        let route = Route::Zipball(PackageCoordinate::new("a", "b", "2.0.0"));
        let err = repo.get(&route).await.unwrap_err();
        assert!(matches!(err, Error::NonResolvableProvider { .. }));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn missing_remote_asset_is_none() {
        let repo = proxy(Arc::new(FakeUpstream::default()), CachePolicy::default());
        assert!(repo.get(&Route::List).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn evict_drops_cached_copy() {
        let upstream = Arc::new(FakeUpstream::default());
        upstream.serve("https://remote.example.com/p/a/b.json", V1);
        let repo = proxy(upstream.clone(), CachePolicy::default());
        repo.get(&Route::provider("a", "b")).await.unwrap();

        assert!(repo.evict("/p/a/b.json").unwrap());
        repo.get(&Route::provider("a", "b")).await.unwrap();
        assert_eq!(upstream.requests().len(), 2);
    }
}
