//! Request dispatch shared by all repository types.

use crate::{GroupRepository, HostedRepository, ProxyRepository};
use bytes::Bytes;
use futures::future::BoxFuture;
use repertoire_core::{AssetKind, Error, Result, Route};
use repertoire_metadata::MetadataProcessor;
use repertoire_store::Content;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Who is asking.
///
/// Internal requests come from other repositories (group members, proxy
/// resolution) and receive payloads exactly as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// An HTTP client; metadata is rewritten to this repository's URL.
    Client,
    /// Another repository; no rewriting.
    Internal,
}

/// Repository type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Stores uploads.
    Hosted,
    /// Caches a remote repository.
    Proxy,
    /// Aggregates members.
    Group,
}

impl RepositoryType {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Proxy => "proxy",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Composer repository of any type.
#[derive(Debug, Clone)]
pub enum Repository {
    /// Hosted repository.
    Hosted(Arc<HostedRepository>),
    /// Proxy repository.
    Proxy(Arc<ProxyRepository>),
    /// Group repository.
    Group(Arc<GroupRepository>),
}

impl Repository {
    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Hosted(hosted) => hosted.name(),
            Self::Proxy(proxy) => proxy.name(),
            Self::Group(group) => group.name(),
        }
    }

    /// Repository type.
    #[must_use]
    pub const fn repository_type(&self) -> RepositoryType {
        match self {
            Self::Hosted(_) => RepositoryType::Hosted,
            Self::Proxy(_) => RepositoryType::Proxy,
            Self::Group(_) => RepositoryType::Group,
        }
    }

    /// Processor bound to this repository's public URL.
    #[must_use]
    pub fn processor(&self) -> &MetadataProcessor {
        match self {
            Self::Hosted(hosted) => hosted.processor(),
            Self::Proxy(proxy) => proxy.processor(),
            Self::Group(group) => group.processor(),
        }
    }

    /// Serve a GET for `path`.
    ///
    /// Unrecognized paths are `Ok(None)`.
    pub fn get<'a>(
        &'a self,
        path: &'a str,
        dispatch: Dispatch,
    ) -> BoxFuture<'a, Result<Option<Content>>> {
        Box::pin(async move {
            let Some(route) = Route::classify(path) else {
                trace!(repository = self.name(), path, "path matches no route");
                return Ok(None);
            };
            self.get_route(&route, dispatch).await
        })
    }

    /// Serve a GET for an already classified route.
    pub fn get_route<'a>(
        &'a self,
        route: &'a Route,
        dispatch: Dispatch,
    ) -> BoxFuture<'a, Result<Option<Content>>> {
        Box::pin(async move {
            debug!(repository = self.name(), route = %route, ?dispatch, "get");
            let content = match self {
                Self::Hosted(hosted) => hosted.get(route)?,
                Self::Proxy(proxy) => proxy.get(route).await?,
                Self::Group(group) => group.get(route).await?,
            };
            match content {
                Some(content) if dispatch == Dispatch::Client => {
                    rewrite_response(self.processor(), route, content).map(Some)
                }
                other => Ok(other),
            }
        })
    }

    /// Accept an upload.
    ///
    /// # Errors
    /// Returns [`Error::Unsupported`] unless this is a hosted repository and
    /// `path` is an upload route.
    pub fn put(&self, path: &str, payload: Bytes) -> Result<Content> {
        let route = Route::classify(path).ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        match (self, &route) {
            (Self::Hosted(hosted), Route::Upload(_)) => hosted.put(&route, payload),
            _ => Err(self.unsupported("upload")),
        }
    }

    /// Delete the asset at `path`.
    ///
    /// Proxies evict the cached copy; groups hold nothing of their own.
    ///
    /// # Errors
    /// Returns [`Error::Unsupported`] for groups and storage errors otherwise.
    pub fn delete(&self, path: &str) -> Result<bool> {
        match self {
            Self::Hosted(hosted) => hosted.delete(path),
            Self::Proxy(proxy) => proxy.evict(path),
            Self::Group(_) => Err(self.unsupported("delete")),
        }
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::Unsupported {
            repository: self.name().to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<HostedRepository> for Repository {
    fn from(hosted: HostedRepository) -> Self {
        Self::Hosted(Arc::new(hosted))
    }
}

impl From<ProxyRepository> for Repository {
    fn from(proxy: ProxyRepository) -> Self {
        Self::Proxy(Arc::new(proxy))
    }
}

impl From<GroupRepository> for Repository {
    fn from(group: GroupRepository) -> Self {
        Self::Group(Arc::new(group))
    }
}

/// Point zip dist URLs of provider and package documents at `processor`'s base.
///
/// Other kinds pass through untouched.
///
/// # Errors
/// Returns [`Error::MalformedMetadata`] if the document does not parse.
pub fn rewrite_response(
    processor: &MetadataProcessor,
    route: &Route,
    content: Content,
) -> Result<Content> {
    match route.asset_kind() {
        Some(AssetKind::Provider | AssetKind::Package) => {
            let rewritten = processor.rewrite_package_json(&route.path(), content.payload())?;
            Ok(content.with_payload(rewritten))
        }
        _ => Ok(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repertoire_store::ContentStore;
    use url::Url;

    fn hosted() -> Repository {
        HostedRepository::new(
            "hosted",
            Url::parse("https://repo.example.com/repository/hosted/").unwrap(),
            ContentStore::in_memory(),
            100,
        )
        .into()
    }

    #[test]
    fn rewrite_only_touches_provider_and_package() {
        let processor =
            MetadataProcessor::new(Url::parse("https://repo.example.com/repository/g/").unwrap());
        let body = br#"{"packages":{"a/b":[{"version":"1.0.0","dist":{"type":"zip","url":"https://up.example.com/a.zip"}}]}}"#;

        let package = Content::transient("p2/a/b.json", AssetKind::Package, &body[..]);
        let rewritten =
            rewrite_response(&processor, &Route::package("a", "b", false), package).unwrap();
        let text = String::from_utf8(rewritten.payload().to_vec()).unwrap();
        assert!(text.contains("https://repo.example.com/repository/g/a/b/1.0.0/a-b-1.0.0.zip"));

        let list = Content::transient("packages/list.json", AssetKind::List, &body[..]);
        let untouched = rewrite_response(&processor, &Route::List, list).unwrap();
        assert_eq!(untouched.payload().as_ref(), &body[..]);
    }

    #[test]
    fn rewrite_rejects_malformed_documents() {
        let processor =
            MetadataProcessor::new(Url::parse("https://repo.example.com/repository/g/").unwrap());
        let content = Content::transient("p/a/b.json", AssetKind::Provider, &b"<html>"[..]);
        let err = rewrite_response(&processor, &Route::provider("a", "b"), content).unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let repository = hosted();
        assert!(
            repository
                .get("nothing/here", Dispatch::Client)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn put_requires_upload_route() {
        let repository = hosted();
        let err = repository
            .put("packages.json", Bytes::from_static(b"{}"))
            .unwrap_err();
        assert_eq!(err.status_code(), 405);
    }

    #[test]
    fn type_names() {
        assert_eq!(hosted().repository_type().to_string(), "hosted");
        assert_eq!(RepositoryType::Group.as_str(), "group");
    }
}
