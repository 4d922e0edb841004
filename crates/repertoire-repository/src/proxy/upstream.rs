//! Fetching from the remote repository behind a proxy.

use bytes::Bytes;
use futures::future::BoxFuture;
use repertoire_core::{Error, Result};
use reqwest::{
    Client, StatusCode,
    header::{ETAG, HeaderMap, LAST_MODIFIED, USER_AGENT},
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// A successful upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Response body.
    pub body: Bytes,
    /// `ETag` header.
    pub etag: Option<String>,
    /// `Last-Modified` header.
    pub last_modified: Option<String>,
}

impl Fetched {
    /// Body without validators.
    #[must_use]
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            etag: None,
            last_modified: None,
        }
    }
}

/// Source of remote content.
///
/// `Ok(None)` means the remote does not have the resource.
pub trait Upstream: Send + Sync + fmt::Debug {
    /// Fetch `url`.
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Option<Fetched>>>;
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// `User-Agent` sent upstream.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            user_agent: concat!("repertoire/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`Upstream`] over HTTP(S).
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
    config: Arc<UpstreamConfig>,
}

impl fmt::Debug for HttpUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpUpstream")
            .field("client", &"reqwest::Client")
            .field("config", &self.config)
            .finish()
    }
}

impl HttpUpstream {
    /// Build a client.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the client cannot be built.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .tcp_nodelay(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Client settings.
    #[must_use]
    pub const fn config(&self) -> &Arc<UpstreamConfig> {
        &self.config
    }

    async fn send(&self, url: &Url) -> Result<Option<Fetched>> {
        debug!(url = %url, "fetching from upstream");
        let response = self
            .client
            .get(url.as_str())
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| Error::upstream(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!(url = %url, status = status.as_u16(), "upstream does not have resource");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Upstream {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let etag = header(response.headers(), ETAG);
        let last_modified = header(response.headers(), LAST_MODIFIED);
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::upstream(url, e))?;
        trace!(url = %url, size = body.len(), "upstream response read");

        Ok(Some(Fetched {
            body,
            etag,
            last_modified,
        }))
    }
}

impl Upstream for HttpUpstream {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Option<Fetched>>> {
        Box::pin(self.send(url))
    }
}

fn header(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
