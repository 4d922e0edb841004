//! HTTP surface.
//!
//! ```text
//! GET    /health
//! GET    /repository/{name}/{*path}
//! PUT    /repository/{name}/packages/upload/{vendor}/{project}/{version}
//! DELETE /repository/{name}/{*path}
//! ```

use crate::registry::RepositoryRegistry;
use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use repertoire_core::{Error, json};
use repertoire_repository::{Dispatch, Repository};
use repertoire_store::Content;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Multipart field carrying the archive.
const PACKAGE_FIELD: &str = "package";

/// Router over every repository in `registry`.
pub fn router(registry: Arc<RepositoryRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/repository/{name}/{*path}",
            get(fetch).put(upload).delete(remove),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(registry)
}

/// Serve until `cancel` fires.
///
/// # Errors
/// Returns error if the server fails.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<RepositoryRegistry>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), repositories = registry.len(), "listening");
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
}

/// A repository error rendered as status code plus plain-text message.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}

async fn health() -> &'static str {
    "OK"
}

fn repository(registry: &RepositoryRegistry, name: &str) -> Result<Repository, ApiError> {
    registry
        .get(name)
        .cloned()
        .ok_or_else(|| ApiError(Error::InvalidPath(format!("no repository named '{name}'"))))
}

async fn fetch(
    State(registry): State<Arc<RepositoryRegistry>>,
    Path((name, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let repository = repository(&registry, &name)?;
    let Some(content) = repository.get(&path, Dispatch::Client).await? else {
        return Ok((StatusCode::NOT_FOUND, format!("{path} not found")).into_response());
    };

    let etag = content.etag();
    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == etag);
    if not_modified {
        return Ok(with_validators(StatusCode::NOT_MODIFIED, Body::empty(), &content));
    }

    let payload = content.payload().clone();
    Ok(with_validators(StatusCode::OK, Body::from(payload), &content))
}

fn with_validators(status: StatusCode, body: Body, content: &Content) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content.content_type()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&content.etag()) {
        headers.insert(header::ETAG, value);
    }
    let last_modified = content
        .last_modified()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    response
}

#[derive(Serialize)]
struct Uploaded<'a> {
    path: &'a str,
    size: u64,
    sha1: &'a str,
}

async fn upload(
    State(registry): State<Arc<RepositoryRegistry>>,
    Path((name, path)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let repository = repository(&registry, &name)?;
    let payload = read_upload(request).await?;

    let content = tokio::task::spawn_blocking(move || repository.put(&path, payload))
        .await
        .map_err(|e| Error::store(&name, format!("upload task failed: {e}")))??;

    let record = content.record();
    let body = json::to_json_vec(&Uploaded {
        path: &record.path,
        size: record.size,
        sha1: &record.hashes.sha1,
    })?;
    Ok((
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Archive bytes from a raw body or the `package` field of a multipart form.
async fn read_upload(request: Request) -> Result<Bytes, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        return axum::body::to_bytes(request.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| ApiError(Error::InvalidUpload(format!("failed to read body: {e}"))));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError(Error::InvalidUpload(e.body_text())))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(Error::InvalidUpload(e.body_text())))?
    {
        if field.name() == Some(PACKAGE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError(Error::InvalidUpload(e.body_text())));
        }
    }
    Err(ApiError(Error::InvalidUpload(format!(
        "multipart form has no '{PACKAGE_FIELD}' field"
    ))))
}

async fn remove(
    State(registry): State<Arc<RepositoryRegistry>>,
    Path((name, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let repository = repository(&registry, &name)?;
    let target = path.clone();
    let deleted = tokio::task::spawn_blocking(move || repository.delete(&target))
        .await
        .map_err(|e| Error::store(&name, format!("delete task failed: {e}")))??;
    if deleted {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((StatusCode::NOT_FOUND, format!("{path} not found")).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repertoire_config::{RepositoryConfig, ServerConfig, StorageConfig, StorageKind};
    use repertoire_store::archive::create_zip;
    use std::net::SocketAddr;

    struct TestServer {
        addr: SocketAddr,
        cancel: CancellationToken,
    }

    impl TestServer {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let config = ServerConfig {
                listen: addr.to_string(),
                storage: StorageConfig {
                    kind: StorageKind::Memory,
                    ..StorageConfig::default()
                },
                repositories: vec![
                    RepositoryConfig::hosted("hosted"),
                    RepositoryConfig::group("group", ["hosted"]),
                ],
                ..ServerConfig::default()
            };
            let registry = Arc::new(RepositoryRegistry::from_config(&config).unwrap());
            let cancel = CancellationToken::new();
            tokio::spawn(serve(listener, registry, cancel.clone()));
            Self { addr, cancel }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.addr)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn archive() -> Vec<u8> {
        create_zip(&[("composer.json", br#"{"name":"rjkip/ftp-php"}"#)]).unwrap()
    }

    #[tokio::test]
    async fn health() {
        let server = TestServer::start().await;
        let body = reqwest::get(server.url("/health")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn upload_then_download_through_group() {
        let server = TestServer::start().await;
        let client = reqwest::Client::new();

        let response = client
            .put(server.url("/repository/hosted/packages/upload/rjkip/ftp-php/v1.1.0"))
            .body(archive())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);

        let provider = client
            .get(server.url("/repository/group/p2/rjkip/ftp-php.json"))
            .send()
            .await
            .unwrap();
        assert_eq!(provider.status().as_u16(), 200);
        assert_eq!(
            provider.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        let text = provider.text().await.unwrap();
        let zip_url = server.url("/repository/group/rjkip/ftp-php/v1.1.0/rjkip-ftp-php-v1.1.0.zip");
        assert!(text.contains(&zip_url));

        let zip = client.get(&zip_url).send().await.unwrap();
        assert_eq!(zip.status().as_u16(), 200);
        let etag = zip.headers()["etag"].to_str().unwrap().to_string();
        assert_eq!(zip.bytes().await.unwrap().as_ref(), archive().as_slice());

        let cached = client
            .get(&zip_url)
            .header("if-none-match", etag)
            .send()
            .await
            .unwrap();
        assert_eq!(cached.status().as_u16(), 304);
    }

    #[tokio::test]
    async fn multipart_upload_and_delete() {
        let server = TestServer::start().await;
        let client = reqwest::Client::new();
        let boundary = "repertoire-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"package\"; filename=\"a.zip\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(&archive());
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let response = client
            .put(server.url("/repository/hosted/packages/upload/acme/tool/1.0.0"))
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);

        let zip = server.url("/repository/hosted/acme/tool/1.0.0/acme-tool-1.0.0.zip");
        assert_eq!(client.get(&zip).send().await.unwrap().status().as_u16(), 200);
        assert_eq!(client.delete(&zip).send().await.unwrap().status().as_u16(), 204);
        assert_eq!(client.get(&zip).send().await.unwrap().status().as_u16(), 404);
        assert_eq!(client.delete(&zip).send().await.unwrap().status().as_u16(), 404);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let server = TestServer::start().await;
        let client = reqwest::Client::new();

        let missing_repo = client
            .get(server.url("/repository/nope/packages.json"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_repo.status().as_u16(), 404);

        let blank = client
            .put(server.url("/repository/hosted/packages/upload/acme/tool/1.0.0"))
            .body(Vec::new())
            .send()
            .await
            .unwrap();
        assert_eq!(blank.status().as_u16(), 400);

        let group_upload = client
            .put(server.url("/repository/group/packages/upload/acme/tool/1.0.0"))
            .body(archive())
            .send()
            .await
            .unwrap();
        assert_eq!(group_upload.status().as_u16(), 405);

        let unknown = client
            .get(server.url("/repository/hosted/p/acme/unknown.json"))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status().as_u16(), 404);
    }
}
