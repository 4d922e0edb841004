//! Store writes from async request paths.

use bytes::Bytes;
use repertoire_core::{AssetKind, Error, Result};
use repertoire_store::{CacheInfo, Content, ContentStore};

/// Store `payload` at `path` and mark it verified, on the blocking pool.
///
/// Filesystem writes sync to disk under a stripe lock and must not stall the
/// async workers. A panicked write surfaces as a store error on `path`.
pub(crate) async fn store_verified(
    store: &ContentStore,
    path: &str,
    payload: Bytes,
    kind: AssetKind,
    cache_info: CacheInfo,
) -> Result<Content> {
    let store = store.clone();
    let target = path.to_string();
    tokio::task::spawn_blocking(move || {
        let content = store.put(&target, payload, kind)?;
        store.set_cache_info(&target, &content, cache_info.clone())?;
        Ok(content.with_cache_info(cache_info))
    })
    .await
    .map_err(|e| Error::store(path, e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repertoire_store::FileBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn write_lands_with_cache_info() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(Arc::new(FileBackend::open(dir.path()).unwrap()));
        let verified = Utc::now();

        let content = store_verified(
            &store,
            "/p/a/b.json",
            Bytes::from_static(br#"{"packages":{}}"#),
            AssetKind::Provider,
            CacheInfo::verified_at(verified),
        )
        .await
        .unwrap();
        assert_eq!(content.cache_info().unwrap().last_verified, verified);

        let stored = store.get("p/a/b.json").unwrap().unwrap();
        assert_eq!(stored.kind(), AssetKind::Provider);
        assert_eq!(stored.cache_info().unwrap().last_verified, verified);
    }
}
