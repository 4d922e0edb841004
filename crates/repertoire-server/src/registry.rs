//! Building repositories from configuration.

use indexmap::IndexMap;
use repertoire_config::{RepositoryConfig, RepositoryKind, ServerConfig, StorageKind};
use repertoire_core::{Error, Result};
use repertoire_repository::{
    CachePolicy, GroupRepository, HostedRepository, HttpUpstream, ProxyRepository, Repository,
    Upstream, UpstreamConfig,
};
use repertoire_store::{ContentStore, FileBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// Every configured repository, by name, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RepositoryRegistry {
    repositories: IndexMap<String, Repository>,
}

impl RepositoryRegistry {
    /// Build every repository in `config` with a shared HTTP upstream.
    ///
    /// # Errors
    /// Returns error if a store cannot be opened or a URL is invalid.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(UpstreamConfig {
            connect_timeout: config.http.connect_timeout(),
            timeout: config.http.timeout(),
            user_agent: config
                .http
                .user_agent
                .clone()
                .unwrap_or_else(|| UpstreamConfig::default().user_agent),
        })?);
        Self::with_upstream(config, &upstream)
    }

    /// Build every repository in `config`, proxies fetching through `upstream`.
    ///
    /// # Errors
    /// Returns error if a store cannot be opened or a URL is invalid.
    pub fn with_upstream(config: &ServerConfig, upstream: &Arc<dyn Upstream>) -> Result<Self> {
        let mut registry = Self::default();
        for repo in &config.repositories {
            let built = registry.build(config, repo, upstream)?;
            info!(
                repository = %repo.name,
                kind = %built.repository_type(),
                url = %config.repository_url(&repo.name)?,
                "repository ready"
            );
            registry.repositories.insert(repo.name.clone(), built);
        }
        Ok(registry)
    }

    /// Repository named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.get(name)
    }

    /// Hosted repository named `name`.
    #[must_use]
    pub fn hosted(&self, name: &str) -> Option<&Arc<HostedRepository>> {
        match self.repositories.get(name)? {
            Repository::Hosted(hosted) => Some(hosted),
            _ => None,
        }
    }

    /// Repositories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.values()
    }

    /// Number of repositories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Whether no repository is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Load the metadata index of every hosted repository from its saved
    /// snapshot, rebuilding it from stored zipballs when there is none.
    pub fn warm_indexes(&self, cancel: &CancellationToken) {
        for repository in self.iter() {
            let Repository::Hosted(hosted) = repository else {
                continue;
            };
            match hosted.load_index() {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(repository = hosted.name(), error = %e, "unreadable metadata index, rebuilding");
                }
            }
            if let Err(e) = hosted.rebuild(false, cancel) {
                warn!(repository = hosted.name(), error = %e, "failed to rebuild metadata index");
            }
        }
    }

    fn build(
        &self,
        config: &ServerConfig,
        repo: &RepositoryConfig,
        upstream: &Arc<dyn Upstream>,
    ) -> Result<Repository> {
        let base_url = config.repository_url(&repo.name)?;
        let store = open_store(config, &repo.name)?;

        let repository = match repo.kind {
            RepositoryKind::Hosted => {
                HostedRepository::new(&repo.name, base_url, store, repo.paging_size()).into()
            }
            RepositoryKind::Proxy => {
                let raw = repo.remote_url.as_deref().ok_or_else(|| {
                    Error::Config(format!("proxy '{}' has no remote_url", repo.name))
                })?;
                let remote = Url::parse(raw)
                    .map_err(|e| Error::Config(format!("invalid remote_url '{raw}': {e}")))?;
                ProxyRepository::new(
                    &repo.name,
                    base_url,
                    remote,
                    store,
                    Arc::clone(upstream),
                    cache_policy(repo)?,
                )
                .into()
            }
            RepositoryKind::Group => {
                let members = repo
                    .members
                    .iter()
                    .map(|member| {
                        self.get(member).cloned().ok_or_else(|| {
                            Error::Config(format!(
                                "group '{}' references unknown member '{member}'",
                                repo.name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                GroupRepository::new(&repo.name, base_url, members, store, cache_policy(repo)?)
                    .into()
            }
        };
        Ok(repository)
    }
}

fn open_store(config: &ServerConfig, name: &str) -> Result<ContentStore> {
    match config.storage.kind {
        StorageKind::Memory => Ok(ContentStore::in_memory()),
        StorageKind::Filesystem => {
            let backend = FileBackend::open(config.storage.path.join(name))?;
            Ok(ContentStore::new(Arc::new(backend)))
        }
    }
}

fn cache_policy(repo: &RepositoryConfig) -> Result<CachePolicy> {
    Ok(CachePolicy {
        metadata_max_age: max_age(repo.metadata_max_age())?,
        content_max_age: repo.content_max_age().map(max_age).transpose()?,
    })
}

fn max_age(duration: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| Error::Config(format!("max age {duration:?} out of range: {e}")))
}
