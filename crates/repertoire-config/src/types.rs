//! Configuration document types.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8081";

/// Default browse page size of hosted metadata indexes.
pub const DEFAULT_PAGING_SIZE: usize = 100;

/// Default metadata max age for proxies and groups (one day).
pub const DEFAULT_METADATA_MAX_AGE_SECS: u64 = 86_400;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub listen: String,
    /// Externally visible base URL; derived from `listen` when unset.
    pub public_url: Option<String>,
    /// Where assets are stored.
    pub storage: StorageConfig,
    /// Upstream HTTP client settings.
    pub http: HttpConfig,
    /// Repositories in declaration order; groups may only reference earlier entries.
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            public_url: None,
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
            repositories: vec![
                RepositoryConfig::hosted("composer-hosted"),
                RepositoryConfig::proxy("packagist", "https://repo.packagist.org/"),
                RepositoryConfig::group("composer", ["composer-hosted", "packagist"]),
            ],
        }
    }
}

impl ServerConfig {
    /// Base URL clients reach this server at, always ending in `/`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Url`] if the configured or derived URL is invalid.
    pub fn public_url(&self) -> Result<Url> {
        let raw = self
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen));
        let mut url = Url::parse(&raw).map_err(|e| ConfigError::Url {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Base URL of repository `name`: `{public_url}repository/{name}/`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Url`] if the public URL is invalid.
    pub fn repository_url(&self, name: &str) -> Result<Url> {
        let base = self.public_url()?;
        base.join(&format!("repository/{name}/"))
            .map_err(|e| ConfigError::Url {
                url: format!("{base}repository/{name}/"),
                message: e.to_string(),
            })
    }

    /// Repository declared as `name`.
    #[must_use]
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|repo| repo.name == name)
    }
}

/// Storage backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process memory; lost on exit.
    Memory,
    /// Blobs and records under `path`.
    #[default]
    Filesystem,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend kind.
    pub kind: StorageKind,
    /// Root directory of the filesystem backend. Each repository gets a subdirectory.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Filesystem,
            path: PathBuf::from("repertoire-data"),
        }
    }
}

/// Upstream HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` override.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 60,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Repository type as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// Stores uploads.
    Hosted,
    /// Caches `remote_url`.
    Proxy,
    /// Aggregates `members`.
    Group,
}

/// One repository definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Unique name; also the URL segment.
    pub name: String,
    /// Repository type.
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    /// Remote repository root (proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Member names in priority order (groups).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Metadata max age in seconds (proxies and groups).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_max_age_secs: Option<u64>,
    /// Zipball max age in seconds (proxies); unset never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_max_age_secs: Option<u64>,
    /// Metadata index page size (hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_size: Option<usize>,
}

impl RepositoryConfig {
    fn new(name: &str, kind: RepositoryKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            remote_url: None,
            members: Vec::new(),
            metadata_max_age_secs: None,
            content_max_age_secs: None,
            paging_size: None,
        }
    }

    /// Hosted repository definition.
    #[must_use]
    pub fn hosted(name: &str) -> Self {
        Self::new(name, RepositoryKind::Hosted)
    }

    /// Proxy repository definition.
    #[must_use]
    pub fn proxy(name: &str, remote_url: &str) -> Self {
        Self {
            remote_url: Some(remote_url.to_string()),
            ..Self::new(name, RepositoryKind::Proxy)
        }
    }

    /// Group repository definition.
    #[must_use]
    pub fn group<'a>(name: &str, members: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            members: members.into_iter().map(str::to_string).collect(),
            ..Self::new(name, RepositoryKind::Group)
        }
    }

    /// Metadata max age.
    #[must_use]
    pub fn metadata_max_age(&self) -> Duration {
        Duration::from_secs(
            self.metadata_max_age_secs
                .unwrap_or(DEFAULT_METADATA_MAX_AGE_SECS),
        )
    }

    /// Zipball max age; `None` never expires.
    #[must_use]
    pub fn content_max_age(&self) -> Option<Duration> {
        self.content_max_age_secs.map(Duration::from_secs)
    }

    /// Metadata index page size.
    #[must_use]
    pub fn paging_size(&self) -> usize {
        self.paging_size.unwrap_or(DEFAULT_PAGING_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_defaults_to_listen() {
        let config = ServerConfig::default();
        assert_eq!(config.public_url().unwrap().as_str(), "http://127.0.0.1:8081/");
        assert_eq!(
            config.repository_url("composer").unwrap().as_str(),
            "http://127.0.0.1:8081/repository/composer/"
        );
    }

    #[test]
    fn public_url_keeps_path_prefix() {
        let config = ServerConfig {
            public_url: Some("https://repo.example.com/nexus".into()),
            ..ServerConfig::default()
        };
        assert_eq!(
            config.repository_url("hosted").unwrap().as_str(),
            "https://repo.example.com/nexus/repository/hosted/"
        );
    }

    #[test]
    fn parse_repository_definitions() {
        let json = r#"{
            "listen": "0.0.0.0:9000",
            "storage": {"kind": "memory"},
            "repositories": [
                {"name": "hosted", "type": "hosted", "paging_size": 10},
                {"name": "packagist", "type": "proxy", "remote_url": "https://repo.packagist.org", "content_max_age_secs": 60},
                {"name": "all", "type": "group", "members": ["hosted", "packagist"]}
            ]
        }"#;
        let config: ServerConfig = sonic_rs::from_str(json).unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.storage.kind, StorageKind::Memory);
        assert_eq!(config.http, HttpConfig::default());
        assert_eq!(config.repositories.len(), 3);
        assert_eq!(config.repositories[0].paging_size(), 10);
        assert_eq!(
            config.repositories[1].content_max_age(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            config.repositories[2].metadata_max_age(),
            Duration::from_secs(DEFAULT_METADATA_MAX_AGE_SECS)
        );
        assert_eq!(config.repository("all").unwrap().kind, RepositoryKind::Group);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{"listen": "127.0.0.1:1", "colour": "blue"}"#;
        assert!(sonic_rs::from_str::<ServerConfig>(json).is_err());
    }
}
