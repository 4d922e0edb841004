//! Environment variable overrides.

use crate::types::{ServerConfig, StorageKind};
use std::path::PathBuf;

/// Environment variables read by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    /// `REPERTOIRE_LISTEN`
    Listen,
    /// `REPERTOIRE_STORAGE_DIR`
    StorageDir,
    /// `REPERTOIRE_PUBLIC_URL`
    PublicUrl,
}

impl EnvVar {
    /// All variables.
    pub const ALL: [Self; 3] = [Self::Listen, Self::StorageDir, Self::PublicUrl];

    /// Variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listen => "REPERTOIRE_LISTEN",
            Self::StorageDir => "REPERTOIRE_STORAGE_DIR",
            Self::PublicUrl => "REPERTOIRE_PUBLIC_URL",
        }
    }
}

/// Overrides taken from the environment or the command line.
///
/// Unset and blank values leave the file setting alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Listen address.
    pub listen: Option<String>,
    /// Filesystem storage root; also switches storage to the filesystem backend.
    pub storage_dir: Option<PathBuf>,
    /// Public base URL.
    pub public_url: Option<String>,
}

impl Overrides {
    /// Overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |var: EnvVar| lookup(var.as_str()).filter(|value| !value.trim().is_empty());
        Self {
            listen: get(EnvVar::Listen),
            storage_dir: get(EnvVar::StorageDir).map(PathBuf::from),
            public_url: get(EnvVar::PublicUrl),
        }
    }

    /// Whether nothing is overridden.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.listen.is_none() && self.storage_dir.is_none() && self.public_url.is_none()
    }

    /// Write the set values into `config`.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(listen) = &self.listen {
            config.listen.clone_from(listen);
        }
        if let Some(dir) = &self.storage_dir {
            config.storage.kind = StorageKind::Filesystem;
            config.storage.path.clone_from(dir);
        }
        if let Some(url) = &self.public_url {
            config.public_url = Some(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn names() {
        assert_eq!(EnvVar::Listen.as_str(), "REPERTOIRE_LISTEN");
        assert_eq!(EnvVar::ALL.len(), 3);
    }

    #[test]
    fn lookup_skips_blank_values() {
        let vars: HashMap<&str, &str> = [
            ("REPERTOIRE_LISTEN", "0.0.0.0:9000"),
            ("REPERTOIRE_PUBLIC_URL", "  "),
        ]
        .into_iter()
        .collect();
        let overrides = Overrides::from_lookup(|name| vars.get(name).map(|v| (*v).to_string()));
        assert_eq!(overrides.listen.as_deref(), Some("0.0.0.0:9000"));
        assert!(overrides.public_url.is_none());
        assert!(overrides.storage_dir.is_none());
    }

    #[test]
    fn storage_dir_forces_filesystem() {
        let mut config = ServerConfig::default();
        config.storage.kind = StorageKind::Memory;
        Overrides {
            storage_dir: Some(PathBuf::from("/var/lib/repertoire")),
            ..Overrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.storage.kind, StorageKind::Filesystem);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/repertoire"));
    }
}
