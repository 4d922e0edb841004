//! Loading configuration from file, environment and command line.

use crate::env::Overrides;
use crate::error::{ConfigError, Result};
use crate::types::ServerConfig;
use crate::validate::Validator;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file used when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "repertoire.json";

/// Where a setting came from, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in defaults.
    Default,
    /// The config file.
    File,
    /// `REPERTOIRE_*` variables.
    Environment,
    /// Command line flags.
    Cli,
}

/// Resolves the effective configuration.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    explicit: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        }
    }
}

impl ConfigLoader {
    /// Loader for an explicitly named file, which must exist.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            explicit: true,
        }
    }

    /// Config file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config file.
    ///
    /// A missing default file yields the built-in defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_file(&self) -> Result<(ServerConfig, ConfigSource)> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !self.explicit => {
                debug!(path = %self.path.display(), "no config file, using defaults");
                return Ok((ServerConfig::default(), ConfigSource::Default));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let config = sonic_rs::from_slice(&bytes).map_err(|e| ConfigError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok((config, ConfigSource::File))
    }

    /// File, then environment, then `cli`; validated.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the result is invalid.
    pub fn resolve(&self, env: &Overrides, cli: &Overrides) -> Result<ServerConfig> {
        let (mut config, mut source) = self.load_file()?;
        for (overrides, origin) in [(env, ConfigSource::Environment), (cli, ConfigSource::Cli)] {
            if !overrides.is_empty() {
                overrides.apply(&mut config);
                source = source.max(origin);
            }
        }

        let issues = Validator::validate(&config);
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues));
        }

        info!(
            path = %self.path.display(),
            ?source,
            repositories = config.repositories.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}
