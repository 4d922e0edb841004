//! Configuration for the Repertoire server.
//!
//! Settings are merged in priority order:
//!
//! 1. Built-in defaults
//! 2. The JSON config file (`repertoire.json` unless `--config` is given)
//! 3. Environment variables (`REPERTOIRE_LISTEN`, `REPERTOIRE_STORAGE_DIR`,
//!    `REPERTOIRE_PUBLIC_URL`)
//! 4. Command line flags
//!
//! ```json
//! {
//!     "listen": "0.0.0.0:8081",
//!     "public_url": "https://repo.example.com",
//!     "storage": {"kind": "filesystem", "path": "/var/lib/repertoire"},
//!     "repositories": [
//!         {"name": "composer-hosted", "type": "hosted"},
//!         {"name": "packagist", "type": "proxy", "remote_url": "https://repo.packagist.org"},
//!         {"name": "composer", "type": "group", "members": ["composer-hosted", "packagist"]}
//!     ]
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod env;
pub mod error;
pub mod loader;
pub mod types;
pub mod validate;

pub use env::{EnvVar, Overrides};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, ConfigSource, DEFAULT_CONFIG_FILE};
pub use types::{
    HttpConfig, RepositoryConfig, RepositoryKind, ServerConfig, StorageConfig, StorageKind,
};
pub use validate::{ValidationIssue, Validator};
