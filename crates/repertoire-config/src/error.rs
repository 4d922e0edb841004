//! Configuration errors.

use crate::validate::ValidationIssue;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for the expected shape.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A URL setting does not parse.
    #[error("invalid URL '{url}': {message}")]
    Url {
        /// Offending value.
        url: String,
        /// Parser message.
        message: String,
    },

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {}", join_issues(.0))]
    Invalid(Vec<ValidationIssue>),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ConfigError> for repertoire_core::Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
