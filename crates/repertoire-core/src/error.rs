//! Error types for repository operations.

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for repertoire.
#[derive(Error, Debug)]
pub enum Error {
    /// A Composer document did not have the shape expected for its kind.
    #[error("malformed metadata in {origin}: {message}")]
    MalformedMetadata {
        /// Path or URL of the offending document.
        origin: String,
        /// What was wrong with it.
        message: String,
    },

    /// The document is valid but does not list the requested version.
    #[error("version '{version}' of '{name}' not found")]
    VersionNotFound {
        /// Package name (`vendor/project`).
        name: String,
        /// Exact version that was asked for.
        version: String,
    },

    /// Every dist URL resolution step failed.
    #[error("no provider found for vendor {vendor}, project {project}, version {version}")]
    NonResolvableProvider {
        /// Vendor segment.
        vendor: String,
        /// Project segment.
        project: String,
        /// Requested version.
        version: String,
    },

    /// Talking to a remote repository failed.
    #[error("upstream error fetching {url}: {message}")]
    Upstream {
        /// URL being fetched.
        url: String,
        /// HTTP status code if a response was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// Blob or attribute persistence failed.
    #[error("store error at {path}: {message}")]
    Store {
        /// Asset path.
        path: String,
        /// Error message.
        message: String,
    },

    /// Path does not match any route.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Upload request was missing a field or had an empty one.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// The repository type does not support the operation.
    #[error("{operation} is not supported by repository '{repository}'")]
    Unsupported {
        /// Repository name.
        repository: String,
        /// Operation that was attempted.
        operation: String,
    },

    /// Archive could not be read.
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// IO error.
    #[error("io error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Create an IO error with context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a store error for an asset path.
    #[must_use]
    pub fn store(path: impl Into<String>, message: impl Display) -> Self {
        Self::Store {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed metadata error.
    #[must_use]
    pub fn malformed(origin: impl Into<String>, message: impl Display) -> Self {
        Self::MalformedMetadata {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    /// Create an upstream error without a status code.
    #[must_use]
    pub fn upstream(url: impl Display, message: impl Display) -> Self {
        Self::Upstream {
            url: url.to_string(),
            status: None,
            message: message.to_string(),
        }
    }

    /// HTTP status a client should see for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MalformedMetadata { .. } | Self::Upstream { .. } => 502,
            Self::VersionNotFound { .. }
            | Self::NonResolvableProvider { .. }
            | Self::InvalidPath(_) => 404,
            Self::InvalidUpload(_) => 400,
            Self::Unsupported { .. } => 405,
            Self::Store { .. }
            | Self::Archive(_)
            | Self::Config(_)
            | Self::Json(_)
            | Self::Io { .. } => 500,
        }
    }

    /// Whether this error means "the thing asked for does not exist".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status_code() == 404
    }
}

/// Result type for repertoire operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_policy() {
        assert_eq!(Error::malformed("p/a/b.json", "not an object").status_code(), 502);
        assert_eq!(Error::upstream("https://example.com", "reset").status_code(), 502);
        assert_eq!(
            Error::NonResolvableProvider {
                vendor: "a".into(),
                project: "b".into(),
                version: "1.0".into(),
            }
            .status_code(),
            404
        );
        assert_eq!(Error::store("a/b", "disk full").status_code(), 500);
        assert_eq!(Error::InvalidUpload("vendor".into()).status_code(), 400);
        assert_eq!(
            Error::Unsupported {
                repository: "group".into(),
                operation: "upload".into(),
            }
            .status_code(),
            405
        );
    }

    #[test]
    fn non_resolvable_message_names_coordinate() {
        let err = Error::NonResolvableProvider {
            vendor: "acme".into(),
            project: "widget".into(),
            version: "1.2.3".into(),
        };
        let message = err.to_string();
        assert!(message.contains("acme"));
        assert!(message.contains("widget"));
        assert!(message.contains("1.2.3"));
        assert!(err.is_not_found());
    }
}
