//! Package coordinates and canonical asset paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version used for paths that do not carry one.
pub const LATEST_VERSION: &str = "latest";

/// Vendor, project and version of the component an asset belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageCoordinate {
    /// Vendor segment (before the `/` of a package name).
    pub vendor: String,
    /// Project segment (after the `/` of a package name).
    pub project: String,
    /// Exact version string.
    pub version: String,
}

impl PackageCoordinate {
    /// Create a coordinate.
    #[must_use]
    pub fn new(
        vendor: impl Into<String>,
        project: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            project: project.into(),
            version: version.into(),
        }
    }

    /// Derive a coordinate from an asset path.
    ///
    /// Paths with fewer than three segments fall back to degenerate values:
    /// `packages.json` becomes `{packages.json, packages.json, latest}` and
    /// `packages/list.json` becomes `{packages, list.json, latest}`.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let normalized = normalize_path(path);
        let mut parts = normalized.split('/');
        let vendor = parts.next().unwrap_or_default();
        let project = parts.next().unwrap_or(vendor);
        let version = parts.next().unwrap_or(LATEST_VERSION);
        Self::new(vendor, project, version)
    }

    /// Build from a composer `vendor/project` name.
    #[must_use]
    pub fn from_name(name: &str, version: impl Into<String>) -> Option<Self> {
        let (vendor, project) = name.split_once('/')?;
        if vendor.is_empty() || project.is_empty() || project.contains('/') {
            return None;
        }
        Some(Self::new(vendor, project, version))
    }

    /// Composer package name.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.vendor, self.project)
    }

    /// Canonical zipball path for this coordinate.
    #[must_use]
    pub fn zipball_path(&self) -> String {
        zipball_path(&self.vendor, &self.project, &self.version)
    }
}

impl fmt::Display for PackageCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.vendor, self.project, self.version)
    }
}

/// Zipball storage path: `vendor/project/version/vendor-project-version.zip`.
///
/// This is the join key between rewritten dist URLs and stored archives.
#[must_use]
pub fn zipball_path(vendor: &str, project: &str, version: &str) -> String {
    format!("{vendor}/{project}/{version}/{vendor}-{project}-{version}.zip")
}

/// Collapse repeated slashes and strip leading and trailing ones.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_of_root_index() {
        let c = PackageCoordinate::from_path("packages.json");
        assert_eq!(c, PackageCoordinate::new("packages.json", "packages.json", "latest"));
    }

    #[test]
    fn coordinate_of_list_index() {
        let c = PackageCoordinate::from_path("packages/list.json");
        assert_eq!(c, PackageCoordinate::new("packages", "list.json", "latest"));
    }

    #[test]
    fn coordinate_of_versioned_path() {
        let c = PackageCoordinate::from_path("acme/widget/1.2.3");
        assert_eq!(c, PackageCoordinate::new("acme", "widget", "1.2.3"));

        let c = PackageCoordinate::from_path("/acme/widget/1.2.3/acme-widget-1.2.3.zip");
        assert_eq!(c, PackageCoordinate::new("acme", "widget", "1.2.3"));
    }

    #[test]
    fn zipball_path_is_format_fixed() {
        assert_eq!(
            zipball_path("rjkip", "ftp-php", "v1.1.0"),
            "rjkip/ftp-php/v1.1.0/rjkip-ftp-php-v1.1.0.zip"
        );
        let c = PackageCoordinate::new("a", "b", "1.0");
        assert_eq!(c.zipball_path(), "a/b/1.0/a-b-1.0.zip");
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_path("//a///b/c/"), "a/b/c");
        assert_eq!(normalize_path("/packages.json"), "packages.json");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn from_name() {
        let c = PackageCoordinate::from_name("rjkip/ftp-php", "v1.1.0").unwrap();
        assert_eq!(c.vendor, "rjkip");
        assert_eq!(c.project, "ftp-php");
        assert_eq!(c.name(), "rjkip/ftp-php");
        assert!(PackageCoordinate::from_name("nonamespace", "1.0").is_none());
        assert!(PackageCoordinate::from_name("a/b/c", "1.0").is_none());
    }
}
