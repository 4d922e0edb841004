//! Classification of repository request paths.
//!
//! A repository serves a fixed set of Composer routes under its base path:
//!
//! | Path | Kind |
//! |---|---|
//! | `packages.json` | [`AssetKind::Packages`] |
//! | `packages/list.json` | [`AssetKind::List`] |
//! | `p/{vendor}/{project}.json` | [`AssetKind::Provider`] |
//! | `p2/{vendor}/{project}.json` | [`AssetKind::Package`] |
//! | `p2/{vendor}/{project}~dev.json` | [`AssetKind::Package`] (dev) |
//! | `{vendor}/{project}/{version}/{vendor}-{project}-{version}.zip` | [`AssetKind::Zipball`] |
//! | `packages/upload/{vendor}/{project}/{version}` | upload (PUT) |

use crate::coordinate::{PackageCoordinate, normalize_path, zipball_path};
use serde::{Deserialize, Serialize};
use std::fmt;

const JSON_CONTENT_TYPE: &str = "application/json";
const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Kind of a stored asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetKind {
    /// Root `packages.json` index.
    Packages,
    /// `packages/list.json` name list.
    List,
    /// Legacy v1 provider document.
    Provider,
    /// v2 per-package document, stable or dev.
    Package,
    /// Package archive.
    Zipball,
}

impl AssetKind {
    /// Upper-case name as recorded in asset attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Packages => "PACKAGES",
            Self::List => "LIST",
            Self::Provider => "PROVIDER",
            Self::Package => "PACKAGE",
            Self::Zipball => "ZIPBALL",
        }
    }

    /// Content type served for this kind.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Zipball => ZIP_CONTENT_TYPE,
            _ => JSON_CONTENT_TYPE,
        }
    }

    /// Whether this kind is a JSON metadata document.
    #[must_use]
    pub const fn is_metadata(self) -> bool {
        !matches!(self, Self::Zipball)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `packages.json`.
    Packages,
    /// `packages/list.json`.
    List,
    /// `p/{vendor}/{project}.json`.
    Provider {
        /// Vendor segment.
        vendor: String,
        /// Project segment.
        project: String,
    },
    /// `p2/{vendor}/{project}.json` or `p2/{vendor}/{project}~dev.json`.
    Package {
        /// Vendor segment.
        vendor: String,
        /// Project segment.
        project: String,
        /// Dev-branch document.
        dev: bool,
    },
    /// `{vendor}/{project}/{version}/{vendor}-{project}-{version}.zip`.
    Zipball(PackageCoordinate),
    /// `packages/upload/{vendor}/{project}/{version}`.
    Upload(PackageCoordinate),
}

impl Route {
    /// Classify a path relative to the repository root.
    ///
    /// Leading, trailing and repeated slashes are ignored. Returns `None` when
    /// the path matches no route or contains `.`/`..` segments.
    #[must_use]
    pub fn classify(path: &str) -> Option<Self> {
        let normalized = normalize_path(path);
        let segments: Vec<&str> = normalized.split('/').collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return None;
        }

        match segments.as_slice() {
            ["packages.json"] => Some(Self::Packages),
            ["packages", "list.json"] => Some(Self::List),
            ["packages", "upload", vendor, project, version] => Some(Self::Upload(
                PackageCoordinate::new(*vendor, *project, *version),
            )),
            ["p", vendor, file] => {
                let project = file.strip_suffix(".json").filter(|p| !p.is_empty())?;
                Some(Self::provider(*vendor, project))
            }
            ["p2", vendor, file] => {
                let stem = file.strip_suffix(".json").filter(|p| !p.is_empty())?;
                match stem.strip_suffix("~dev") {
                    Some(project) if !project.is_empty() => {
                        Some(Self::package(*vendor, project, true))
                    }
                    Some(_) => None,
                    None => Some(Self::package(*vendor, stem, false)),
                }
            }
            [vendor, project, version, file]
                if *file == format!("{vendor}-{project}-{version}.zip") =>
            {
                Some(Self::Zipball(PackageCoordinate::new(
                    *vendor, *project, *version,
                )))
            }
            _ => None,
        }
    }

    /// Legacy provider route for a package.
    #[must_use]
    pub fn provider(vendor: impl Into<String>, project: impl Into<String>) -> Self {
        Self::Provider {
            vendor: vendor.into(),
            project: project.into(),
        }
    }

    /// v2 package route for a package.
    #[must_use]
    pub fn package(vendor: impl Into<String>, project: impl Into<String>, dev: bool) -> Self {
        Self::Package {
            vendor: vendor.into(),
            project: project.into(),
            dev,
        }
    }

    /// Asset kind served by this route; `None` for uploads.
    #[must_use]
    pub const fn asset_kind(&self) -> Option<AssetKind> {
        match self {
            Self::Packages => Some(AssetKind::Packages),
            Self::List => Some(AssetKind::List),
            Self::Provider { .. } => Some(AssetKind::Provider),
            Self::Package { .. } => Some(AssetKind::Package),
            Self::Zipball(_) => Some(AssetKind::Zipball),
            Self::Upload(_) => None,
        }
    }

    /// Canonical path of the asset behind this route.
    ///
    /// Uploads resolve to the zipball path they store into.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Packages => "packages.json".to_string(),
            Self::List => "packages/list.json".to_string(),
            Self::Provider { vendor, project } => format!("p/{vendor}/{project}.json"),
            Self::Package {
                vendor,
                project,
                dev: false,
            } => format!("p2/{vendor}/{project}.json"),
            Self::Package {
                vendor,
                project,
                dev: true,
            } => format!("p2/{vendor}/{project}~dev.json"),
            Self::Zipball(c) | Self::Upload(c) => {
                normalize_path(&zipball_path(&c.vendor, &c.project, &c.version))
            }
        }
    }

    /// Coordinate of the component owning the asset.
    ///
    /// Zipballs belong to their package version; metadata files attach to the
    /// synthetic component derived from their own path.
    #[must_use]
    pub fn coordinate(&self) -> PackageCoordinate {
        match self {
            Self::Zipball(c) | Self::Upload(c) => c.clone(),
            _ => PackageCoordinate::from_path(&self.path()),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_indexes() {
        assert_eq!(Route::classify("packages.json"), Some(Route::Packages));
        assert_eq!(Route::classify("/packages/list.json"), Some(Route::List));
    }

    #[test]
    fn classify_provider_and_package() {
        assert_eq!(
            Route::classify("p/acme/widget.json"),
            Some(Route::provider("acme", "widget"))
        );
        assert_eq!(
            Route::classify("p2/acme/widget.json"),
            Some(Route::package("acme", "widget", false))
        );
        assert_eq!(
            Route::classify("p2/acme/widget~dev.json"),
            Some(Route::package("acme", "widget", true))
        );
        assert_eq!(Route::classify("p2/acme/~dev.json"), None);
        assert_eq!(Route::classify("p/acme/widget"), None);
    }

    #[test]
    fn stable_and_dev_documents_have_distinct_paths() {
        let stable = Route::package("acme", "widget", false);
        let dev = Route::package("acme", "widget", true);
        assert_ne!(stable.path(), dev.path());
        assert_eq!(Route::classify(&dev.path()), Some(dev));
        assert_eq!(Route::classify(&stable.path()), Some(stable));
    }

    #[test]
    fn classify_zipball() {
        let route = Route::classify("acme/widget/1.2.3/acme-widget-1.2.3.zip").unwrap();
        assert_eq!(route.asset_kind(), Some(AssetKind::Zipball));
        assert_eq!(route.coordinate(), PackageCoordinate::new("acme", "widget", "1.2.3"));
        assert_eq!(route.path(), "acme/widget/1.2.3/acme-widget-1.2.3.zip");

        assert_eq!(Route::classify("acme/widget/1.2.3/other.zip"), None);
        assert_eq!(Route::classify("../widget/1.2.3/..-widget-1.2.3.zip"), None);
    }

    #[test]
    fn classify_upload() {
        let route = Route::classify("packages/upload/rjkip/ftp-php/v1.1.0").unwrap();
        assert_eq!(route.asset_kind(), None);
        assert_eq!(route.path(), "rjkip/ftp-php/v1.1.0/rjkip-ftp-php-v1.1.0.zip");
    }

    #[test]
    fn metadata_attaches_to_synthetic_component() {
        assert_eq!(
            Route::List.coordinate(),
            PackageCoordinate::new("packages", "list.json", "latest")
        );
        assert_eq!(
            Route::provider("acme", "widget").coordinate(),
            PackageCoordinate::new("p", "acme", "widget.json")
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(AssetKind::Zipball.content_type(), "application/zip");
        assert_eq!(AssetKind::Provider.content_type(), "application/json");
        assert!(AssetKind::List.is_metadata());
        assert!(!AssetKind::Zipball.is_metadata());
    }
}
