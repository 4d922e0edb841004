//! Zipball uploads into a hosted repository.

use bytes::Bytes;
use repertoire_core::{Error, PackageCoordinate, Result, Route, normalize_path, zipball_path};

/// A validated upload: coordinate fields plus the archive bytes.
#[derive(Debug, Clone)]
pub struct ComponentUpload {
    coordinate: PackageCoordinate,
    payload: Bytes,
}

impl ComponentUpload {
    /// Build an upload, trimming each field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidUpload`] if a field is blank, contains `/`, is a
    /// dot segment, or the payload is empty.
    pub fn new(vendor: &str, project: &str, version: &str, payload: impl Into<Bytes>) -> Result<Self> {
        let vendor = field("vendor", vendor)?;
        let project = field("project", project)?;
        let version = field("version", version)?;
        let payload = payload.into();
        if payload.is_empty() {
            return Err(Error::InvalidUpload("package payload is empty".into()));
        }
        Ok(Self {
            coordinate: PackageCoordinate::new(vendor, project, version),
            payload,
        })
    }

    /// Build an upload from an upload route.
    ///
    /// # Errors
    /// Returns [`Error::InvalidUpload`] for non-upload routes and invalid fields.
    pub fn from_route(route: &Route, payload: impl Into<Bytes>) -> Result<Self> {
        match route {
            Route::Upload(c) => Self::new(&c.vendor, &c.project, &c.version, payload),
            other => Err(Error::InvalidUpload(format!("{other} is not an upload path"))),
        }
    }

    /// Coordinate of the uploaded component.
    #[must_use]
    pub const fn coordinate(&self) -> &PackageCoordinate {
        &self.coordinate
    }

    /// Archive bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Path the zipball is stored under.
    #[must_use]
    pub fn asset_path(&self) -> String {
        let c = &self.coordinate;
        normalize_path(&zipball_path(&c.vendor, &c.project, &c.version))
    }
}

fn field<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidUpload(format!("{name} must not be blank")));
    }
    if value.contains('/') || value == "." || value == ".." {
        return Err(Error::InvalidUpload(format!("{name} '{value}' is not a path segment")));
    }
    Ok(value)
}
