//! Core types and utilities for the repertoire Composer repository server.
//!
//! This crate holds everything the other crates agree on: the error type,
//! JSON helpers, content hashes, package coordinates and the classification
//! of request paths into asset kinds.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod coordinate;
pub mod error;
pub mod hash;
pub mod json;
pub mod route;

pub use coordinate::{LATEST_VERSION, PackageCoordinate, normalize_path, zipball_path};
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, Hashes};
pub use route::{AssetKind, Route};
