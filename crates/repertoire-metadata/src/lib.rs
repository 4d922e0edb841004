//! Composer repository metadata for repertoire.
//!
//! [`types`] models the documents of the Composer repository protocol and
//! [`MetadataProcessor`] performs every structural transformation on them:
//! generating a root index from a name list, pointing dist URLs back at this
//! server, merging provider documents from group members and looking up the
//! real download URL of one package version.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod processor;
pub mod types;

pub use processor::MetadataProcessor;
pub use types::{
    Dist, PackageList, PackagesDocument, ProviderDocument, ProviderHash, VersionList,
    VersionMetadata, is_dev_version,
};
