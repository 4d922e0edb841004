//! Composer repositories for Repertoire.
//!
//! Three repository types share one request surface:
//!
//! - [`HostedRepository`] stores uploaded zipballs and generates metadata from them
//! - [`ProxyRepository`] caches an upstream Composer repository
//! - [`GroupRepository`] fans requests out over member repositories
//!
//! [`Repository`] dispatches a request path to the right type and rewrites
//! metadata responses so that dist URLs point back at this server.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod group;
pub mod hosted;
pub mod proxy;
mod task;
pub mod view;

pub use group::GroupRepository;
pub use hosted::{ComponentUpload, HostedRepository, MetadataIndex, RebuildSummary};
pub use proxy::{CachePolicy, Fetched, HttpUpstream, ProxyRepository, Upstream, UpstreamConfig};
pub use view::{Dispatch, Repository, RepositoryType};
