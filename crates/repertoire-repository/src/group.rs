//! Group repositories: one URL over several member repositories.

use crate::proxy::CachePolicy;
use crate::task::store_verified;
use crate::view::{Dispatch, Repository};
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use indexmap::IndexSet;
use repertoire_core::{AssetKind, Result, Route};
use repertoire_metadata::{MetadataProcessor, PackageList};
use repertoire_store::{CacheInfo, Content, ContentStore};
use tracing::{debug, warn};
use url::Url;

/// A repository answering from its members in priority order.
///
/// Provider documents are merged across all members and cached. The package
/// list is the union of the members' lists and the root index is generated
/// from it against the group's own URL. Every other asset comes from the
/// first member that has it.
#[derive(Debug)]
pub struct GroupRepository {
    name: String,
    members: Vec<Repository>,
    store: ContentStore,
    processor: MetadataProcessor,
    policy: CachePolicy,
}

impl GroupRepository {
    /// Create a group over `members`, highest priority first.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        base_url: Url,
        members: Vec<Repository>,
        store: ContentStore,
        policy: CachePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            store,
            processor: MetadataProcessor::new(base_url),
            policy,
        }
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in priority order.
    #[must_use]
    pub fn members(&self) -> &[Repository] {
        &self.members
    }

    /// Cache of merged documents.
    #[must_use]
    pub const fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Processor bound to this repository's URL.
    #[must_use]
    pub const fn processor(&self) -> &MetadataProcessor {
        &self.processor
    }

    /// Serve a GET.
    ///
    /// # Errors
    /// Returns error if merging fails or the cache cannot be written.
    pub async fn get(&self, route: &Route) -> Result<Option<Content>> {
        match route.asset_kind() {
            None => Ok(None),
            Some(AssetKind::List) => self.merged_list().await,
            Some(AssetKind::Packages) => {
                let Some(list) = self.merged_list().await? else {
                    return Ok(None);
                };
                let generated = self.processor.generate_packages_from_list(list.payload())?;
                Ok(Some(Content::transient(
                    &route.path(),
                    AssetKind::Packages,
                    generated,
                )))
            }
            Some(AssetKind::Provider) => self.merged_provider(route).await,
            Some(_) => Ok(self.first_success(route).await),
        }
    }

    /// Union of the members' package lists, in member order.
    ///
    /// Members without a list or with a malformed one are skipped; `None`
    /// when no member produced a usable list.
    async fn merged_list(&self) -> Result<Option<Content>> {
        let route = Route::List;
        let responses = join_all(
            self.members
                .iter()
                .map(|member| member.get_route(&route, Dispatch::Internal)),
        )
        .await;

        let mut names = IndexSet::new();
        let mut listed = 0usize;
        for (member, response) in self.members.iter().zip(responses) {
            let content = match response {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) => {
                    warn!(group = %self.name, member = member.name(), route = %route, error = %e, "member failed");
                    continue;
                }
            };
            match PackageList::from_slice(member.name(), content.payload()) {
                Ok(list) => {
                    listed += 1;
                    names.extend(list.package_names);
                }
                Err(e) => {
                    warn!(group = %self.name, member = member.name(), error = %e, "skipping malformed package list");
                }
            }
        }

        if listed == 0 {
            return Ok(None);
        }
        debug!(group = %self.name, members = listed, packages = names.len(), "merged package lists");
        let list = MetadataProcessor::build_package_list(names)?;
        Ok(Some(Content::transient(&route.path(), AssetKind::List, list)))
    }

    async fn first_success(&self, route: &Route) -> Option<Content> {
        for member in &self.members {
            match member.get_route(route, Dispatch::Internal).await {
                Ok(Some(content)) => {
                    debug!(group = %self.name, member = member.name(), route = %route, "member answered");
                    return Some(content);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(group = %self.name, member = member.name(), route = %route, error = %e, "member failed");
                }
            }
        }
        None
    }

    async fn merged_provider(&self, route: &Route) -> Result<Option<Content>> {
        let path = route.path();
        let cached = self.store.get(&path)?;
        if let Some(content) = &cached
            && self.policy.is_fresh(content)
        {
            return Ok(cached);
        }

        let responses = join_all(
            self.members
                .iter()
                .map(|member| member.get_route(route, Dispatch::Internal)),
        )
        .await;

        let mut payloads = Vec::new();
        for (member, response) in self.members.iter().zip(responses) {
            match response {
                Ok(Some(content)) => payloads.push((member.name().to_string(), content.into_payload())),
                Ok(None) => {}
                Err(e) => {
                    warn!(group = %self.name, member = member.name(), route = %route, error = %e, "member failed");
                }
            }
        }

        if payloads.is_empty() {
            if cached.is_some() {
                warn!(group = %self.name, path = %path, "no member answered, serving stale merge");
            }
            return Ok(cached);
        }

        let sources: Vec<(&str, &[u8])> = payloads
            .iter()
            .map(|(member, payload)| (member.as_str(), payload.as_ref()))
            .collect();
        let merged = self.processor.merge_provider_json(&sources, Utc::now())?;

        let members = sources.len();
        let content = store_verified(
            &self.store,
            &path,
            Bytes::from(merged),
            AssetKind::Provider,
            CacheInfo::verified_at(Utc::now()),
        )
        .await?;
        debug!(group = %self.name, path = %path, members, "merged provider document");
        Ok(Some(content))
    }
}
