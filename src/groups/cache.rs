//! Read-through cache of group metadata.
//!
//! Concurrent lookups of an uncached group share one upstream fetch. The
//! fetch is stored as a [`Shared`] future in the in-flight map; every caller
//! awaits a clone of it and gets the same result, success or failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use super::metadata::{GroupMetadata, MetadataPatch, ParticipantUpdate};
use super::source::MetadataSource;
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};

/// Result shared by every caller joined on one fetch.
pub type FetchResult = Result<GroupMetadata, Arc<anyhow::Error>>;

type PendingFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Group metadata, keyed by group id.
#[derive(Clone)]
pub struct GroupMetadataCache {
    entries: TypedCache<String, GroupMetadata>,
    /// Ticket tells an old fetch apart from a newer one for the same id.
    inflight: Arc<DashMap<String, (u64, PendingFetch)>>,
    next_ticket: Arc<AtomicU64>,
}

impl GroupMetadataCache {
    pub fn new(registry: &CacheRegistry, config: CacheConfig) -> Self {
        Self {
            entries: registry.get_or_create("group_metadata", config),
            inflight: Arc::new(DashMap::new()),
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn get_cached(&self, group_id: &str) -> Option<GroupMetadata> {
        self.entries.get(&group_id.to_string())
    }

    /// Store metadata as-is. Ignored for an empty id.
    pub fn set_cached(&self, group_id: &str, metadata: GroupMetadata) {
        if group_id.is_empty() {
            return;
        }
        self.entries.insert(group_id.to_string(), metadata);
    }

    /// Drop the entry and any in-flight marker for the group.
    pub fn delete_cached(&self, group_id: &str) {
        self.entries.invalidate(&group_id.to_string());
        self.inflight.remove(group_id);
    }

    pub fn list_cached_ids(&self) -> Vec<String> {
        self.entries.keys()
    }

    /// Merge `patch` into the cached metadata, creating the entry if needed.
    pub fn update_cached(&self, group_id: &str, patch: MetadataPatch) -> Option<GroupMetadata> {
        if group_id.is_empty() {
            return None;
        }
        Some(self.entries.upsert_with(group_id.to_string(), |current| {
            let mut metadata = current.unwrap_or_else(|| GroupMetadata::new(group_id));
            metadata.apply(patch);
            metadata
        }))
    }

    /// Apply a membership event to the cached roster, creating the entry if needed.
    pub fn apply_participants(
        &self,
        group_id: &str,
        update: &ParticipantUpdate,
    ) -> Option<GroupMetadata> {
        if group_id.is_empty() {
            return None;
        }
        let metadata = self.entries.upsert_with(group_id.to_string(), |current| {
            let mut metadata = current.unwrap_or_else(|| GroupMetadata::new(group_id));
            metadata.apply_participants(update);
            metadata
        });
        debug!(
            "Applied {:?} for {} participant(s) in {}",
            update.action,
            update.participants.len(),
            group_id
        );
        Some(metadata)
    }

    /// Patch the cached metadata, or fetch it when the group is not cached.
    ///
    /// A fresh fetch already carries the change, so no partial entry is created.
    pub async fn patch_or_fetch(
        &self,
        source: Arc<dyn MetadataSource>,
        group_id: &str,
        patch: MetadataPatch,
    ) -> FetchResult {
        if self.get_cached(group_id).is_none() {
            return self.get_group_metadata(source, group_id).await;
        }
        match self.update_cached(group_id, patch) {
            Some(metadata) => Ok(metadata),
            None => self.get_group_metadata(source, group_id).await,
        }
    }

    /// Roster counterpart of [`patch_or_fetch`](Self::patch_or_fetch).
    pub async fn apply_or_fetch(
        &self,
        source: Arc<dyn MetadataSource>,
        group_id: &str,
        update: &ParticipantUpdate,
    ) -> FetchResult {
        if self.get_cached(group_id).is_none() {
            return self.get_group_metadata(source, group_id).await;
        }
        match self.apply_participants(group_id, update) {
            Some(metadata) => Ok(metadata),
            None => self.get_group_metadata(source, group_id).await,
        }
    }

    /// Cached metadata, or a fetch from `source` shared with concurrent callers.
    ///
    /// On failure the entry is evicted and the error returned to every caller.
    pub async fn get_group_metadata(
        &self,
        source: Arc<dyn MetadataSource>,
        group_id: &str,
    ) -> FetchResult {
        if let Some(metadata) = self.get_cached(group_id) {
            debug!("Group metadata cache hit for {}", group_id);
            return Ok(metadata);
        }

        let fetch = match self.inflight.entry(group_id.to_string()) {
            Entry::Occupied(pending) => {
                debug!("Joining in-flight metadata fetch for {}", group_id);
                pending.get().1.clone()
            }
            Entry::Vacant(slot) => {
                // A fetch may have finished between the cache check and here.
                if let Some(metadata) = self.get_cached(group_id) {
                    return Ok(metadata);
                }
                debug!("Group metadata cache miss for {}, fetching", group_id);
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                let fetch = self.fetch(source, group_id.to_string(), ticket);
                slot.insert((ticket, fetch.clone()));
                fetch
            }
        };

        fetch.await
    }

    fn fetch(&self, source: Arc<dyn MetadataSource>, group_id: String, ticket: u64) -> PendingFetch {
        let entries = self.entries.clone();
        let inflight = Arc::clone(&self.inflight);

        async move {
            let result = source.fetch_metadata(&group_id).await;
            match &result {
                Ok(metadata) => entries.insert(group_id.clone(), metadata.clone()),
                Err(e) => {
                    warn!("Failed to fetch metadata for group {}: {:#}", group_id, e);
                    entries.invalidate(&group_id);
                }
            }
            inflight.remove_if(&group_id, |_, (owner, _)| *owner == ticket);
            result.map_err(Arc::new)
        }
        .boxed()
        .shared()
    }

    /// Number of fetches currently in flight.
    pub fn pending_fetches(&self) -> usize {
        self.inflight.len()
    }
}

impl std::fmt::Debug for GroupMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupMetadataCache")
            .field("entries", &self.entries)
            .field("inflight", &self.inflight.len())
            .finish()
    }
}
