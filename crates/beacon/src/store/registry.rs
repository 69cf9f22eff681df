use super::{DocumentStore, ObjectStore, PushProvider, RealtimeStore};
use crate::{
    Error, Result,
    config::SHARDS_PER_REGION,
    id::{ComposedId, Region},
};
use std::{collections::BTreeMap, sync::Arc};

/// One physical shard: a realtime store and its object bucket.
#[derive(Clone, Debug)]
pub struct Shard {
    pub realtime: Arc<dyn RealtimeStore>,
    /// Short-lived blobs such as campaign media.
    pub temp_bucket: Arc<dyn ObjectStore>,
}

/// Every backend the core reaches, built once at process start.
///
/// Each region holds exactly [`SHARDS_PER_REGION`] shards, so any
/// [`ComposedId`] that decoded successfully resolves to a shard of a
/// registered region.
#[derive(Clone, Debug)]
pub struct ShardRegistry {
    shards: BTreeMap<Region, [Shard; SHARDS_PER_REGION]>,
    documents: Arc<dyn DocumentStore>,
    push: Arc<dyn PushProvider>,
}

impl ShardRegistry {
    pub fn new(documents: Arc<dyn DocumentStore>, push: Arc<dyn PushProvider>) -> Self {
        Self {
            shards: BTreeMap::new(),
            documents,
            push,
        }
    }

    /// Registers the shards of `region`, replacing any previous set.
    #[must_use]
    pub fn with_region(mut self, region: Region, shards: [Shard; SHARDS_PER_REGION]) -> Self {
        self.shards.insert(region, shards);
        self
    }

    /// Regions with registered shards, in a stable order.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.shards.keys().copied()
    }

    /// # Errors
    ///
    /// Returns [`Error::UnknownShard`] if the region is not registered or the
    /// index is out of range.
    pub fn shard(&self, region: Region, index: usize) -> Result<&Shard> {
        self.shards
            .get(&region)
            .and_then(|shards| shards.get(index))
            .ok_or_else(|| Error::UnknownShard {
                region: region.to_string(),
                shard: index,
            })
    }

    /// The shard holding `id`.
    pub fn shard_of(&self, id: &ComposedId) -> Result<&Shard> {
        self.shard(id.region(), id.shard())
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn push(&self) -> &dyn PushProvider {
        self.push.as_ref()
    }
}
