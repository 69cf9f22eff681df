//! Reaction writes and the per-root "last update" pointer.
//!
//! Reaction data is written unconditionally: every reactor owns its own key,
//! so writers never contend. Each write also appends a short record under
//! `chatUpdates/<push key>` and then tries to move
//! `connection/chatUpdate` forward to that key. The pointer only ever moves
//! forward; a writer whose key is not newer than the stored one leaves it
//! alone. Observers use the pointer as a wake-up signal, never as the source
//! of truth.

use crate::{
    Error, Result,
    id::MessageId,
    push_key::PushKey,
    store::{RealtimeStore, ShardRegistry, Value, join_path, tx_update},
};
use serde_json::{Map, json};
use std::sync::Arc;

const POINTER_NODE: &str = "connection/chatUpdate";
const UPDATES_NODE: &str = "chatUpdates";

/// What a reaction write did to the update pointer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Key of the change record.
    pub key: PushKey,
    /// `false` when a newer key was already stored.
    pub pointer_advanced: bool,
}

#[derive(Clone, Debug)]
pub struct ReactionLog {
    registry: ShardRegistry,
}

impl ReactionLog {
    pub fn new(registry: ShardRegistry) -> Self {
        Self { registry }
    }

    /// Stores `body` as the reaction `reaction_key` of `message_id`, with
    /// `sender_id` as its first reactor.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(message = %message_id, reaction = reaction_key))
    )]
    pub async fn react(
        &self,
        message_id: &MessageId,
        reaction_key: &str,
        sender_id: &str,
        body: &Value,
    ) -> Result<UpdateOutcome> {
        let (store, base) = self.locate(message_id)?;
        let seq = message_id.sequence_key();

        let mut reaction = match body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        reaction.insert("reactors".into(), json!({ sender_id: "" }));
        let path = join_path([
            base.as_str(),
            message_id.kind().slot_collection(),
            seq.as_str(),
            "reactions",
            reaction_key,
        ]);
        store.set(&path, Value::Object(reaction)).await?;

        self.record(&store, &base, format!("r {seq} {reaction_key}"))
            .await
    }

    /// Adds `reactor_id` to an existing reaction.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(message = %message_id, reaction = reaction_id))
    )]
    pub async fn increment(
        &self,
        message_id: &MessageId,
        reaction_id: &str,
        reactor_id: &str,
    ) -> Result<UpdateOutcome> {
        let (store, base) = self.locate(message_id)?;
        let seq = message_id.sequence_key();

        let path = join_path([
            base.as_str(),
            message_id.kind().slot_collection(),
            seq.as_str(),
            "reactions",
            reaction_id,
            "reactors",
            reactor_id,
        ]);
        store.set(&path, json!("")).await?;

        self.record(&store, &base, format!("i {reactor_id} {seq} {reaction_id}"))
            .await
    }

    fn locate(&self, message_id: &MessageId) -> Result<(Arc<dyn RealtimeStore>, String)> {
        let root = message_id.root();
        let store = self.registry.shard_of(root.home())?.realtime.clone();
        Ok((store, join_path(["roots", root.unik().as_str()])))
    }

    /// Appends the change record and tries to advance the pointer to it.
    async fn record(
        &self,
        store: &Arc<dyn RealtimeStore>,
        base: &str,
        record: String,
    ) -> Result<UpdateOutcome> {
        let key = PushKey::now();
        let encoded = key.encode();
        store
            .set(&join_path([base, UPDATES_NODE, encoded.as_str()]), Value::String(record))
            .await?;

        let pointer = join_path([base, POINTER_NODE]);
        match advance_pointer(store.as_ref(), &pointer, &encoded).await {
            Ok(()) => Ok(UpdateOutcome {
                key,
                pointer_advanced: true,
            }),
            Err(Error::StaleUpdate { .. }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%pointer, key = %encoded, "update pointer already newer");
                Ok(UpdateOutcome {
                    key,
                    pointer_advanced: false,
                })
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%pointer, error = %e, "failed to advance update pointer");
                Err(e)
            }
        }
    }
}

/// Moves the pointer at `path` to `key` if `key` sorts after the stored one.
///
/// # Errors
///
/// Returns [`Error::StaleUpdate`] when the stored key is the same or newer.
pub async fn advance_pointer(store: &dyn RealtimeStore, path: &str, key: &str) -> Result<()> {
    let (path_owned, key_owned) = (path.to_owned(), key.to_owned());
    store
        .transact(
            path,
            tx_update(move |current| {
                let (path, key) = (path_owned.clone(), key_owned.clone());
                async move {
                    let current = current.as_ref().and_then(Value::as_str).unwrap_or_default();
                    if key.as_str() > current {
                        Ok(Value::String(key))
                    } else {
                        Err(Error::StaleUpdate { path })
                    }
                }
            }),
        )
        .await
        .map(|_| ())
}
