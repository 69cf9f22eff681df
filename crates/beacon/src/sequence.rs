//! Per-root sequence allocation.
//!
//! Every root keeps one counter per [`MessageKind`] at
//! `roots/<unik>/connection/<counter>`, and message bodies live at
//! `roots/<unik>/<collection>/<13-digit sequence>`. An allocation attempt is a
//! transaction on the counter whose update step itself runs a second
//! transaction on the candidate slot:
//!
//! ```text
//! counter tx:  current (absent = -1) -> candidate = current + 1
//!   slot tx:   slot empty?  yes -> write body      no -> SlotConflict
//! counter tx:  slot written -> commit candidate    SlotConflict -> abort
//! ```
//!
//! The counter only advances once the slot holds the message, so at most one
//! attempt ever owns a slot. A crash after the counter commit but before the
//! caller uses the id leaves a gap in the sequence; gaps are never repaired.

use crate::{
    Error, Result,
    config::Settings,
    id::{MessageId, MessageKind, Root},
    store::{ShardRegistry, TxUpdate, Value, join_path, tx_update},
};
use serde_json::Map;

/// Outcome of a successful allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub message_id: MessageId,
    /// Attempts used, starting at 1.
    pub attempts: usize,
}

impl Allocation {
    /// `true` for the first message ever written under the root.
    pub const fn is_first(&self) -> bool {
        self.message_id.sequence() == 0
    }
}

#[derive(Clone, Debug)]
pub struct SequenceAllocator {
    registry: ShardRegistry,
    max_attempts: usize,
}

impl SequenceAllocator {
    pub fn new(registry: ShardRegistry, settings: &Settings) -> Self {
        Self {
            registry,
            max_attempts: settings.max_slot_attempts,
        }
    }

    /// Allocates the next sequence of `kind` under `root` and stores `body` in
    /// its slot, with an `id` field set to the full message id.
    ///
    /// # Errors
    ///
    /// - [`Error::AttemptsExhausted`] when every attempt hit an occupied slot.
    /// - Any other store or addressing error as soon as it happens, without
    ///   retrying.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(root = %root, kind = ?kind))
    )]
    pub async fn allocate(&self, root: &Root, kind: MessageKind, body: &Value) -> Result<Allocation> {
        for attempt in 1..=self.max_attempts {
            match self.attempt(root, kind, body).await {
                Ok(message_id) => {
                    return Ok(Allocation {
                        message_id,
                        attempts: attempt,
                    });
                }
                Err(Error::SlotConflict { path: _path }) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, path = %_path, "slot taken, retrying");
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(attempt, error = %e, "sequence allocation failed");
                    return Err(e);
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(attempts = self.max_attempts, "sequence allocation exhausted");

        Err(Error::AttemptsExhausted {
            root: root.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// One counter transaction with the nested slot write.
    async fn attempt(&self, root: &Root, kind: MessageKind, body: &Value) -> Result<MessageId> {
        let store = self.registry.shard_of(root.home())?.realtime.clone();
        let base = join_path(["roots", root.unik().as_str()]);
        let counter_path = join_path([base.as_str(), "connection", kind.counter_node()]);

        let update = {
            let (store, root, body, base, counter_path) = (
                store.clone(),
                root.clone(),
                body.clone(),
                base.clone(),
                counter_path.clone(),
            );
            tx_update(move |current| {
                let (store, root, body, base, counter_path) = (
                    store.clone(),
                    root.clone(),
                    body.clone(),
                    base.clone(),
                    counter_path.clone(),
                );
                async move {
                    let sequence = next_sequence(current.as_ref(), &counter_path)?;
                    let id = MessageId::new(sequence, root, kind)?;
                    let slot_path = join_path([
                        base.as_str(),
                        kind.slot_collection(),
                        id.sequence_key().as_str(),
                    ]);
                    let message = with_id(body, &id);
                    store
                        .transact(&slot_path, claim_slot(slot_path.clone(), message))
                        .await?;
                    Ok(Value::from(sequence))
                }
            })
        };

        let committed = store.transact(&counter_path, update).await?;
        let sequence = committed.as_u64().ok_or_else(|| Error::TransactionFailed {
            path: counter_path.clone(),
            reason: format!("committed counter {committed} is not a sequence"),
        })?;
        MessageId::new(sequence, root.clone(), kind)
    }
}

/// Candidate sequence following the stored counter.
fn next_sequence(current: Option<&Value>, path: &str) -> Result<u64> {
    match current {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| Error::TransactionFailed {
                path: path.into(),
                reason: format!("counter holds {value}"),
            }),
    }
}

/// Slot update: writes `message` into an empty slot, conflicts otherwise.
fn claim_slot(path: String, message: Value) -> TxUpdate<'static> {
    tx_update(move |slot| {
        let (path, message) = (path.clone(), message.clone());
        async move {
            if is_vacant(slot.as_ref()) {
                Ok(message)
            } else {
                Err(Error::SlotConflict { path })
            }
        }
    })
}

fn is_vacant(slot: Option<&Value>) -> bool {
    match slot {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn with_id(body: Value, id: &MessageId) -> Value {
    let mut map = match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => Map::from_iter([("body".to_string(), other)]),
    };
    map.insert("id".into(), Value::String(id.to_string()));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        id::{ComposedId, Region},
        store::{RealtimeStore, memory::MemoryBackend},
    };
    use serde_json::json;
    use std::collections::BTreeSet;

    fn root() -> Root {
        Root::from_ids(vec![
            ComposedId::new("alice", Region::Europe, 1).unwrap(),
            ComposedId::new("bob", Region::Asia, 0).unwrap(),
        ])
        .unwrap()
    }

    fn allocator(backend: &MemoryBackend, attempts: usize) -> SequenceAllocator {
        let settings = Settings {
            max_slot_attempts: attempts,
            ..Settings::default()
        };
        SequenceAllocator::new(backend.registry.clone(), &settings)
    }

    #[tokio::test]
    async fn first_allocation_is_zero_and_stores_the_body() {
        let backend = MemoryBackend::new();
        let alloc = allocator(&backend, 4)
            .allocate(&root(), MessageKind::Chat, &json!({"text": "hi"}))
            .await
            .unwrap();

        assert!(alloc.is_first());
        assert_eq!(alloc.attempts, 1);
        let id = alloc.message_id.to_string();
        assert_eq!(id, "0000000000000@alice-europe-1r^bob-asia-0rc");

        // The root lives on the first party's shard.
        let store = backend.realtime(Region::Europe, 1);
        assert_eq!(
            store
                .get("roots/alice^bob/chats/0000000000000")
                .await
                .unwrap(),
            Some(json!({"text": "hi", "id": id}))
        );
        assert_eq!(
            store.get("roots/alice^bob/connection/upperChat").await.unwrap(),
            Some(json!(0))
        );
    }

    #[tokio::test]
    async fn kinds_have_independent_counters() {
        let backend = MemoryBackend::new();
        let allocator = allocator(&backend, 4);
        for _ in 0..3 {
            allocator
                .allocate(&root(), MessageKind::Chat, &json!({}))
                .await
                .unwrap();
        }
        let snip = allocator
            .allocate(&root(), MessageKind::Snip, &json!({}))
            .await
            .unwrap();
        assert_eq!(snip.message_id.sequence(), 0);
        assert_eq!(snip.message_id.to_string(), "0000000000000@alice-europe-1r^bob-asia-0rs");
    }

    #[tokio::test]
    async fn occupied_slot_exhausts_attempts_without_advancing() {
        let backend = MemoryBackend::new();
        let store = backend.realtime(Region::Europe, 1);
        store
            .set("roots/alice^bob/chats/0000000000000", json!({"id": "ghost"}))
            .await
            .unwrap();

        let err = allocator(&backend, 4)
            .allocate(&root(), MessageKind::Chat, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::AttemptsExhausted {
                root: root().to_string(),
                attempts: 4
            }
        );
        assert_eq!(
            store.get("roots/alice^bob/connection/upperChat").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn store_failure_is_not_retried() {
        let backend = MemoryBackend::new();
        let store = backend.realtime(Region::Europe, 1);
        store.fail_writes_under("roots/alice^bob/chats");

        let err = allocator(&backend, 4)
            .allocate(&root(), MessageKind::Chat, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn continues_from_stored_counter() {
        let backend = MemoryBackend::new();
        let store = backend.realtime(Region::Europe, 1);
        store
            .set("roots/alice^bob/connection/upperChat", json!(41))
            .await
            .unwrap();
        let alloc = allocator(&backend, 4)
            .allocate(&root(), MessageKind::Chat, &json!("plain"))
            .await
            .unwrap();
        assert_eq!(alloc.message_id.sequence(), 42);
        assert!(!alloc.is_first());
        assert_eq!(
            store
                .get("roots/alice^bob/chats/0000000000042/body")
                .await
                .unwrap(),
            Some(json!("plain"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_cover_a_dense_range() {
        const N: u64 = 32;
        let backend = MemoryBackend::new();
        // Generous bound: under contention a writer may lose several rounds.
        let allocator = allocator(&backend, 256);

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let allocator = allocator.clone();
                tokio::spawn(async move {
                    allocator
                        .allocate(&root(), MessageKind::Chat, &json!({ "n": i }))
                        .await
                })
            })
            .collect();

        let mut sequences = BTreeSet::new();
        for task in futures::future::join_all(tasks).await {
            let alloc = task.unwrap().unwrap();
            assert!(sequences.insert(alloc.message_id.sequence()));
        }
        assert_eq!(sequences, (0..N).collect::<BTreeSet<_>>());

        let chats = backend
            .realtime(Region::Europe, 1)
            .get("roots/alice^bob/chats")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chats.as_object().unwrap().len(), N as usize);
    }
}
