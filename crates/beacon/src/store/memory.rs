//! In-process backends.
//!
//! They implement the store traits with the same observable semantics as the
//! hosted services: value-compared optimistic transactions, chronologically
//! keyed appends, bounded `IN` predicates and per-message push results. Each
//! one can be told to fail, which is how the partial-failure paths are tested.

use super::{
    BatchResponse, DocumentStore, Notification, ObjectStore, PushProvider, RealtimeStore, Shard,
    ShardRegistry, TxUpdate, UserDoc, UserQuery, Value,
};
use crate::{
    Error, Result,
    config::{QUERY_BATCH_LIMIT, SHARDS_PER_REGION},
    id::Region,
    push_key::PushKey,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Map;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

/// Compare-and-swap rounds a transaction runs before giving up.
pub const DEFAULT_TRANSACTION_RETRIES: usize = 25;

#[derive(Debug, Default)]
struct Faults {
    fail_next: usize,
    prefixes: Vec<String>,
}

impl Faults {
    fn check(&mut self, path: &str) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(Error::unavailable(format!("injected failure writing {path}")));
        }
        if self.prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(Error::unavailable(format!("injected failure writing {path}")));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Tree {
    root: Value,
    faults: Faults,
}

/// A realtime store kept in a single JSON tree.
#[derive(Debug)]
pub struct MemoryRealtimeStore {
    tree: Mutex<Tree>,
    max_retries: usize,
}

impl Default for MemoryRealtimeStore {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSACTION_RETRIES)
    }
}

impl MemoryRealtimeStore {
    pub fn new(max_retries: usize) -> Self {
        Self {
            tree: Mutex::new(Tree {
                root: Value::Object(Map::new()),
                faults: Faults::default(),
            }),
            max_retries,
        }
    }

    /// Makes the next `n` writes fail with [`Error::StoreUnavailable`].
    pub fn fail_next_writes(&self, n: usize) {
        self.tree.lock().faults.fail_next = n;
    }

    /// Makes every write below `prefix` fail with [`Error::StoreUnavailable`].
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        self.tree.lock().faults.prefixes.push(prefix.into());
    }

    pub fn clear_faults(&self) {
        self.tree.lock().faults = Faults::default();
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.tree.lock().root.clone()
    }

    fn read(&self, path: &str) -> Option<Value> {
        lookup(&self.tree.lock().root, &segments(path)).cloned()
    }

    fn write(&self, path: &str, value: Value) -> Result<()> {
        let mut tree = self.tree.lock();
        tree.faults.check(path)?;
        assign(&mut tree.root, &segments(path), value);
        Ok(())
    }

    /// Commits `next` if `path` still holds `expected`.
    fn compare_and_swap(&self, path: &str, expected: Option<&Value>, next: Value) -> Result<bool> {
        let mut tree = self.tree.lock();
        let segs = segments(path);
        if lookup(&tree.root, &segs) != expected {
            return Ok(false);
        }
        tree.faults.check(path)?;
        assign(&mut tree.root, &segs, next);
        Ok(true)
    }
}

#[async_trait]
impl RealtimeStore for MemoryRealtimeStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.read(path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.write(path, value)
    }

    async fn push(&self, path: &str, value: Value) -> Result<String> {
        let key = PushKey::now().encode();
        self.write(&format!("{}/{key}", path.trim_end_matches('/')), value)?;
        Ok(key)
    }

    async fn transact(&self, path: &str, mut update: TxUpdate<'_>) -> Result<Value> {
        for _ in 0..self.max_retries {
            let current = self.read(path);
            let next = update(current.clone()).await?;
            if self.compare_and_swap(path, current.as_ref(), next.clone())? {
                return Ok(next);
            }
        }
        Err(Error::TransactionFailed {
            path: path.into(),
            reason: format!("gave up after {} conflicting rounds", self.max_retries),
        })
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn lookup<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let node = segs
        .iter()
        .try_fold(root, |node, seg| node.as_object()?.get(*seg))?;
    match node {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        _ => Some(node),
    }
}

fn assign(root: &mut Value, segs: &[&str], value: Value) {
    if value.is_null() {
        remove(root, segs);
        return;
    }
    let mut node = root;
    for seg in segs {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map.entry(*seg).or_insert(Value::Null);
    }
    *node = value;
}

/// Removes the node at `segs` and prunes parents left empty.
fn remove(node: &mut Value, segs: &[&str]) {
    let Some((first, rest)) = segs.split_first() else {
        *node = Value::Object(Map::new());
        return;
    };
    let Some(map) = node.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.remove(*first);
        return;
    }
    if let Some(child) = map.get_mut(*first) {
        remove(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.remove(*first);
        }
    }
}

/// User profiles held in a vector and filtered linearly.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    users: Mutex<Vec<UserDoc>>,
    queries: Mutex<Vec<UserQuery>>,
}

impl MemoryDocumentStore {
    pub fn insert(&self, user: UserDoc) {
        self.users.lock().push(user);
    }

    pub fn extend(&self, users: impl IntoIterator<Item = UserDoc>) {
        self.users.lock().extend(users);
    }

    /// Every query served so far, in arrival order.
    pub fn queries(&self) -> Vec<UserQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query_users(&self, query: &UserQuery) -> Result<Vec<UserDoc>> {
        for (name, list) in [("gender", &query.genders), ("geohash", &query.geohashes)] {
            if list.len() > QUERY_BATCH_LIMIT {
                return Err(Error::invalid_request(format!(
                    "{name} IN predicate holds {} values, at most {QUERY_BATCH_LIMIT} allowed",
                    list.len()
                )));
            }
        }
        self.queries.lock().push(query.clone());
        Ok(self
            .users
            .lock()
            .iter()
            .filter(|u| query.matches(u))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: Mutex<bool>,
}

impl MemoryObjectStore {
    pub fn get(&self, name: &str) -> Option<StoredObject> {
        self.objects.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        name: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        if *self.failing.lock() {
            return Err(Error::unavailable(format!("injected failure writing {name}")));
        }
        self.objects
            .lock()
            .insert(name.into(), StoredObject { data, metadata });
        Ok(())
    }
}

/// Records every batch and answers per token.
#[derive(Debug, Default)]
pub struct MemoryPushProvider {
    batches: Mutex<Vec<Vec<Notification>>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryPushProvider {
    /// Every notification addressed to `token` will be reported as failed.
    pub fn reject_token(&self, token: impl Into<String>) {
        self.rejected.lock().insert(token.into());
    }

    pub fn batches(&self) -> Vec<Vec<Notification>> {
        self.batches.lock().clone()
    }

    /// All notifications sent so far, batches flattened.
    pub fn sent(&self) -> Vec<Notification> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl PushProvider for MemoryPushProvider {
    async fn send_each(&self, notifications: Vec<Notification>) -> Result<BatchResponse> {
        let rejected = self.rejected.lock().clone();
        let responses = notifications
            .iter()
            .enumerate()
            .map(|(i, n)| {
                if rejected.contains(&n.token) {
                    Err(format!("unregistered token {}", n.token))
                } else {
                    Ok(format!("memory/messages/{i}"))
                }
            })
            .collect();
        self.batches.lock().push(notifications);
        Ok(BatchResponse { responses })
    }
}

/// Concrete handles to every in-memory backend behind a registry.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    pub registry: ShardRegistry,
    pub realtime: BTreeMap<(Region, usize), Arc<MemoryRealtimeStore>>,
    pub temp_buckets: BTreeMap<(Region, usize), Arc<MemoryObjectStore>>,
    pub documents: Arc<MemoryDocumentStore>,
    pub push: Arc<MemoryPushProvider>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Builds every shard of every region.
    pub fn new() -> Self {
        let documents = Arc::new(MemoryDocumentStore::default());
        let push = Arc::new(MemoryPushProvider::default());
        let mut registry = ShardRegistry::new(documents.clone(), push.clone());
        let mut realtime = BTreeMap::new();
        let mut temp_buckets = BTreeMap::new();

        for region in Region::ALL {
            let shards: [Shard; SHARDS_PER_REGION] = core::array::from_fn(|index| {
                let rt = Arc::new(MemoryRealtimeStore::default());
                let temp = Arc::new(MemoryObjectStore::default());
                realtime.insert((region, index), rt.clone());
                temp_buckets.insert((region, index), temp.clone());
                Shard {
                    realtime: rt,
                    temp_bucket: temp,
                }
            });
            registry = registry.with_region(region, shards);
        }

        Self {
            registry,
            realtime,
            temp_buckets,
            documents,
            push,
        }
    }

    /// The realtime store of a shard. Panics on an unknown shard, which only
    /// happens through a test bug.
    pub fn realtime(&self, region: Region, shard: usize) -> &MemoryRealtimeStore {
        &self.realtime[&(region, shard)]
    }

    pub fn temp_bucket(&self, region: Region, shard: usize) -> &MemoryObjectStore {
        &self.temp_buckets[&(region, shard)]
    }
}

impl ShardRegistry {
    /// A registry backed entirely by in-memory stores.
    pub fn in_memory() -> Self {
        MemoryBackend::new().registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tx_update;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_and_remove() {
        let store = MemoryRealtimeStore::default();
        store.set("a/b/c", json!(1)).await.unwrap();
        store.set("a/b/d", json!("x")).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(json!({"c": 1, "d": "x"})));

        store.set("a/b/c", Value::Null).await.unwrap();
        store.set("a/b/d", Value::Null).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), None);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn push_keys_sort_chronologically() {
        let store = MemoryRealtimeStore::default();
        let mut keys = Vec::new();
        for i in 0..3 {
            keys.push(store.push("q", json!(i)).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let Some(Value::Object(children)) = store.get("q").await.unwrap() else {
            panic!("queue missing");
        };
        let stored: Vec<&String> = children.keys().collect();
        assert_eq!(stored, keys.iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn transaction_abort_leaves_value_untouched() {
        let store = MemoryRealtimeStore::default();
        store.set("n", json!(7)).await.unwrap();
        let err = store
            .transact(
                "n",
                tx_update(|_| async {
                    Err::<Value, _>(Error::StaleUpdate { path: "n".into() })
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleUpdate { .. }));
        assert_eq!(store.get("n").await.unwrap(), Some(json!(7)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_do_not_lose_updates() {
        let store = Arc::new(MemoryRealtimeStore::new(1_000));
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .transact(
                            "counter",
                            tx_update(|current| async move {
                                let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                                tokio::task::yield_now().await;
                                Ok(json!(n + 1))
                            }),
                        )
                        .await
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }
        assert_eq!(store.get("counter").await.unwrap(), Some(json!(50)));
    }

    #[tokio::test]
    async fn injected_faults_fail_writes() {
        let store = MemoryRealtimeStore::default();
        store.fail_next_writes(1);
        assert!(matches!(
            store.set("x", json!(1)).await,
            Err(Error::StoreUnavailable { .. })
        ));
        store.set("x", json!(1)).await.unwrap();

        store.fail_writes_under("nodes/bad");
        assert!(store.push("nodes/bad/queues/d", json!("p")).await.is_err());
        store.push("nodes/good/queues/d", json!("p")).await.unwrap();
        store.clear_faults();
        store.push("nodes/bad/queues/d", json!("p")).await.unwrap();
    }

    #[tokio::test]
    async fn document_store_bounds_in_predicates() {
        let docs = MemoryDocumentStore::default();
        let query = UserQuery {
            min_age: 0,
            max_age: 99,
            genders: vec!["x".into()],
            geohashes: (0..11).map(|i| i.to_string()).collect(),
            limit: 10,
            offset: 0,
        };
        assert!(matches!(
            docs.query_users(&query).await,
            Err(Error::InvalidRequest { .. })
        ));
    }

    #[test]
    fn registry_covers_every_region_and_shard() {
        let registry = ShardRegistry::in_memory();
        assert_eq!(registry.regions().count(), Region::ALL.len());
        for region in Region::ALL {
            for shard in 0..SHARDS_PER_REGION {
                assert!(registry.shard(region, shard).is_ok());
            }
            assert!(matches!(
                registry.shard(region, SHARDS_PER_REGION),
                Err(Error::UnknownShard { .. })
            ));
        }
    }
}
