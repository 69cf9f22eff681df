//! The external collaborators the core talks to.
//!
//! Every backend is reached through an object-safe trait so that a deployment
//! can plug in its own clients while tests run against [`memory`]. The
//! [`ShardRegistry`] is built once at start-up and handed to every component
//! that needs store access.

pub mod memory;
mod registry;

pub use registry::*;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use core::fmt;
use futures::{FutureExt, future::BoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node of the tree-structured realtime store.
pub type Value = serde_json::Value;

/// Read-modify-write step of a realtime transaction.
///
/// Receives the value currently stored at the path (`None` when absent) and
/// returns the value to commit. Returning an error aborts the transaction
/// without writing. The backend may call the closure several times when a
/// concurrent writer wins the compare-and-swap.
pub type TxUpdate<'a> = Box<dyn FnMut(Option<Value>) -> BoxFuture<'a, Result<Value>> + Send + 'a>;

/// Boxes a closure into a [`TxUpdate`].
pub fn tx_update<'a, F, Fut>(mut update: F) -> TxUpdate<'a>
where
    F: FnMut(Option<Value>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Value>> + Send + 'a,
{
    Box::new(move |current| update(current).boxed())
}

/// Path-addressed tree store with optimistic single-path transactions.
///
/// Paths are `/`-separated. Reading a path returns the whole subtree below it.
#[async_trait]
pub trait RealtimeStore: fmt::Debug + Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Unconditional write. Writing `null` removes the node.
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Appends `value` under an auto-generated, chronologically ordered child
    /// key of `path` and returns that key.
    async fn push(&self, path: &str, value: Value) -> Result<String>;

    /// Runs `update` against the current value of `path` and commits its
    /// output with compare-and-swap, re-running it on conflict.
    ///
    /// # Errors
    ///
    /// Returns whatever `update` returned when it aborts, or
    /// [`crate::Error::TransactionFailed`] once the backend gives up retrying.
    async fn transact(&self, path: &str, update: TxUpdate<'_>) -> Result<Value>;
}

/// Filters of a recipient scan. The two list predicates are `IN` filters and
/// are bounded by [`crate::config::QUERY_BATCH_LIMIT`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuery {
    pub min_age: u32,
    pub max_age: u32,
    pub genders: Vec<String>,
    pub geohashes: Vec<String>,
    pub limit: usize,
    /// Matching users to skip, for paging through a batch.
    pub offset: usize,
}

impl UserQuery {
    pub fn matches(&self, user: &UserDoc) -> bool {
        (self.min_age..=self.max_age).contains(&user.age)
            && self.genders.contains(&user.gender)
            && self.geohashes.contains(&user.geohash)
    }
}

/// A user profile as stored in the document store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserDoc {
    /// Root string of the user, `<token>-<region>-<shard>r`.
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Push token of the user's main device.
    pub token: String,
    pub age: u32,
    pub gender: String,
    pub geohash: String,
}

#[async_trait]
pub trait DocumentStore: fmt::Debug + Send + Sync {
    /// Returns at most `query.limit` users matching every filter.
    async fn query_users(&self, query: &UserQuery) -> Result<Vec<UserDoc>>;
}

#[async_trait]
pub trait ObjectStore: fmt::Debug + Send + Sync {
    /// Stores `data` under `name` with string metadata attached.
    async fn put_object(
        &self,
        name: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
}

/// One push notification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub token: String,
    pub data: HashMap<String, String>,
    pub title: String,
    pub body: String,
}

/// Per-message outcome of a batched send, in request order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub responses: Vec<core::result::Result<String, String>>,
}

impl BatchResponse {
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }
}

#[async_trait]
pub trait PushProvider: fmt::Debug + Send + Sync {
    /// Sends every notification in one call.
    ///
    /// # Errors
    ///
    /// Fails only when the whole batch could not be submitted. Individual
    /// rejections are reported in the [`BatchResponse`].
    async fn send_each(&self, notifications: Vec<Notification>) -> Result<BatchResponse>;
}

/// Joins path segments with `/`.
pub fn join_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for segment in segments {
        let segment = segment.as_ref().trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}
