//! Error types for the targeting, sequencing and delivery core.
//!
//! Every fallible operation in this crate returns [`Error`]. Parsing and
//! validation failures are returned synchronously to the immediate caller,
//! while failures inside spawned tasks travel back to the collector as
//! ordinary `Result` values.
//!
//! ## Error Cases
//! - `InvalidIdentifier` / `InvalidRoot` / `InvalidMessageId`: malformed wire
//!   strings. Abort only the item being parsed.
//! - `SlotConflict`: a message slot was already occupied. Retried by the
//!   sequence allocator.
//! - `StaleUpdate`: an update pointer was not advanced because a newer key is
//!   already stored. Never retried.
//! - `StoreUnavailable` / `TransactionFailed`: infrastructure failures,
//!   surfaced as-is.
//! - `DeliveryFailed`: every fan-out target failed.

use core::fmt;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants the core can emit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The string is not a `<token>-<region>-<shard>` identifier.
    #[error("invalid identifier: {input:?}")]
    InvalidIdentifier { input: String },

    /// No part of the root string decoded into an identifier.
    #[error("invalid root: {input:?}")]
    InvalidRoot { input: String },

    /// The string is not a `<sequence>@<root><kind>` message id.
    #[error("invalid message id: {input:?}")]
    InvalidMessageId { input: String },

    /// The message slot was already written by a concurrent allocation.
    #[error("slot already occupied at {path}")]
    SlotConflict { path: String },

    /// Every allocation attempt hit an occupied slot.
    #[error("sequence allocation for root {root} gave up after {attempts} attempts")]
    AttemptsExhausted { root: String, attempts: usize },

    /// A newer update key is already stored at `path`.
    #[error("update pointer at {path} is already more recent")]
    StaleUpdate { path: String },

    /// The backing store could not be reached or rejected the operation.
    #[error("store unavailable: {context}")]
    StoreUnavailable { context: String },

    /// The store could not commit the transaction.
    #[error("transaction at {path} failed: {reason}")]
    TransactionFailed { path: String, reason: String },

    /// Every fan-out target failed.
    #[error("delivery failed for all {total} targets ({failed} failures)")]
    DeliveryFailed { failed: usize, total: usize },

    /// The price does not fit the fixed 32-bit rank width.
    #[error("price {price} exceeds the maximum of {max}", max = u32::MAX)]
    PriceOutOfRange { price: u64 },

    /// The targeted area cannot be searched.
    #[error("invalid area: {reason}")]
    InvalidArea { reason: String },

    /// The request was malformed or exceeded a store limit.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// No shard is registered for this region/index pair.
    #[error("no shard {shard} in region {region}")]
    UnknownShard { region: String, shard: usize },

    /// A campaign scan found nobody to deliver to.
    #[error("no recipients matched the campaign filters")]
    NoRecipients,

    /// Every campaign pack failed to write.
    #[error("every campaign pack failed ({packs} packs)")]
    CampaignFailed { packs: usize },
}

impl Error {
    /// Returns `true` for kinds the core retries on its own.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SlotConflict { .. })
    }

    pub(crate) fn unavailable(context: impl fmt::Display) -> Self {
        Self::StoreUnavailable {
            context: context.to_string(),
        }
    }

    pub(crate) fn invalid_request(reason: impl fmt::Display) -> Self {
        Self::InvalidRequest {
            reason: reason.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::StoreUnavailable {
            context: format!("task failed: {err}"),
        }
    }
}
