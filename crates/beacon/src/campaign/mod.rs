//! Priced, geo- and demographically targeted broadcasts.
//!
//! A campaign scans each of its areas ring by ring for users matching the age
//! and gender filters, re-checks every candidate against the exact area, and
//! stops once `limit` recipients are found. Recipients are then written out in
//! packs: each pack stores the campaign body on one shard of its dominant
//! region and drops a price-ranked entry into every recipient's queue.

mod pricing;
mod targeter;

pub use pricing::*;
pub use targeter::*;

use crate::{
    geo::Area,
    id::{ComposedId, Region},
    store::{UserDoc, Value},
};
use bytes::Bytes;
use serde_json::Map;
use std::collections::HashMap;

/// Media attached to a campaign.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CampaignMedia {
    pub data: Bytes,
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CampaignRequest {
    /// Root string of the sender.
    pub sender_id: String,
    pub sender_device: String,
    pub sender_token: String,
    /// Maximum number of recipients.
    pub limit: usize,
    pub min_age: u32,
    pub max_age: u32,
    pub genders: Vec<String>,
    /// Scanned in order until `limit` recipients are found.
    pub areas: Vec<Area>,
    pub price_per_head: u64,
    pub payload: Map<String, Value>,
    pub media: Option<CampaignMedia>,
}

/// Where one pack was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackRecord {
    pub index: usize,
    pub campaign_id: ComposedId,
    /// Half-open recipient range `[start, end)` covered by the pack.
    pub start: usize,
    pub end: usize,
    pub media_id: Option<String>,
    /// Queue entries written.
    pub queued: usize,
    /// Recipients skipped because their id did not parse or the write failed.
    pub skipped: usize,
}

impl PackRecord {
    pub const fn region(&self) -> Region {
        self.campaign_id.region()
    }

    pub const fn shard(&self) -> usize {
        self.campaign_id.shard()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CampaignOutcome {
    pub recipients: Vec<UserDoc>,
    pub packs: Vec<PackRecord>,
    /// Packs whose body or media could not be written.
    pub failed_packs: Vec<(usize, crate::Error)>,
    /// Whether the completion entry reached the sender's queue.
    pub sender_notified: bool,
}
