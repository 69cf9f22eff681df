use super::{CampaignOutcome, CampaignRequest, PackRecord, price_rank_prefix, queue_key};
use crate::{
    Error, Result,
    config::{QUERY_BATCH_LIMIT, SHARDS_PER_REGION, Settings},
    fanout::{FanoutDispatcher, NotificationHeader},
    geo::{Area, LatLon, RingSearch},
    id::{ComposedId, Region, Root},
    rand::{RandSource, ThreadRandom},
    store::{ShardRegistry, UserDoc, UserQuery, Value, join_path},
};
use futures::future::join_all;
use serde_json::{Map, json};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

/// Title of the notification sent to the sender once a campaign is out.
pub const COMPLETED_TITLE: &str = "Completed Boost";

/// Finds campaign recipients and writes the campaign out to them.
#[derive(Clone, Debug)]
pub struct CampaignTargeter {
    registry: ShardRegistry,
    ring: RingSearch,
    pack_size: usize,
    dispatcher: FanoutDispatcher,
}

/// The parts of a request every pack needs.
#[derive(Debug)]
struct PackJob {
    payload: Map<String, Value>,
    price: u64,
    rank: String,
    media: Option<super::CampaignMedia>,
}

impl CampaignTargeter {
    pub fn new(registry: ShardRegistry, settings: &Settings) -> Self {
        Self {
            dispatcher: FanoutDispatcher::new(registry.clone()),
            registry,
            ring: RingSearch::new(settings.geohash_precision),
            pack_size: settings.pack_size.max(1),
        }
    }

    /// Scans, writes every pack and reports back to the sender.
    ///
    /// # Errors
    ///
    /// - [`Error::PriceOutOfRange`] / [`Error::InvalidRequest`] /
    ///   [`Error::InvalidArea`] before anything is read.
    /// - [`Error::NoRecipients`] when the scan found nobody.
    /// - [`Error::CampaignFailed`] when no pack could be written.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip_all, fields(sender = %request.sender_id, limit = request.limit))
    )]
    pub async fn run(&self, request: &CampaignRequest) -> Result<CampaignOutcome> {
        let rank = price_rank_prefix(request.price_per_head)?;
        validate(request)?;

        let recipients = self.scan(request).await?;
        if recipients.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!("no recipients matched");
            return Err(Error::NoRecipients);
        }

        let job = Arc::new(PackJob {
            payload: request.payload.clone(),
            price: request.price_per_head,
            rank,
            media: request.media.clone(),
        });
        let (packs, failed_packs) = self.write_packs(job, &recipients).await;
        if packs.is_empty() {
            return Err(Error::CampaignFailed {
                packs: failed_packs.len(),
            });
        }

        let sender_notified = self.notify_sender(request, recipients.len()).await;

        #[cfg(feature = "tracing")]
        tracing::info!(
            recipients = recipients.len(),
            packs = packs.len(),
            failed = failed_packs.len(),
            "campaign written"
        );

        Ok(CampaignOutcome {
            recipients,
            packs,
            failed_packs,
            sender_notified,
        })
    }

    /// Collects up to `limit` distinct recipients, area by area.
    pub async fn scan(&self, request: &CampaignRequest) -> Result<Vec<UserDoc>> {
        let mut accepted = Vec::with_capacity(request.limit.min(QUERY_BATCH_LIMIT * 100));
        let mut seen = HashSet::new();
        for area in &request.areas {
            let remaining = request.limit - accepted.len();
            if remaining == 0 {
                break;
            }
            self.scan_area(request, area, remaining, &mut seen, &mut accepted)
                .await?;
        }
        Ok(accepted)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(center = ?area.center, quota = quota))
    )]
    async fn scan_area(
        &self,
        request: &CampaignRequest,
        area: &Area,
        quota: usize,
        seen: &mut HashSet<String>,
        accepted: &mut Vec<UserDoc>,
    ) -> Result<()> {
        let mut remaining = quota;
        for batch in self.ring.batches(area)? {
            let mut query = UserQuery {
                min_age: request.min_age,
                max_age: request.max_age,
                genders: request.genders.clone(),
                geohashes: batch,
                limit: remaining,
                offset: 0,
            };
            // Page through the batch: rejected candidates do not count
            // against the quota, so a full page may hide more matches.
            loop {
                let page = self.registry.documents().query_users(&query).await?;
                let exhausted = page.len() < query.limit;
                query.offset += page.len();

                for user in page {
                    if !area.contains(LatLon::new(user.latitude, user.longitude)) {
                        continue;
                    }
                    if !seen.insert(user.id.clone()) {
                        continue;
                    }
                    accepted.push(user);
                    remaining -= 1;
                    if remaining == 0 {
                        return Ok(());
                    }
                }
                if exhausted {
                    break;
                }
                query.limit = remaining;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(found = quota - remaining, "area scanned");
        Ok(())
    }

    /// Writes every pack concurrently. Returns the written packs in order and
    /// the failures by pack index.
    async fn write_packs(
        &self,
        job: Arc<PackJob>,
        recipients: &[UserDoc],
    ) -> (Vec<PackRecord>, Vec<(usize, Error)>) {
        let handles: Vec<_> = recipients
            .chunks(self.pack_size)
            .enumerate()
            .map(|(index, users)| {
                let this = self.clone();
                let job = job.clone();
                let users = users.to_vec();
                let start = index * self.pack_size;
                tokio::spawn(async move { this.write_pack(&job, index, start, users).await })
            })
            .collect();

        let mut packs = Vec::with_capacity(handles.len());
        let mut failed = Vec::new();
        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined.map_err(Error::from).and_then(|r| r) {
                Ok(record) => packs.push(record),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(pack = index, error = %e, "campaign pack failed");
                    failed.push((index, e));
                }
            }
        }
        (packs, failed)
    }

    async fn write_pack(
        &self,
        job: &PackJob,
        index: usize,
        start: usize,
        users: Vec<UserDoc>,
    ) -> Result<PackRecord> {
        let end = start + users.len();
        let mut tally = BTreeMap::<Region, usize>::new();
        let ids: Vec<ComposedId> = users
            .iter()
            .filter_map(|user| match Root::parse_single(&user.id) {
                Ok(id) => {
                    *tally.entry(id.region()).or_default() += 1;
                    Some(id)
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(user = %user.id, error = %_e, "skipping recipient with invalid root");
                    None
                }
            })
            .collect();
        let mut skipped = users.len() - ids.len();

        let region = dominant_region(&tally).ok_or_else(|| {
            Error::invalid_request(format!("pack {index} has no addressable recipient"))
        })?;
        let shard_index =
            (RandSource::<u64>::rand(&ThreadRandom) % SHARDS_PER_REGION as u64) as usize;
        let shard = self.registry.shard(region, shard_index)?;
        let campaign_id = ComposedId::generate(region, shard_index)?;
        let campaign_wire = campaign_id.to_string();

        let mut body = job.payload.clone();
        body.insert("id".into(), json!(campaign_wire));
        body.insert("price".into(), json!(job.price));
        body.insert("packStart".into(), json!(start));
        body.insert("packEnd".into(), json!(end));
        shard
            .realtime
            .set(
                &join_path(["campaigns", campaign_id.token()]),
                Value::Object(body),
            )
            .await?;

        let mut media_id = None;
        if let Some(media) = job.media.as_ref().filter(|m| !m.data.is_empty()) {
            let id = format!("{}m", ComposedId::generate(region, shard_index)?);
            let mut metadata = media.metadata.clone();
            metadata.insert("id".into(), id.clone());
            shard
                .temp_bucket
                .put_object(&id, media.data.clone(), metadata)
                .await?;
            media_id = Some(id);
        }

        let key = queue_key(&job.rank, &campaign_wire);
        let mut queued = 0;
        for id in &ids {
            let path = join_path(["nodes", id.token(), "queues", "boost", key.as_str()]);
            let written = match self.registry.shard_of(id) {
                Ok(home) => home.realtime.set(&path, json!("")).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => queued += 1,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(recipient = %id, error = %_e, "campaign queue write failed");
                    skipped += 1;
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(pack = index, %campaign_id, queued, skipped, "pack written");

        Ok(PackRecord {
            index,
            campaign_id,
            start,
            end,
            media_id,
            queued,
            skipped,
        })
    }

    /// Tells the sender how many recipients were reached. Returns whether the
    /// completion entry reached the sender's queue.
    async fn notify_sender(&self, request: &CampaignRequest, count: usize) -> bool {
        let queued = match self
            .dispatcher
            .queue_write(
                &request.sender_id,
                &request.sender_device,
                &format!("done@{count}"),
            )
            .await
        {
            Ok(_) => true,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(sender = %request.sender_id, error = %_e, "could not queue campaign receipt");
                false
            }
        };

        if !request.sender_token.is_empty() {
            let header = NotificationHeader {
                title: COMPLETED_TITLE.into(),
                body: format!("Found {count} targets"),
                ..NotificationHeader::default()
            };
            self.dispatcher
                .notify(vec![header.notification(&request.sender_token)])
                .await;
        }
        queued
    }
}

fn validate(request: &CampaignRequest) -> Result<()> {
    if request.limit == 0 {
        return Err(Error::invalid_request("limit must be positive"));
    }
    if request.min_age > request.max_age {
        return Err(Error::invalid_request(format!(
            "age range {}..={} is empty",
            request.min_age, request.max_age
        )));
    }
    if request.genders.is_empty() || request.genders.len() > QUERY_BATCH_LIMIT {
        return Err(Error::invalid_request(format!(
            "between 1 and {QUERY_BATCH_LIMIT} genders required, got {}",
            request.genders.len()
        )));
    }
    if request.areas.is_empty() {
        return Err(Error::invalid_request("no area to scan"));
    }
    Ok(())
}

/// Region with the most recipients; ties go to the first region in order.
fn dominant_region(tally: &BTreeMap<Region, usize>) -> Option<Region> {
    tally
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(region, _)| *region)
}
