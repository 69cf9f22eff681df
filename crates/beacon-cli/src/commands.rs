use crate::config::{AppConfig, AreaArgs, DecodeArgs, PushKeyArgs, SimulateArgs};
use anyhow::{Context, bail};
use beacon::{
    MessageAction, MessageRequest, MessageRouter, PushKey, RandSource, ThreadRandom,
    campaign::{CampaignRequest, CampaignTargeter},
    config::SHARDS_PER_REGION,
    fanout::{FanoutTarget, NotificationHeader},
    geo::{Area, LatLon, RingSearch, destination, geohash},
    id::{ComposedId, MessageId, ROOT_MARKER, Region, Root, parse_media_id},
    store::{UserDoc, memory::MemoryBackend},
};
use serde_json::{Map, Value, json};

fn area_of(args: &AreaArgs) -> Area {
    Area::circle(LatLon::new(args.lat, args.lon), args.radius_km, args.samples)
}

pub fn rings(config: &AppConfig, args: &AreaArgs) -> anyhow::Result<Value> {
    let search = RingSearch::new(config.settings.geohash_precision);
    let area = area_of(args);
    let layers = search.layers(&area)?;
    let batches = search.batches(&area)?;
    tracing::info!(
        cells = layers.iter().map(Vec::len).sum::<usize>(),
        layers = layers.len(),
        batches = batches.len(),
        "ring search complete"
    );
    Ok(json!({ "layers": layers, "batches": batches }))
}

fn id_json(id: &ComposedId) -> Value {
    json!({ "token": id.token(), "region": id.region().as_str(), "shard": id.shard() })
}

pub fn decode(args: &DecodeArgs) -> anyhow::Result<Value> {
    let input = args.input.trim();
    if input.contains('@') {
        if let Ok(id) = MessageId::parse(input) {
            return Ok(json!({
                "type": "message",
                "sequence": id.sequence(),
                "kind": id.kind().marker().to_string(),
                "root": id.root().to_string(),
                "unik": id.root().unik(),
                "ids": id.ids().iter().map(id_json).collect::<Vec<_>>(),
            }));
        }
    }
    if let Ok(id) = ComposedId::decode(input) {
        return Ok(json!({ "type": "id", "id": id_json(&id) }));
    }
    if input.ends_with(ROOT_MARKER) {
        let root = Root::parse(input).with_context(|| format!("decoding root {input:?}"))?;
        return Ok(json!({
            "type": "root",
            "unik": root.unik(),
            "ids": root.ids().iter().map(id_json).collect::<Vec<_>>(),
        }));
    }
    match parse_media_id(input) {
        Ok(id) => Ok(json!({ "type": "media", "id": id_json(&id) })),
        Err(e) => bail!("{input:?} is not an id, root, message id or media id: {e}"),
    }
}

pub fn push_keys(args: &PushKeyArgs) -> Value {
    let keys: Vec<String> = (0..args.count).map(|_| PushKey::now().encode()).collect();
    json!(keys)
}

/// Random point within `max_km` of `center`.
fn scatter(center: LatLon, max_km: f64) -> LatLon {
    let r = |scale: u64| (RandSource::<u64>::rand(&ThreadRandom) % scale) as f64 / scale as f64;
    destination(center, r(360_000) * 360.0, r(1_000_000) * max_km)
}

fn random_id() -> anyhow::Result<ComposedId> {
    let pick = |n: usize| (RandSource::<u64>::rand(&ThreadRandom) % n as u64) as usize;
    let region = Region::ALL[pick(Region::ALL.len())];
    let shard = pick(SHARDS_PER_REGION);
    Ok(ComposedId::generate(region, shard)?)
}

pub async fn simulate(config: &AppConfig, args: &SimulateArgs) -> anyhow::Result<Value> {
    let backend = MemoryBackend::new();
    let area = area_of(&args.area);
    let center = LatLon::new(args.area.lat, args.area.lon);

    // Half the seeded users fall outside the area.
    let mut users = Vec::with_capacity(args.users);
    for i in 0..args.users {
        let at = scatter(center, args.area.radius_km * 2.0);
        users.push(UserDoc {
            id: format!("{}{ROOT_MARKER}", random_id()?),
            latitude: at.lat,
            longitude: at.lon,
            token: format!("device-token-{i}"),
            age: 18 + (i % 50) as u32,
            gender: if i % 2 == 0 { "female" } else { "male" }.into(),
            geohash: geohash::encode(at, config.settings.geohash_precision),
        });
    }
    backend.documents.extend(users.iter().cloned());
    tracing::info!(users = users.len(), "seeded document store");

    let sender = random_id()?;
    let sender_root = format!("{sender}{ROOT_MARKER}");
    let mut chat = Vec::new();
    if let Some(peer) = users.first() {
        let peer_id = Root::parse_single(&peer.id)?;
        let root = Root::from_ids(vec![sender.clone(), peer_id])?;
        let router = MessageRouter::new(backend.registry.clone(), &config.settings);
        let targets = vec![FanoutTarget {
            recipient_id: peer.id.clone(),
            device_id: "main".into(),
            push_token: peer.token.clone(),
            wants_queue_write: true,
            wants_notification: true,
        }];
        for n in 0..args.messages {
            let request = MessageRequest {
                action: MessageAction::Chat {
                    root: root.clone(),
                    body: json!({ "text": format!("message {n}") }),
                },
                targets: targets.clone(),
                header: Some(NotificationHeader {
                    title: "New message".into(),
                    body: format!("message {n}"),
                    root: root.to_string(),
                    sender: sender.to_string(),
                }),
            };
            let outcome = router.process(&request).await?;
            chat.push(json!({
                "message_id": outcome.message_id.map(|id| id.to_string()),
                "pushed": outcome.pushed,
            }));
        }
    }

    let request = CampaignRequest {
        sender_id: sender_root.clone(),
        sender_device: "main".into(),
        sender_token: "sender-device-token".into(),
        limit: args.limit,
        min_age: 18,
        max_age: 99,
        genders: vec!["female".into(), "male".into()],
        areas: vec![area],
        price_per_head: args.price,
        payload: Map::from_iter([("text".to_string(), json!("simulated campaign"))]),
        media: None,
    };
    let outcome = CampaignTargeter::new(backend.registry.clone(), &config.settings)
        .run(&request)
        .await?;

    Ok(json!({
        "sender": sender_root,
        "chat": chat,
        "campaign": {
            "recipients": outcome.recipients.len(),
            "packs": outcome.packs.iter().map(|p| json!({
                "campaign_id": p.campaign_id.to_string(),
                "range": [p.start, p.end],
                "queued": p.queued,
                "skipped": p.skipped,
            })).collect::<Vec<_>>(),
            "failed_packs": outcome.failed_packs.len(),
            "sender_notified": outcome.sender_notified,
            "notifications_sent": backend.push.sent().len(),
        },
    }))
}
