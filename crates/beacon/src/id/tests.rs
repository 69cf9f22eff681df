use super::*;
use crate::{Error, config::SHARDS_PER_REGION};

fn id(token: &str, region: Region, shard: usize) -> ComposedId {
    ComposedId::new(token, region, shard).unwrap()
}

#[test]
fn identifier_round_trips_for_every_region_and_shard() {
    for region in Region::ALL {
        for shard in 0..SHARDS_PER_REGION {
            for token in ["a", "Xy7", "3mJr7AoUXx2Wqd"] {
                let wire = encode(token, region, shard).unwrap();
                let decoded = ComposedId::decode(&wire).unwrap();
                assert_eq!(decoded.token(), token);
                assert_eq!(decoded.region(), region);
                assert_eq!(decoded.shard(), shard);
            }
        }
    }
}

#[test]
fn generated_identifiers_are_distinct_and_decodable() {
    let a = ComposedId::generate(Region::Asia, 1).unwrap();
    let b = ComposedId::generate(Region::Asia, 1).unwrap();
    assert_ne!(a, b);
    assert_eq!(ComposedId::decode(&a.encode()).unwrap(), a);
}

#[test]
fn decode_requires_exactly_three_fields() {
    for bad in [
        "",
        "abc",
        "abc-america",
        "abc-america-0-1",
        "abc-mars-0",
        "abc-america-x",
        "abc-america--1",
        "-america-0",
    ] {
        assert!(
            matches!(ComposedId::decode(bad), Err(Error::InvalidIdentifier { .. })),
            "{bad:?} should not decode"
        );
    }
}

#[test]
fn decode_rejects_out_of_range_shard() {
    let wire = format!("abc-europe-{SHARDS_PER_REGION}");
    assert!(ComposedId::decode(&wire).is_err());
    assert!(ComposedId::new("abc", Region::Europe, SHARDS_PER_REGION).is_err());
}

#[test]
fn new_rejects_reserved_characters_in_token() {
    for token in ["", "a-b", "a^b", "a@b"] {
        assert!(ComposedId::new(token, Region::America, 0).is_err(), "{token:?}");
    }
}

#[test]
fn root_round_trips_single_and_dual() {
    let alice = id("alice", Region::America, 0);
    let bob = id("bob", Region::Europe, 1);

    for ids in [vec![alice.clone()], vec![alice.clone(), bob.clone()], vec![bob, alice]] {
        let root = Root::from_ids(ids.clone()).unwrap();
        let wire = root.to_string();
        assert_eq!(parse_root(&wire).unwrap(), ids, "{wire}");
    }
}

#[test]
fn root_wire_form_carries_markers() {
    let root = Root::from_ids(vec![
        id("alice", Region::America, 0),
        id("bob", Region::Asia, 1),
    ])
    .unwrap();
    assert_eq!(root.to_string(), "alice-america-0r^bob-asia-1r");
    assert_eq!(root.unik(), "alice^bob");
    assert_eq!(root.home().token(), "alice");
}

#[test]
fn root_parse_skips_undecodable_parts() {
    let ids = parse_root("garbage^bob-asia-1r").unwrap();
    assert_eq!(ids, vec![id("bob", Region::Asia, 1)]);
}

#[test]
fn root_parse_fails_when_nothing_decodes() {
    for bad in ["", "^", "garbage", "alice-america-0"] {
        // the last one loses its final digit to the marker trim
        assert!(
            matches!(Root::parse(bad), Err(Error::InvalidRoot { .. })),
            "{bad:?}"
        );
    }
}

#[test]
fn root_rejects_more_than_two_parties() {
    assert!(Root::parse("a-asia-0r^b-asia-0r^c-asia-0r").is_err());
    assert!(Root::from_ids(vec![]).is_err());
}

#[test]
fn parse_single_requires_one_party() {
    assert_eq!(
        Root::parse_single("carol-europe-0r").unwrap(),
        id("carol", Region::Europe, 0)
    );
    assert!(Root::parse_single("a-asia-0r^b-asia-0r").is_err());
}

#[test]
fn message_id_wire_format() {
    let root = Root::from_ids(vec![id("alice", Region::America, 1)]).unwrap();
    let msg = MessageId::new(42, root.clone(), MessageKind::Chat).unwrap();
    assert_eq!(msg.to_string(), "0000000000042@alice-america-1rc");
    assert_eq!(MessageId::parse(&msg.to_string()).unwrap(), msg);

    let snip = MessageId::new(0, root, MessageKind::Snip).unwrap();
    assert_eq!(snip.to_string(), "0000000000000@alice-america-1rs");
}

#[test]
fn parse_message_id_exposes_addressing_parts() {
    let parts = parse_message_id("0000000000007@alice-america-0r^bob-asia-1rc").unwrap();
    assert_eq!(parts.sequence, "0000000000007");
    assert_eq!(parts.root, "alice-america-0r^bob-asia-1r");
    assert_eq!(parts.unik_root, "alice^bob");
    assert_eq!(parts.ids.len(), 2);
}

#[test]
fn malformed_message_ids_are_rejected() {
    for bad in [
        "",
        "c",
        "0000000000007alice-america-0rc",
        "0000000000007@alice-america-0r@xc",
        "00000000x0007@alice-america-0rc",
        "@alice-america-0rc",
        "0000000000007@alice-america-0rq",
    ] {
        assert!(
            matches!(MessageId::parse(bad), Err(Error::InvalidMessageId { .. })),
            "{bad:?}"
        );
    }
    assert!(matches!(
        MessageId::parse("0000000000007@nothingc"),
        Err(Error::InvalidRoot { .. })
    ));
}

#[test]
fn sequence_keys_sort_numerically() {
    let keys: Vec<String> = [0_u64, 9, 10, 99, 100, 1_000_000].map(sequence_key).to_vec();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert!(MessageId::new(10_u64.pow(13), Root::parse("a-asia-0r").unwrap(), MessageKind::Chat).is_err());
}

#[test]
fn media_ids_accept_both_forms() {
    let expected = id("m3d1a", Region::Asia, 0);
    assert_eq!(parse_media_id("m3d1a-asia-0m").unwrap(), expected);
    assert_eq!(parse_media_id("m3d1a-asia-0@x@y").unwrap(), expected);
    assert!(parse_media_id("").is_err());
}
