//! Layout constants and tunables shared by every component.
//!
//! The constants fix the wire and storage contract (identifier shard range,
//! sequence width, geohash precision, store query limits). [`Settings`]
//! carries the values a deployment may tune at runtime.

/// Number of independent physical shards in every region.
pub const SHARDS_PER_REGION: usize = 2;

/// Geohash precision used by the ring search. Cells are roughly 39 x 19.5 km.
pub const GEOHASH_PRECISION: usize = 4;

/// Upper bound on the cardinality of an `IN` predicate in the document store.
pub const QUERY_BATCH_LIMIT: usize = 10;

/// Number of decimal digits in a message sequence. Lexicographic order equals
/// numeric order up to `10^13 - 1`.
pub const SEQUENCE_WIDTH: usize = 13;

/// Largest sequence representable in [`SEQUENCE_WIDTH`] digits.
pub const MAX_SEQUENCE: u64 = 9_999_999_999_999;

/// Number of allocation attempts absorbed before a slot conflict is surfaced.
pub const MAX_SLOT_ATTEMPTS: usize = 4;

/// Number of recipients written out per campaign pack.
pub const DEFAULT_PACK_SIZE: usize = 20_000;

/// Number of bearings sampled when approximating a circular area.
pub const DEFAULT_PERIMETER_SAMPLES: usize = 12;

const _: () = assert!(SHARDS_PER_REGION > 0);
const _: () = assert!(QUERY_BATCH_LIMIT > 0);
const _: () = assert!(GEOHASH_PRECISION >= 1 && GEOHASH_PRECISION <= 12);
const _: () = assert!(MAX_SEQUENCE == 10_u64.pow(SEQUENCE_WIDTH as u32) - 1);

/// Runtime tunables for the allocator, the ring search and the campaign
/// writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Attempts per sequence allocation before giving up on slot conflicts.
    pub max_slot_attempts: usize,
    /// Recipients per campaign pack.
    pub pack_size: usize,
    /// Geohash precision for ring search.
    pub geohash_precision: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_slot_attempts: MAX_SLOT_ATTEMPTS,
            pack_size: DEFAULT_PACK_SIZE,
            geohash_precision: GEOHASH_PRECISION,
        }
    }
}
