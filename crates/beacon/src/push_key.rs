use crate::{
    Error, Result,
    encoding::base58,
    rand::{RandSource, ThreadRandom},
    time::{SystemClock, TimeSource},
};
use core::{fmt, str::FromStr};

/// A time-ordered, collision-resistant key used as a cheap logical clock.
///
/// The key packs a millisecond timestamp and a random component into a `u128`
/// and renders it as fixed-width base58:
///
/// ```text
///  Bit Index:  127            64 63            0
///              +----------------+--------------+
///  Field:      | timestamp (64) | random (64)  |
///              +----------------+--------------+
///              |<-- MSB -- 128 bits -- LSB --->|
/// ```
///
/// Keys minted in different milliseconds always compare in time order, both as
/// values and as strings. Keys minted in the same millisecond are ordered by
/// their random half, so they only compare "correctly" by chance.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PushKey {
    id: u128,
}

impl PushKey {
    pub const TIMESTAMP_BITS: u32 = 64;
    pub const RANDOM_BITS: u32 = 64;
    pub const TIMESTAMP_SHIFT: u32 = Self::RANDOM_BITS;

    /// Builds a key from its two halves.
    #[must_use]
    pub const fn from_components(timestamp: u64, random: u64) -> Self {
        Self {
            id: ((timestamp as u128) << Self::TIMESTAMP_SHIFT) | random as u128,
        }
    }

    /// Mints a key from the system clock and the thread-local RNG.
    #[must_use]
    pub fn now() -> Self {
        Self::generate(&SystemClock, &ThreadRandom)
    }

    /// Mints a key from the given time and random sources.
    pub fn generate<T, R>(time: &T, rand: &R) -> Self
    where
        T: TimeSource<u64>,
        R: RandSource<u64>,
    {
        Self::from_components(time.current_millis(), rand.rand())
    }

    /// Milliseconds since the Unix epoch at which the key was minted.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) as u64
    }

    /// The random half of the key.
    #[must_use]
    pub const fn random(&self) -> u64 {
        self.id as u64
    }

    #[must_use]
    pub const fn to_raw(&self) -> u128 {
        self.id
    }

    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self { id: raw }
    }

    /// Big-endian bytes: 8 timestamp bytes followed by 8 random bytes.
    #[must_use]
    pub const fn to_be_bytes(&self) -> [u8; 16] {
        self.id.to_be_bytes()
    }

    /// The 22-character base58 form.
    #[must_use]
    pub fn encode(&self) -> String {
        base58::encode_u128(self.id)
    }
}

impl fmt::Display for PushKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for PushKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushKey")
            .field("timestamp", &self.timestamp())
            .field("random", &self.random())
            .field("encoded", &self.encode())
            .finish()
    }
}

impl FromStr for PushKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != base58::U128_WIDTH {
            return Err(Error::InvalidIdentifier { input: s.into() });
        }
        base58::decode_u128(s)
            .map(Self::from_raw)
            .ok_or_else(|| Error::InvalidIdentifier { input: s.into() })
    }
}

/// Mints a fresh push key string. See [`PushKey`].
pub fn make_push_key() -> String {
    PushKey::now().encode()
}
