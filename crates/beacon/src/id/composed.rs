use crate::{
    Error, Result,
    config::SHARDS_PER_REGION,
    encoding::base58,
    rand::{RandSource, ThreadRandom},
};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// Field delimiter of the `<token>-<region>-<shard>` format.
pub const FIELD_SEPARATOR: char = '-';

/// Characters a token may never contain: they delimit identifiers, roots and
/// message ids.
const RESERVED: [char; 3] = [FIELD_SEPARATOR, '^', '@'];

/// Geographic region hosting a group of shards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    America,
    Asia,
    Europe,
}

impl Region {
    pub const ALL: [Self; 3] = [Self::America, Self::Asia, Self::Europe];

    /// The wire name of the region.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::America => "america",
            Self::Asia => "asia",
            Self::Europe => "europe",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::InvalidIdentifier { input: s.into() })
    }
}

/// Identifies an entity and the physical shard holding it.
///
/// Wire form: `<token>-<region>-<shard>`. The shard is always within
/// `0..SHARDS_PER_REGION`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComposedId {
    token: String,
    region: Region,
    shard: usize,
}

impl ComposedId {
    /// Builds an identifier, validating the token and the shard range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the token is empty, contains a
    /// reserved delimiter, or the shard is out of range.
    pub fn new(token: impl Into<String>, region: Region, shard: usize) -> Result<Self> {
        let token = token.into();
        if !is_valid_token(&token) || shard >= SHARDS_PER_REGION {
            return Err(Error::InvalidIdentifier {
                input: format!("{token}{FIELD_SEPARATOR}{region}{FIELD_SEPARATOR}{shard}"),
            });
        }
        Ok(Self {
            token,
            region,
            shard,
        })
    }

    /// Mints an identifier with a fresh 128-bit random token.
    pub fn generate(region: Region, shard: usize) -> Result<Self> {
        let raw: u128 = ThreadRandom.rand();
        Self::new(base58::encode_u128(raw), region, shard)
    }

    /// Parses the `<token>-<region>-<shard>` wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] unless the input splits into
    /// exactly three fields with a known region and an in-range integer shard.
    pub fn decode(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidIdentifier { input: s.into() };
        let mut fields = s.split(FIELD_SEPARATOR);
        let (Some(token), Some(region), Some(shard), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(invalid());
        };
        let region = region.parse::<Region>().map_err(|_| invalid())?;
        let shard = shard.parse::<usize>().map_err(|_| invalid())?;
        Self::new(token, region, shard).map_err(|_| invalid())
    }

    /// Renders the wire form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub const fn region(&self) -> Region {
        self.region
    }

    pub const fn shard(&self) -> usize {
        self.shard
    }
}

impl fmt::Display for ComposedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.token, self.region, self.shard
        )
    }
}

impl FromStr for ComposedId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Builds the wire form from its parts. See [`ComposedId::new`].
pub fn encode(token: &str, region: Region, shard: usize) -> Result<String> {
    ComposedId::new(token, region, shard).map(|id| id.encode())
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && !token.contains(RESERVED)
}

/// Removes the one-character kind marker at the end of `s`.
pub(crate) fn strip_marker(s: &str) -> Option<(&str, char)> {
    let (idx, marker) = s.char_indices().next_back()?;
    Some((&s[..idx], marker))
}
