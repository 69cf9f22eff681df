use super::composed::{ComposedId, strip_marker};
use crate::{Error, Result};
use core::{fmt, str::FromStr};

/// Separator between the parties of a root.
pub const ROOT_SEPARATOR: char = '^';

/// Kind marker appended to every identifier inside a root string.
pub const ROOT_MARKER: char = 'r';

/// A stable conversation identifier made of one or two parties.
///
/// Wire form: `<id>r` or `<id>r^<id>r`. The first party is the root's home: its
/// shard holds the sequence counters and the message slots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Root {
    ids: Vec<ComposedId>,
}

impl Root {
    /// Builds a root from one or two identifiers, order preserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoot`] for an empty list or more than two
    /// parties.
    pub fn from_ids(ids: Vec<ComposedId>) -> Result<Self> {
        if !(1..=2).contains(&ids.len()) {
            return Err(Error::InvalidRoot {
                input: ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(&ROOT_SEPARATOR.to_string()),
            });
        }
        Ok(Self { ids })
    }

    /// Parses a root string.
    ///
    /// Every `^`-separated part loses its trailing kind marker and is decoded.
    /// Parts that fail to decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoot`] if no part decodes, or more than two do.
    pub fn parse(s: &str) -> Result<Self> {
        let ids: Vec<ComposedId> = s
            .split(ROOT_SEPARATOR)
            .filter_map(strip_marker)
            .filter_map(|(part, _)| ComposedId::decode(part).ok())
            .collect();
        if ids.is_empty() || ids.len() > 2 {
            return Err(Error::InvalidRoot { input: s.into() });
        }
        Ok(Self { ids })
    }

    /// Parses a root that must hold exactly one party.
    pub fn parse_single(s: &str) -> Result<ComposedId> {
        let mut root = Self::parse(s)?;
        match root.ids.len() {
            1 => Ok(root.ids.remove(0)),
            _ => Err(Error::InvalidRoot { input: s.into() }),
        }
    }

    pub fn ids(&self) -> &[ComposedId] {
        &self.ids
    }

    /// The party whose shard hosts this root.
    pub fn home(&self) -> &ComposedId {
        &self.ids[0]
    }

    /// Tokens joined by `^`. This is the root's key in the realtime store.
    pub fn unik(&self) -> String {
        self.ids
            .iter()
            .map(ComposedId::token)
            .collect::<Vec<_>>()
            .join(&ROOT_SEPARATOR.to_string())
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, "{ROOT_SEPARATOR}")?;
            }
            write!(f, "{id}{ROOT_MARKER}")?;
        }
        Ok(())
    }
}

impl FromStr for Root {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parses a root string into its parties. See [`Root::parse`].
pub fn parse_root(s: &str) -> Result<Vec<ComposedId>> {
    Root::parse(s).map(|root| root.ids)
}
