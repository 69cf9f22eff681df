use super::{
    composed::{ComposedId, strip_marker},
    root::Root,
};
use crate::{
    Error, Result,
    config::{MAX_SEQUENCE, SEQUENCE_WIDTH},
};
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};

/// Separator between the sequence and the root of a message id.
pub const SEQUENCE_SEPARATOR: char = '@';

/// Kind of sequenced event. Each kind has its own counter and slot space under
/// a root.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Snip,
}

impl MessageKind {
    /// One-character marker closing the message id.
    pub const fn marker(&self) -> char {
        match self {
            Self::Chat => 'c',
            Self::Snip => 's',
        }
    }

    pub const fn from_marker(c: char) -> Option<Self> {
        match c {
            'c' => Some(Self::Chat),
            's' => Some(Self::Snip),
            _ => None,
        }
    }

    /// Counter node under `roots/<unik>/connection`.
    pub const fn counter_node(&self) -> &'static str {
        match self {
            Self::Chat => "upperChat",
            Self::Snip => "upperSnip",
        }
    }

    /// Slot collection under `roots/<unik>`.
    pub const fn slot_collection(&self) -> &'static str {
        match self {
            Self::Chat => "chats",
            Self::Snip => "snips",
        }
    }
}

/// A sequenced message identifier: `<13-digit sequence>@<root><kind>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
    sequence: u64,
    root: Root,
    kind: MessageKind,
}

impl MessageId {
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessageId`] if `sequence` does not fit the
    /// fixed decimal width.
    pub fn new(sequence: u64, root: Root, kind: MessageKind) -> Result<Self> {
        if sequence > MAX_SEQUENCE {
            return Err(Error::InvalidMessageId {
                input: format!("{sequence}{SEQUENCE_SEPARATOR}{root}{}", kind.marker()),
            });
        }
        Ok(Self {
            sequence,
            root,
            kind,
        })
    }

    /// Parses the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessageId`] when the marker is unknown, the
    /// string does not split into exactly a sequence and a root, or the
    /// sequence is not decimal. A root that does not parse is reported as
    /// [`Error::InvalidRoot`].
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidMessageId { input: s.into() };
        let (body, marker) = strip_marker(s).ok_or_else(invalid)?;
        let kind = MessageKind::from_marker(marker).ok_or_else(invalid)?;
        let mut parts = body.split(SEQUENCE_SEPARATOR);
        let (Some(head), Some(root), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence = head.parse::<u64>().map_err(|_| invalid())?;
        Self::new(sequence, Root::parse(root)?, kind).map_err(|_| invalid())
    }

    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Zero-padded sequence, used as the slot key.
    pub fn sequence_key(&self) -> String {
        sequence_key(self.sequence)
    }

    pub const fn root(&self) -> &Root {
        &self.root
    }

    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn ids(&self) -> &[ComposedId] {
        self.root.ids()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEQUENCE_SEPARATOR}{}{}",
            self.sequence_key(),
            self.root,
            self.kind.marker()
        )
    }
}

impl FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Formats a sequence with [`SEQUENCE_WIDTH`] zero-padded digits.
pub fn sequence_key(sequence: u64) -> String {
    format!("{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// The pieces of a parsed message id, in the shape callers address the
/// realtime store with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageIdParts {
    pub sequence: String,
    pub root: String,
    pub unik_root: String,
    pub ids: Vec<ComposedId>,
}

/// Parses a message id into `{sequence, root, unik root, ids}`.
pub fn parse_message_id(s: &str) -> Result<MessageIdParts> {
    let id = MessageId::parse(s)?;
    Ok(MessageIdParts {
        sequence: id.sequence_key(),
        root: id.root.to_string(),
        unik_root: id.root.unik(),
        ids: id.root.ids().to_vec(),
    })
}

/// Parses a media id.
///
/// The three-field form `<id>@<a>@<b>` yields its first field, otherwise the
/// trailing kind marker is removed and the rest decoded.
pub fn parse_media_id(s: &str) -> Result<ComposedId> {
    let fields: Vec<&str> = s.split(SEQUENCE_SEPARATOR).collect();
    if let [first, _, _] = fields.as_slice() {
        return ComposedId::decode(first);
    }
    let (body, _) = strip_marker(s).ok_or_else(|| Error::InvalidIdentifier { input: s.into() })?;
    ComposedId::decode(body)
}
