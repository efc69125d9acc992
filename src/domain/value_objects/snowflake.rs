//! Kind-tagged Snowflake identifiers.
//!
//! An identifier is a one-character entity-kind tag followed by the decimal
//! form of a 64-bit integer, e.g. `u4523958732169216123`.
//!
//! ## Structure
//!
//! ```text
//! 64                         22          17          12          0
//! +---------------------------+-----------+-----------+-----------+
//! |  ms since DELTA_EPOCH     |   shard   | sequence  |  random   |
//! |          (42 bits)        |  (5 bits) |  (5 bits) | (12 bits) |
//! +---------------------------+-----------+-----------+-----------+
//! ```
//!
//! Shard and sequence bits are reserved for horizontal scaling; a
//! single-instance deployment leaves them zero.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delta epoch: 2021-05-03T00:00:00Z in milliseconds
pub const DELTA_EPOCH: u64 = 1_620_000_000_000;

/// Bits below the timestamp field.
pub const TIMESTAMP_SHIFT: u32 = 22;

/// Largest unix timestamp (ms) the 42-bit field can hold.
pub const MAX_TIMESTAMP: u64 = DELTA_EPOCH + (u64::MAX >> TIMESTAMP_SHIFT);

pub const SHARD_SHIFT: u32 = 17;
pub const SEQUENCE_SHIFT: u32 = 12;

/// Mask for 5-bit shard and sequence fields.
pub const FIELD_MASK: u64 = 0x1F;

/// Mask for the 12 random disambiguation bits.
pub const RANDOM_MASK: u64 = 0xFFF;

/// Identifier decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("unknown entity kind '{0}'")]
    UnknownKind(char),

    #[error("identifier body is not a valid integer")]
    InvalidBody,
}

/// Entity type encoded in the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Channel,
    Guild,
    Message,
}

impl EntityKind {
    pub fn tag(&self) -> char {
        match self {
            Self::User => 'u',
            Self::Channel => 'c',
            Self::Guild => 'g',
            Self::Message => 'm',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'u' => Some(Self::User),
            'c' => Some(Self::Channel),
            'g' => Some(Self::Guild),
            'm' => Some(Self::Message),
            _ => None,
        }
    }
}

/// A kind-tagged Snowflake ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snowflake {
    kind: EntityKind,
    value: u64,
}

impl Snowflake {
    /// Create a Snowflake from a raw packed value.
    pub const fn new(kind: EntityKind, value: u64) -> Self {
        Self { kind, value }
    }

    /// Create a Snowflake from its components.
    ///
    /// `timestamp_ms` is a unix timestamp clamped to
    /// `DELTA_EPOCH..=MAX_TIMESTAMP`.
    pub fn from_parts(kind: EntityKind, timestamp_ms: u64, shard: u8, random: u16) -> Self {
        let ts = (timestamp_ms.clamp(DELTA_EPOCH, MAX_TIMESTAMP) - DELTA_EPOCH) << TIMESTAMP_SHIFT;
        let shard = ((shard as u64) & FIELD_MASK) << SHARD_SHIFT;
        let random = (random as u64) & RANDOM_MASK;

        Self::new(kind, ts | shard | random)
    }

    /// Parse the `<tag><digits>` string form.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let mut chars = s.chars();
        let tag = chars.next().ok_or(IdentifierError::Empty)?;
        let kind = EntityKind::from_tag(tag).ok_or(IdentifierError::UnknownKind(tag))?;

        let body = chars.as_str();
        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentifierError::InvalidBody);
        }
        let value = body.parse::<u64>().map_err(|_| IdentifierError::InvalidBody)?;

        Ok(Self::new(kind, value))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Raw packed integer.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Unix timestamp in milliseconds embedded in this Snowflake.
    pub fn timestamp(&self) -> u64 {
        (self.value >> TIMESTAMP_SHIFT) + DELTA_EPOCH
    }

    /// Get the timestamp as a DateTime.
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp() as i64)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn shard(&self) -> u8 {
        ((self.value >> SHARD_SHIFT) & FIELD_MASK) as u8
    }

    pub fn sequence(&self) -> u8 {
        ((self.value >> SEQUENCE_SHIFT) & FIELD_MASK) as u8
    }

    pub fn random_bits(&self) -> u16 {
        (self.value & RANDOM_MASK) as u16
    }
}

/// Recover the unix-millisecond timestamp of an identifier string.
///
/// Returns `None` for anything that is not a well-formed identifier.
pub fn timestamp_of(identifier: &str) -> Option<i64> {
    let snowflake = Snowflake::parse(identifier).ok()?;
    i64::try_from(snowflake.timestamp()).ok()
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.tag(), self.value)
    }
}

impl FromStr for Snowflake {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Snowflake> for String {
    fn from(snowflake: Snowflake) -> Self {
        snowflake.to_string()
    }
}

impl Serialize for Snowflake {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Identifiers order by their packed value, i.e. by creation time first.
impl PartialOrd for Snowflake {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Snowflake {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.kind.tag().cmp(&other.kind.tag()))
    }
}
