//! Key encodings for everything feedview persists.
//!
//! All keys begin with a version byte and a record tag:
//!
//! ```text
//! | version (u8) | tag (u8) | ... record-specific fields ... |
//! ```
//!
//! # Record Types
//!
//! - `FeedEntry` (0x1): a raw entry of the local feed, keyed by sequence
//! - `FeedHead` (0x2): the next sequence the feed will assign
//! - `ViewIndex` (0x3): index records of one view, under its namespace
//! - `ViewCheckpoint` (0x4): how far into the feed a view has indexed
//!
//! # Composite Keys
//!
//! Index keys are built from [`KeyValue`] parts. Each part is a type tag
//! followed by an encoding whose bytes sort like the value, and every
//! encoding is prefix-free, so concatenated parts sort like the tuple they
//! encode:
//!
//! - `Str` (0x00): terminated bytes (escaped, `0x00`-terminated)
//! - `Int` (0x01): sign-flipped `i64`, big-endian
//! - `Float` (0x02): IEEE-754 sortable `f64`, big-endian
//!
//! A reading is stored under
//! `| namespace | Str("reading") | Str(channel) | Float(ts) | Int(sequence) |`,
//! so one channel's readings are contiguous and ordered by time, and a
//! channel whose name is a prefix of another's never shares its range.

use std::ops::Bound::{Excluded, Included, Unbounded};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::BytesRange;
use common::serde::DeserializeError;
use common::serde::key_prefix::{KeyPrefix, RecordTag};
use common::serde::sortable::{
    decode_f64_sortable, decode_i64_sortable, encode_f64_sortable, encode_i64_sortable,
};
use common::serde::terminated_bytes;
use common::util::prefix_successor;

use crate::error::{Error, Result};
use crate::model::{Sequence, Timestamp};

pub const KEY_VERSION: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    FeedEntry = 0x01,
    FeedHead = 0x02,
    ViewIndex = 0x03,
    ViewCheckpoint = 0x04,
}

impl RecordType {
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(RecordType::FeedEntry),
            0x02 => Ok(RecordType::FeedHead),
            0x03 => Ok(RecordType::ViewIndex),
            0x04 => Ok(RecordType::ViewCheckpoint),
            _ => Err(Error::Encoding(format!("invalid record type: 0x{:02x}", id))),
        }
    }

    pub fn tag(&self) -> RecordTag {
        RecordTag::new(self.id(), 0)
    }

    pub fn prefix(&self) -> KeyPrefix {
        KeyPrefix::new(KEY_VERSION, self.tag())
    }

    fn check(data: &[u8], expected: RecordType) -> Result<()> {
        let prefix = KeyPrefix::from_bytes_versioned(data, KEY_VERSION)?;
        let record_type = RecordType::from_id(prefix.tag().record_type())?;
        if record_type != expected {
            return Err(Error::Encoding(format!(
                "invalid record type: expected {:?}, got {:?}",
                expected, record_type
            )));
        }
        Ok(())
    }
}

const TAG_STR: u8 = 0x00;
const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;

/// One typed part of a composite key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl KeyValue {
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            KeyValue::Str(s) => {
                buf.put_u8(TAG_STR);
                terminated_bytes::serialize(s.as_bytes(), buf);
            }
            KeyValue::Int(v) => {
                buf.put_u8(TAG_INT);
                buf.put_u64(encode_i64_sortable(*v));
            }
            KeyValue::Float(v) => {
                buf.put_u8(TAG_FLOAT);
                buf.put_u64(encode_f64_sortable(*v));
            }
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Reads one part from the front of `buf`, advancing past it.
    pub fn read_from(buf: &mut &[u8]) -> std::result::Result<Self, DeserializeError> {
        if buf.is_empty() {
            return Err(DeserializeError::new("unexpected end of key"));
        }
        let tag = buf.get_u8();
        match tag {
            TAG_STR => {
                let bytes = terminated_bytes::deserialize(buf)?;
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|e| DeserializeError::new(format!("invalid utf-8 in key: {}", e)))?;
                Ok(KeyValue::Str(s))
            }
            TAG_INT | TAG_FLOAT => {
                if buf.len() < 8 {
                    return Err(DeserializeError::new("buffer too short for numeric key"));
                }
                let raw = buf.get_u64();
                Ok(if tag == TAG_INT {
                    KeyValue::Int(decode_i64_sortable(raw))
                } else {
                    KeyValue::Float(decode_f64_sortable(raw))
                })
            }
            other => Err(DeserializeError::new(format!(
                "unknown key value tag: 0x{:02x}",
                other
            ))),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<f64> for KeyValue {
    fn from(value: f64) -> Self {
        KeyValue::Float(value)
    }
}

/// The private key space of one view.
///
/// ```text
/// | version | tag(ViewIndex) | terminated(view name) |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewNamespace {
    prefix: Bytes,
}

impl ViewNamespace {
    pub fn new(view: &str) -> Self {
        let mut buf = BytesMut::new();
        RecordType::ViewIndex.prefix().write_to(&mut buf);
        terminated_bytes::serialize(view.as_bytes(), &mut buf);
        Self {
            prefix: buf.freeze(),
        }
    }

    pub fn prefix(&self) -> &Bytes {
        &self.prefix
    }

    /// A buffer holding the namespace prefix, ready for the rest of a key.
    pub fn key_buf(&self) -> BytesMut {
        BytesMut::from(self.prefix.as_ref())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Every key of the view.
    pub fn range(&self) -> BytesRange {
        BytesRange::prefix(self.prefix.clone())
    }

    fn strip<'a>(&self, key: &'a [u8]) -> Result<&'a [u8]> {
        key.strip_prefix(self.prefix.as_ref())
            .ok_or_else(|| Error::Encoding("key outside view namespace".to_string()))
    }
}

/// Key of a view's checkpoint. The value is the next sequence to index.
///
/// ```text
/// | version | tag(ViewCheckpoint) | terminated(view name) |
/// ```
pub struct CheckpointKey;

impl CheckpointKey {
    pub fn serialize(view: &str) -> Bytes {
        let mut buf = BytesMut::new();
        RecordType::ViewCheckpoint.prefix().write_to(&mut buf);
        terminated_bytes::serialize(view.as_bytes(), &mut buf);
        buf.freeze()
    }
}

pub fn encode_sequence(sequence: Sequence) -> Bytes {
    Bytes::copy_from_slice(&sequence.to_be_bytes())
}

pub fn decode_sequence(data: &[u8]) -> Result<Sequence> {
    let bytes: [u8; 8] = data.try_into().map_err(|_| {
        Error::Encoding(format!(
            "sequence must be 8 bytes, got {} bytes",
            data.len()
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Key of a raw feed entry.
///
/// ```text
/// | version | tag(FeedEntry) | sequence (u64 BE) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedEntryKey {
    pub sequence: Sequence,
}

impl FeedEntryKey {
    pub fn new(sequence: Sequence) -> Self {
        Self { sequence }
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(10);
        RecordType::FeedEntry.prefix().write_to(&mut buf);
        buf.put_u64(self.sequence);
        buf.freeze()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        RecordType::check(data, RecordType::FeedEntry)?;
        Ok(Self {
            sequence: decode_sequence(&data[2..])?,
        })
    }

    /// Entries with sequence `>= start`.
    pub fn scan_from(start: Sequence) -> BytesRange {
        let end = match prefix_successor(&RecordType::FeedEntry.prefix().to_bytes()) {
            Some(end) => Excluded(end),
            None => Unbounded,
        };
        BytesRange::new(Included(Self::new(start).serialize()), end)
    }
}

/// Key of the feed head record.
pub fn feed_head_key() -> Bytes {
    RecordType::FeedHead.prefix().to_bytes()
}

const READING_TAG: &str = "reading";

/// Index key of one reading in the readings view.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingKey {
    pub channel: String,
    pub timestamp: Timestamp,
    pub sequence: Sequence,
}

impl ReadingKey {
    pub fn new(channel: impl Into<String>, timestamp: Timestamp, sequence: Sequence) -> Self {
        Self {
            channel: channel.into(),
            timestamp,
            sequence,
        }
    }

    pub fn serialize(&self, namespace: &ViewNamespace) -> Result<Bytes> {
        let sequence = i64::try_from(self.sequence).map_err(|_| {
            Error::Encoding(format!("sequence {} out of key range", self.sequence))
        })?;
        let mut buf = Self::channel_buf(namespace, &self.channel);
        KeyValue::Float(self.timestamp).write_to(&mut buf);
        KeyValue::Int(sequence).write_to(&mut buf);
        Ok(buf.freeze())
    }

    pub fn deserialize(namespace: &ViewNamespace, data: &[u8]) -> Result<Self> {
        let mut buf = namespace.strip(data)?;
        match KeyValue::read_from(&mut buf)? {
            KeyValue::Str(tag) if tag == READING_TAG => {}
            other => {
                return Err(Error::Encoding(format!(
                    "expected reading tag, got {:?}",
                    other
                )));
            }
        }
        let (
            KeyValue::Str(channel),
            KeyValue::Float(timestamp),
            KeyValue::Int(sequence),
        ) = (
            KeyValue::read_from(&mut buf)?,
            KeyValue::read_from(&mut buf)?,
            KeyValue::read_from(&mut buf)?,
        )
        else {
            return Err(Error::Encoding("malformed reading key".to_string()));
        };
        if !buf.is_empty() {
            return Err(Error::Encoding("trailing bytes in reading key".to_string()));
        }
        let sequence = u64::try_from(sequence)
            .map_err(|_| Error::Encoding(format!("negative sequence {}", sequence)))?;
        Ok(Self {
            channel,
            timestamp,
            sequence,
        })
    }

    fn channel_buf(namespace: &ViewNamespace, channel: &str) -> BytesMut {
        let mut buf = namespace.key_buf();
        KeyValue::from(READING_TAG).write_to(&mut buf);
        KeyValue::from(channel).write_to(&mut buf);
        buf
    }

    /// The readings of `channel` with `after < timestamp < before`.
    ///
    /// `after` excludes every key carrying that timestamp whatever its
    /// sequence, and so does `before`.
    pub fn scan_range(
        namespace: &ViewNamespace,
        channel: &str,
        after: Option<Timestamp>,
        before: Option<Timestamp>,
    ) -> BytesRange {
        let channel_prefix = Self::channel_buf(namespace, channel).freeze();
        let channel_range = BytesRange::prefix(channel_prefix.clone());

        let with_timestamp = |ts: Timestamp| {
            let mut buf = BytesMut::from(channel_prefix.as_ref());
            KeyValue::Float(ts).write_to(&mut buf);
            buf.freeze()
        };

        let start = match after {
            Some(ts) => match prefix_successor(&with_timestamp(ts)) {
                Some(key) => Included(key),
                None => channel_range.start,
            },
            None => channel_range.start,
        };
        let end = match before {
            Some(ts) => Excluded(with_timestamp(ts)),
            None => channel_range.end,
        };
        BytesRange::new(start, end)
    }
}

const CHANNEL_MARKER: &[u8] = b"channel!";

/// Registry key of a discovered channel: `| namespace | "channel!" | name |`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKey {
    pub name: String,
}

impl ChannelKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn serialize(&self, namespace: &ViewNamespace) -> Bytes {
        let mut buf = namespace.key_buf();
        buf.put_slice(CHANNEL_MARKER);
        buf.put_slice(self.name.as_bytes());
        buf.freeze()
    }

    pub fn deserialize(namespace: &ViewNamespace, data: &[u8]) -> Result<Self> {
        let rest = namespace.strip(data)?;
        let name = rest
            .strip_prefix(CHANNEL_MARKER)
            .ok_or_else(|| Error::Encoding("missing channel marker".to_string()))?;
        let name = std::str::from_utf8(name)
            .map_err(|e| Error::Encoding(format!("invalid utf-8 in channel name: {}", e)))?;
        Ok(Self::new(name))
    }

    /// Every registered channel.
    pub fn scan_range(namespace: &ViewNamespace) -> BytesRange {
        let mut buf = namespace.key_buf();
        buf.put_slice(CHANNEL_MARKER);
        BytesRange::prefix(buf.freeze())
    }
}
