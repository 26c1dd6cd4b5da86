//! Two-byte prefix shared by every storage key.
//!
//! ```text
//! | version (u8) | record tag (u8) |
//! ```
//!
//! The record tag carries the record type in its high 4 bits and 4 reserved
//! bits in the low nibble.

use bytes::{BufMut, Bytes, BytesMut};

use super::DeserializeError;

/// Record type (high nibble) plus reserved bits (low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTag(u8);

impl RecordTag {
    /// Creates a tag. `record_type` must be in 1..=15.
    pub fn new(record_type: u8, reserved: u8) -> Self {
        debug_assert!((1..=15).contains(&record_type));
        Self((record_type << 4) | (reserved & 0x0F))
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn record_type(&self) -> u8 {
        self.0 >> 4
    }

    pub fn reserved(&self) -> u8 {
        self.0 & 0x0F
    }

    pub fn as_byte(&self) -> u8 {
        self.0
    }
}

/// Version byte and record tag at the front of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPrefix {
    version: u8,
    tag: RecordTag,
}

impl KeyPrefix {
    pub fn new(version: u8, tag: RecordTag) -> Self {
        Self { version, tag }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn tag(&self) -> RecordTag {
        self.tag
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.tag.as_byte());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Reads the prefix from the front of `data`, checking the version byte.
    pub fn from_bytes_versioned(data: &[u8], expected_version: u8) -> Result<Self, DeserializeError> {
        if data.len() < 2 {
            return Err(DeserializeError::new("buffer too short for key prefix"));
        }
        if data[0] != expected_version {
            return Err(DeserializeError::new(format!(
                "invalid key version: expected 0x{:02x}, got 0x{:02x}",
                expected_version, data[0]
            )));
        }
        Ok(Self::new(data[0], RecordTag::from_byte(data[1])))
    }
}
