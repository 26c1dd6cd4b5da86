//! Variable-length byte strings that keep their order when followed by more
//! key fields.
//!
//! Bytes are escaped and the string is terminated with `0x00`:
//!
//! - `0x00` → `0x01 0x01`
//! - `0x01` → `0x01 0x02`
//! - `0xFF` → `0x01 0x03`
//! - all other bytes unchanged
//!
//! The `0x00` terminator makes a shorter string sort before any longer string
//! sharing its prefix ("ab" < "abc"), and no encoded string is a prefix of
//! another. For UTF-8 input (which never contains `0xFF`) the encoding is
//! strictly order-preserving.

use bytes::{BufMut, Bytes, BytesMut};

use super::DeserializeError;

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0x01;

pub fn serialize(data: &[u8], buf: &mut BytesMut) {
    buf.reserve(data.len() + 1);
    for &byte in data {
        match byte {
            0x00 => buf.put_slice(&[ESCAPE, 0x01]),
            0x01 => buf.put_slice(&[ESCAPE, 0x02]),
            0xFF => buf.put_slice(&[ESCAPE, 0x03]),
            other => buf.put_u8(other),
        }
    }
    buf.put_u8(TERMINATOR);
}

/// Decodes one terminated string from the front of `buf`, advancing past it.
pub fn deserialize(buf: &mut &[u8]) -> Result<Bytes, DeserializeError> {
    let mut out = BytesMut::new();
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            TERMINATOR => {
                *buf = &buf[i + 1..];
                return Ok(out.freeze());
            }
            ESCAPE => {
                let escaped = buf
                    .get(i + 1)
                    .ok_or_else(|| DeserializeError::new("truncated escape sequence"))?;
                let byte = match escaped {
                    0x01 => 0x00,
                    0x02 => 0x01,
                    0x03 => 0xFF,
                    other => {
                        return Err(DeserializeError::new(format!(
                            "invalid escape byte: 0x{:02x}",
                            other
                        )));
                    }
                };
                out.put_u8(byte);
                i += 2;
            }
            other => {
                out.put_u8(other);
                i += 1;
            }
        }
    }
    Err(DeserializeError::new("missing terminator"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        serialize(data, &mut buf);
        buf.freeze()
    }

    #[test]
    fn should_escape_reserved_bytes() {
        // given/when
        let encoded = encode(&[b'a', 0x00, 0x01, 0xFF]);

        // then
        assert_eq!(
            encoded.as_ref(),
            &[b'a', 0x01, 0x01, 0x01, 0x02, 0x01, 0x03, 0x00]
        );
    }

    #[test]
    fn should_advance_past_terminator() {
        // given
        let mut buf = BytesMut::new();
        serialize(b"one", &mut buf);
        serialize(b"two", &mut buf);
        let bytes = buf.freeze();
        let mut slice = bytes.as_ref();

        // when
        let first = deserialize(&mut slice).unwrap();
        let second = deserialize(&mut slice).unwrap();

        // then
        assert_eq!(first, Bytes::from("one"));
        assert_eq!(second, Bytes::from("two"));
        assert!(slice.is_empty());
    }

    #[test]
    fn should_sort_shorter_string_first() {
        assert!(encode(b"ab") < encode(b"abc"));
        assert!(encode(b"ab") < encode(b"ab\x00"));
    }

    #[test]
    fn should_fail_without_terminator() {
        // given
        let mut slice: &[u8] = b"abc";

        // when
        let result = deserialize(&mut slice);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn should_fail_on_invalid_escape() {
        let mut slice: &[u8] = &[0x01, 0x09, 0x00];
        assert!(deserialize(&mut slice).is_err());
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn should_preserve_string_ordering(a: String, b: String) {
                let enc_a = encode(a.as_bytes());
                let enc_b = encode(b.as_bytes());
                prop_assert_eq!(a.as_bytes().cmp(b.as_bytes()), enc_a.cmp(&enc_b));
            }

            #[test]
            fn should_decode_what_was_encoded(data in prop::collection::vec(any::<u8>(), 0..64)) {
                let encoded = encode(&data);
                let mut slice = encoded.as_ref();
                let decoded = deserialize(&mut slice).unwrap();
                prop_assert_eq!(decoded.as_ref(), data.as_slice());
                prop_assert!(slice.is_empty());
            }
        }
    }
}
