use std::ops::Bound::{self, Excluded, Included, Unbounded};
use std::ops::RangeBounds;

use bytes::{Bytes, BytesMut};

/// A range over byte keys, owned so it can be handed to storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// A range covering every key.
    pub fn unbounded() -> Self {
        Self::new(Unbounded, Unbounded)
    }

    /// A range covering exactly the keys that start with `prefix`.
    pub fn prefix(prefix: Bytes) -> Self {
        let end = match prefix_successor(&prefix) {
            Some(end) => Excluded(end),
            None => Unbounded,
        };
        Self::new(Included(prefix), end)
    }

    /// Returns true if no key can fall inside this range.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Included(s), Included(e)) => s > e,
            (Included(s), Excluded(e)) | (Excluded(s), Included(e)) | (Excluded(s), Excluded(e)) => {
                s >= e
            }
            _ => false,
        }
    }

    /// Returns true if `key` falls inside this range.
    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Included(s) => key >= s.as_ref(),
            Excluded(s) => key > s.as_ref(),
            Unbounded => true,
        };
        let before_end = match &self.end {
            Included(e) => key <= e.as_ref(),
            Excluded(e) => key < e.as_ref(),
            Unbounded => true,
        };
        after_start && before_end
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}

/// Returns the smallest key that sorts after every key starting with `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte incremented.
/// Returns `None` when the prefix is empty or all `0xFF`, in which case no such
/// key exists.
pub fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let last = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut end = BytesMut::from(&prefix[..=last]);
    end[last] += 1;
    Some(end.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_unbounded_range() {
        // given/when
        let range = BytesRange::unbounded();

        // then
        assert_eq!(range.start, Unbounded);
        assert_eq!(range.end, Unbounded);
        assert!(range.contains(b""));
        assert!(range.contains(b"\xff\xff"));
    }

    #[test]
    fn should_create_prefix_range() {
        // given
        let prefix = Bytes::from(vec![1, 2, 3]);

        // when
        let range = BytesRange::prefix(prefix.clone());

        // then
        assert_eq!(range.start, Included(prefix));
        assert_eq!(range.end, Excluded(Bytes::from(vec![1, 2, 4])));
    }

    #[test]
    fn should_carry_over_trailing_max_bytes() {
        // given
        let prefix = Bytes::from(vec![1, 2, 0xFF]);

        // when
        let range = BytesRange::prefix(prefix.clone());

        // then
        assert_eq!(range.start, Included(prefix));
        assert_eq!(range.end, Excluded(Bytes::from(vec![1, 3])));
    }

    #[test]
    fn should_leave_end_unbounded_for_all_max_prefix() {
        // given
        let prefix = Bytes::from(vec![0xFF, 0xFF]);

        // when
        let range = BytesRange::prefix(prefix.clone());

        // then
        assert_eq!(range.start, Included(prefix));
        assert_eq!(range.end, Unbounded);
    }

    #[test]
    fn should_contain_only_keys_with_prefix() {
        // given
        let range = BytesRange::prefix(Bytes::from_static(b"\x12\xff\xff"));

        // when/then
        assert!(range.contains(b"\x12\xff\xff"));
        assert!(range.contains(b"\x12\xff\xff\x00\x01"));
        assert!(!range.contains(b"\x13"));
        assert!(!range.contains(b"\x12\xff\xfe"));
    }

    #[test]
    fn should_respect_excluded_start() {
        // given
        let range = BytesRange::new(Excluded(Bytes::from("b")), Included(Bytes::from("d")));

        // when/then
        assert!(!range.contains(b"b"));
        assert!(range.contains(b"ba"));
        assert!(range.contains(b"d"));
        assert!(!range.contains(b"da"));
    }

    #[test]
    fn should_detect_empty_ranges() {
        let a = Bytes::from("a");
        let b = Bytes::from("b");
        assert!(BytesRange::new(Included(b.clone()), Excluded(a.clone())).is_empty());
        assert!(BytesRange::new(Included(a.clone()), Excluded(a.clone())).is_empty());
        assert!(!BytesRange::new(Included(a.clone()), Included(a.clone())).is_empty());
        assert!(!BytesRange::new(Included(a), Excluded(b)).is_empty());
        assert!(!BytesRange::unbounded().is_empty());
    }

    #[test]
    fn should_have_no_successor_for_empty_prefix() {
        assert_eq!(prefix_successor(b""), None);
    }
}
