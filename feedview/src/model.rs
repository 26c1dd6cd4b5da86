//! Core data types.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Position of an entry in the feed. Assigned consecutively from 0.
pub type Sequence = u64;

/// Milliseconds since the Unix epoch, possibly fractional.
pub type Timestamp = f64;

/// An entry as stored in the feed: its position and raw JSON bytes.
///
/// The bytes are the encoding of `{ "key": author, "value": { "type",
/// "timestamp", "content" } }`. The index never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub sequence: Sequence,
    pub value: Bytes,
}

impl FeedEntry {
    pub fn new(sequence: Sequence, value: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            value: value.into(),
        }
    }
}

/// A sensor reading derived from a feed entry.
///
/// Never persisted on its own: reads re-derive it from the raw entry that
/// was indexed. `timestamp` is the indexed timestamp, which differs from the
/// declared one only when the entry claimed a time in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sequence: Sequence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: Timestamp,
    pub channel: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub fields: BTreeMap<String, f64>,
}

/// A sensor entry that names a channel, as seen by channel discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMention {
    pub sequence: Sequence,
    pub channel: String,
    pub timestamp: Timestamp,
}

/// One sample of a field from one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Readings regrouped for charting: field name, then device id, then
/// points in ascending time order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesSet {
    pub fields: BTreeMap<String, BTreeMap<String, Vec<Point>>>,
}

impl SeriesSet {
    /// Appends each field of `reading` to its device's series.
    ///
    /// Readings must be pushed in ascending time order.
    pub fn push(&mut self, reading: &Reading) {
        for (field, value) in &reading.fields {
            self.fields
                .entry(field.clone())
                .or_default()
                .entry(reading.device_id.clone())
                .or_default()
                .push(Point {
                    timestamp: reading.timestamp,
                    value: *value,
                });
        }
    }

    pub fn points(&self, field: &str, device_id: &str) -> &[Point] {
        self.fields
            .get(field)
            .and_then(|devices| devices.get(device_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(device: &str, ts: f64, fields: &[(&str, f64)]) -> Reading {
        Reading {
            sequence: 0,
            author: None,
            kind: "sensor/reading".to_string(),
            timestamp: ts,
            channel: "greenhouse".to_string(),
            device_id: device.to_string(),
            fields: fields.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn should_group_points_by_field_then_device() {
        // given
        let mut series = SeriesSet::default();

        // when
        series.push(&reading("d1", 100.0, &[("temp", 21.0), ("humidity", 40.0)]));
        series.push(&reading("d2", 150.0, &[("temp", 19.5)]));
        series.push(&reading("d1", 200.0, &[("temp", 22.0)]));

        // then
        assert_eq!(
            series.points("temp", "d1"),
            &[
                Point {
                    timestamp: 100.0,
                    value: 21.0
                },
                Point {
                    timestamp: 200.0,
                    value: 22.0
                }
            ]
        );
        assert_eq!(series.points("temp", "d2").len(), 1);
        assert_eq!(series.points("humidity", "d1").len(), 1);
        assert!(series.points("humidity", "d2").is_empty());
    }

    #[test]
    fn should_serialize_reading_with_wire_field_names() {
        // given
        let reading = reading("d1", 100.0, &[("temp", 21.0)]);

        // when
        let json = serde_json::to_value(&reading).unwrap();

        // then
        assert_eq!(json["deviceId"], "d1");
        assert_eq!(json["type"], "sensor/reading");
        assert!(json.get("author").is_none());
    }
}
