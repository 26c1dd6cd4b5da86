//! Shape validation for raw feed entries.
//!
//! Feed entries are loosely typed JSON written by arbitrary peers. Before a
//! view sees an entry it is checked against the shape that view needs and
//! projected into a typed item. Entries that fail are skipped without error:
//! rejection is ordinary filtering, not a failure.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::model::{ChannelMention, FeedEntry, Reading, Timestamp};

/// Entry types starting with this prefix carry sensor data.
pub const SENSOR_TYPE_PREFIX: &str = "sensor/";

/// Why an entry was not eligible for a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotJson,
    NotAnObject,
    MissingValue,
    MissingContent,
    BadTimestamp,
    BadType,
    NotSensorData,
    MissingChannel,
    MissingDeviceId,
    BadFields,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::NotJson => "entry is not valid JSON",
            Rejection::NotAnObject => "entry is not an object",
            Rejection::MissingValue => "value is not an object",
            Rejection::MissingContent => "value.content is not an object",
            Rejection::BadTimestamp => "value.timestamp is not a non-zero finite number",
            Rejection::BadType => "value.type is not a string",
            Rejection::NotSensorData => "value.type is not a sensor type",
            Rejection::MissingChannel => "content.channel is not a non-empty string",
            Rejection::MissingDeviceId => "content.deviceId is not a string",
            Rejection::BadFields => "content.fields is not a map of numbers",
        };
        f.write_str(reason)
    }
}

/// Total validation of a raw entry into a typed item.
pub trait Sanitize: Sized {
    fn sanitize(entry: &FeedEntry) -> Result<Self, Rejection>;
}

/// The parts of an entry every item type needs.
struct Envelope<'a> {
    author: Option<&'a str>,
    kind: &'a str,
    timestamp: Timestamp,
    content: &'a Map<String, Value>,
}

fn envelope(root: &Value) -> Result<Envelope<'_>, Rejection> {
    let root = root.as_object().ok_or(Rejection::NotAnObject)?;
    let value = root
        .get("value")
        .and_then(Value::as_object)
        .ok_or(Rejection::MissingValue)?;
    let content = value
        .get("content")
        .and_then(Value::as_object)
        .ok_or(Rejection::MissingContent)?;
    // A zero timestamp counts as missing.
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_f64)
        .filter(|ts| ts.is_finite() && *ts != 0.0)
        .ok_or(Rejection::BadTimestamp)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Rejection::BadType)?;
    if !kind.starts_with(SENSOR_TYPE_PREFIX) {
        return Err(Rejection::NotSensorData);
    }
    Ok(Envelope {
        author: root.get("key").and_then(Value::as_str),
        kind,
        timestamp,
        content,
    })
}

fn parse(entry: &FeedEntry) -> Result<Value, Rejection> {
    serde_json::from_slice(&entry.value).map_err(|_| Rejection::NotJson)
}

fn channel<'a>(content: &'a Map<String, Value>) -> Result<&'a str, Rejection> {
    content
        .get("channel")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .ok_or(Rejection::MissingChannel)
}

impl Sanitize for Reading {
    fn sanitize(entry: &FeedEntry) -> Result<Self, Rejection> {
        let root = parse(entry)?;
        let envelope = envelope(&root)?;
        let channel = channel(envelope.content)?;
        let device_id = envelope
            .content
            .get("deviceId")
            .and_then(Value::as_str)
            .ok_or(Rejection::MissingDeviceId)?;
        let raw_fields = envelope
            .content
            .get("fields")
            .and_then(Value::as_object)
            .ok_or(Rejection::BadFields)?;
        let mut fields = BTreeMap::new();
        for (name, value) in raw_fields {
            let value = value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or(Rejection::BadFields)?;
            fields.insert(name.clone(), value);
        }

        Ok(Reading {
            sequence: entry.sequence,
            author: envelope.author.map(str::to_string),
            kind: envelope.kind.to_string(),
            timestamp: envelope.timestamp,
            channel: channel.to_string(),
            device_id: device_id.to_string(),
            fields,
        })
    }
}

impl Sanitize for ChannelMention {
    fn sanitize(entry: &FeedEntry) -> Result<Self, Rejection> {
        let root = parse(entry)?;
        let envelope = envelope(&root)?;
        let channel = channel(envelope.content)?;
        Ok(ChannelMention {
            sequence: entry.sequence,
            channel: channel.to_string(),
            timestamp: envelope.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn entry(value: Value) -> FeedEntry {
        FeedEntry::new(7, serde_json::to_vec(&value).unwrap())
    }

    fn valid() -> Value {
        json!({
            "key": "author-1",
            "value": {
                "type": "sensor/reading",
                "timestamp": 1700000000000u64,
                "content": {
                    "channel": "greenhouse",
                    "deviceId": "d1",
                    "fields": { "temp": 21.5, "humidity": 40 }
                }
            }
        })
    }

    #[test]
    fn should_project_valid_entry_into_reading() {
        // given
        let entry = entry(valid());

        // when
        let reading = Reading::sanitize(&entry).unwrap();

        // then
        assert_eq!(reading.sequence, 7);
        assert_eq!(reading.author.as_deref(), Some("author-1"));
        assert_eq!(reading.kind, "sensor/reading");
        assert_eq!(reading.timestamp, 1700000000000.0);
        assert_eq!(reading.channel, "greenhouse");
        assert_eq!(reading.device_id, "d1");
        assert_eq!(reading.fields.get("temp"), Some(&21.5));
        assert_eq!(reading.fields.get("humidity"), Some(&40.0));
    }

    #[test]
    fn should_reject_invalid_json() {
        let entry = FeedEntry::new(0, &b"{not json"[..]);
        assert_eq!(Reading::sanitize(&entry), Err(Rejection::NotJson));
    }

    #[rstest]
    #[case::not_object(json!([1, 2]), Rejection::NotAnObject)]
    #[case::no_value(json!({"key": "a"}), Rejection::MissingValue)]
    #[case::value_not_object(json!({"value": "x"}), Rejection::MissingValue)]
    #[case::no_content(
        json!({"value": {"type": "sensor/reading", "timestamp": 1}}),
        Rejection::MissingContent
    )]
    #[case::string_timestamp(
        json!({"value": {"type": "sensor/reading", "timestamp": "1", "content": {}}}),
        Rejection::BadTimestamp
    )]
    #[case::zero_timestamp(
        json!({"value": {"type": "sensor/reading", "timestamp": 0, "content": {}}}),
        Rejection::BadTimestamp
    )]
    #[case::numeric_type(
        json!({"value": {"type": 3, "timestamp": 1, "content": {}}}),
        Rejection::BadType
    )]
    #[case::chat_message(
        json!({"value": {"type": "chat/text", "timestamp": 1, "content": {"channel": "c"}}}),
        Rejection::NotSensorData
    )]
    #[case::no_channel(
        json!({"value": {"type": "sensor/reading", "timestamp": 1, "content": {}}}),
        Rejection::MissingChannel
    )]
    #[case::empty_channel(
        json!({"value": {"type": "sensor/reading", "timestamp": 1, "content": {"channel": ""}}}),
        Rejection::MissingChannel
    )]
    #[case::no_device(
        json!({"value": {"type": "sensor/reading", "timestamp": 1,
            "content": {"channel": "c", "fields": {}}}}),
        Rejection::MissingDeviceId
    )]
    #[case::fields_not_map(
        json!({"value": {"type": "sensor/reading", "timestamp": 1,
            "content": {"channel": "c", "deviceId": "d", "fields": [1]}}}),
        Rejection::BadFields
    )]
    #[case::non_numeric_field(
        json!({"value": {"type": "sensor/reading", "timestamp": 1,
            "content": {"channel": "c", "deviceId": "d", "fields": {"temp": "hot"}}}}),
        Rejection::BadFields
    )]
    fn should_reject_malformed_reading(#[case] value: Value, #[case] expected: Rejection) {
        assert_eq!(Reading::sanitize(&entry(value)), Err(expected));
    }

    #[test]
    fn should_accept_channel_mention_without_reading_fields() {
        // given
        let entry = entry(json!({
            "value": {
                "type": "sensor/status",
                "timestamp": 5,
                "content": { "channel": "barn" }
            }
        }));

        // when
        let mention = ChannelMention::sanitize(&entry).unwrap();

        // then
        assert_eq!(mention.channel, "barn");
        assert_eq!(mention.timestamp, 5.0);
        assert_eq!(Reading::sanitize(&entry), Err(Rejection::MissingDeviceId));
    }

    #[test]
    fn should_reject_channel_mention_without_channel() {
        let entry = entry(json!({
            "value": { "type": "sensor/status", "timestamp": 5, "content": {} }
        }));
        assert_eq!(ChannelMention::sanitize(&entry), Err(Rejection::MissingChannel));
    }
}
