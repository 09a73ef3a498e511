//! Telemetry items and their wire representation.
//!
//! A [`TraceTelemetry`] is what callers hand to a [`TelemetryClient`](crate::TelemetryClient).
//! The channel wraps each one into an [`Envelope`] carrying the instrumentation key and context
//! tags before it is queued for transmission.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use crate::ai_warn;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Maximum length of a trace message accepted by the collector.
pub const MAX_MESSAGE_LENGTH: usize = 32_768;
/// Maximum length of a property key accepted by the collector.
pub const MAX_PROPERTY_KEY_LENGTH: usize = 150;
/// Maximum length of a property value accepted by the collector.
pub const MAX_PROPERTY_VALUE_LENGTH: usize = 8_192;

/// Context tag naming the cloud role of the emitting application.
pub const TAG_CLOUD_ROLE: &str = "ai.cloud.role";
/// Context tag naming the SDK that produced the telemetry.
pub const TAG_SDK_VERSION: &str = "ai.internal.sdkVersion";

const MESSAGE_ENVELOPE_NAME: &str = "Microsoft.ApplicationInsights.Message";
const MESSAGE_BASE_TYPE: &str = "MessageData";
const MESSAGE_DATA_VERSION: u8 = 2;

/// Severity scale understood by the collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityLevel {
    /// Verbose diagnostics. This is also the collector's zero value.
    #[default]
    Verbose = 0,
    /// Informational messages.
    Information = 1,
    /// Warnings.
    Warning = 2,
    /// Errors.
    Error = 3,
    /// Critical failures.
    Critical = 4,
}

impl Serialize for SeverityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// A trace (log message) telemetry item.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceTelemetry {
    /// Trace message.
    pub message: String,
    /// Severity of the message.
    pub severity_level: SeverityLevel,
    /// Time the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Custom string properties.
    pub properties: HashMap<String, String>,
}

impl TraceTelemetry {
    /// Creates a trace stamped with the current time and no properties.
    pub fn new(message: impl Into<String>, severity_level: SeverityLevel) -> Self {
        TraceTelemetry {
            message: message.into(),
            severity_level,
            timestamp: Utc::now(),
            properties: HashMap::new(),
        }
    }

    /// Truncates the message and properties to the lengths accepted by the collector.
    pub fn sanitize(&mut self) {
        truncate_chars(&mut self.message, MAX_MESSAGE_LENGTH);

        if self
            .properties
            .iter()
            .all(|(k, v)| k.chars().count() <= MAX_PROPERTY_KEY_LENGTH && v.chars().count() <= MAX_PROPERTY_VALUE_LENGTH)
        {
            return;
        }

        // Keys are visited in order so that the smallest original key wins a collision.
        let mut properties: Vec<_> = std::mem::take(&mut self.properties).into_iter().collect();
        properties.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for (mut key, mut value) in properties {
            truncate_chars(&mut key, MAX_PROPERTY_KEY_LENGTH);
            truncate_chars(&mut value, MAX_PROPERTY_VALUE_LENGTH);
            match self.properties.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(slot) => {
                    ai_warn!(
                        name: "TraceTelemetry.PropertyKeyCollision",
                        key = slot.key().as_str(),
                        message = "Truncated property key collides with another key. The later value is dropped."
                    );
                }
            }
        }
    }
}

fn truncate_chars(s: &mut String, max_chars: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
}

/// A telemetry item as sent to the ingestion endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    name: &'static str,
    time: String,
    #[serde(rename = "iKey")]
    instrumentation_key: String,
    tags: BTreeMap<String, String>,
    data: Data,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Data {
    base_type: &'static str,
    base_data: MessageData,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageData {
    ver: u8,
    message: String,
    severity_level: SeverityLevel,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    properties: HashMap<String, String>,
}

impl Envelope {
    /// Wraps a trace for the given instrumentation key and context tags.
    pub fn from_trace(
        trace: TraceTelemetry,
        instrumentation_key: &str,
        tags: &BTreeMap<String, String>,
    ) -> Self {
        Envelope {
            name: MESSAGE_ENVELOPE_NAME,
            time: trace
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            instrumentation_key: instrumentation_key.to_string(),
            tags: tags.clone(),
            data: Data {
                base_type: MESSAGE_BASE_TYPE,
                base_data: MessageData {
                    ver: MESSAGE_DATA_VERSION,
                    message: trace.message,
                    severity_level: trace.severity_level,
                    properties: trace.properties,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn sample_trace() -> TraceTelemetry {
        let mut trace = TraceTelemetry::new("I see dead people!", SeverityLevel::Error);
        trace.timestamp = Utc.with_ymd_and_hms(2018, 1, 25, 12, 13, 42).unwrap();
        trace
            .properties
            .insert("tag".to_string(), "fieldTag".to_string());
        trace
    }

    #[rstest]
    #[case(SeverityLevel::Verbose, 0)]
    #[case(SeverityLevel::Information, 1)]
    #[case(SeverityLevel::Warning, 2)]
    #[case(SeverityLevel::Error, 3)]
    #[case(SeverityLevel::Critical, 4)]
    fn severity_levels_serialize_as_integers(#[case] level: SeverityLevel, #[case] expected: u8) {
        assert_eq!(serde_json::to_value(level).unwrap(), json!(expected));
    }

    #[test]
    fn default_severity_is_verbose() {
        assert_eq!(SeverityLevel::default(), SeverityLevel::Verbose);
    }

    #[test]
    fn envelope_matches_the_ingestion_schema() {
        let mut tags = BTreeMap::new();
        tags.insert(TAG_CLOUD_ROLE.to_string(), "TestClient".to_string());

        let envelope = Envelope::from_trace(sample_trace(), "NotEmpty", &tags);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "name": "Microsoft.ApplicationInsights.Message",
                "time": "2018-01-25T12:13:42.000Z",
                "iKey": "NotEmpty",
                "tags": { "ai.cloud.role": "TestClient" },
                "data": {
                    "baseType": "MessageData",
                    "baseData": {
                        "ver": 2,
                        "message": "I see dead people!",
                        "severityLevel": 3,
                        "properties": { "tag": "fieldTag" }
                    }
                }
            })
        );
    }

    #[test]
    fn empty_properties_are_omitted() {
        let mut trace = sample_trace();
        trace.properties.clear();
        let value = serde_json::to_value(Envelope::from_trace(trace, "key", &BTreeMap::new())).unwrap();
        assert!(value["data"]["baseData"].get("properties").is_none());
    }

    #[test]
    fn sanitize_truncates_oversized_fields() {
        let mut trace = TraceTelemetry::new("m".repeat(MAX_MESSAGE_LENGTH + 10), SeverityLevel::Information);
        trace
            .properties
            .insert("k".repeat(MAX_PROPERTY_KEY_LENGTH + 1), "v".repeat(MAX_PROPERTY_VALUE_LENGTH + 1));
        trace
            .properties
            .insert("short".to_string(), "value".to_string());

        trace.sanitize();

        assert_eq!(trace.message.len(), MAX_MESSAGE_LENGTH);
        assert_eq!(trace.properties["short"], "value");
        let long_key = "k".repeat(MAX_PROPERTY_KEY_LENGTH);
        assert_eq!(trace.properties[&long_key].len(), MAX_PROPERTY_VALUE_LENGTH);
    }

    #[test]
    fn sanitize_keeps_the_first_of_colliding_keys() {
        let prefix = "k".repeat(MAX_PROPERTY_KEY_LENGTH);
        let mut trace = TraceTelemetry::new("collision", SeverityLevel::Warning);
        trace
            .properties
            .insert(format!("{prefix}b"), "second".to_string());
        trace
            .properties
            .insert(format!("{prefix}a"), "first".to_string());

        trace.sanitize();

        assert_eq!(trace.properties.len(), 1);
        assert_eq!(trace.properties[&prefix], "first");
    }

    #[test]
    fn sanitize_respects_char_boundaries() {
        let mut trace = TraceTelemetry::new("é".repeat(MAX_MESSAGE_LENGTH + 1), SeverityLevel::Verbose);
        trace.sanitize();
        assert_eq!(trace.message.chars().count(), MAX_MESSAGE_LENGTH);
    }
}
