//! Flow event wire format and state key derivation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EnvelopeError;

/// Prefix carried by every device event topic on the bus.
pub const EVENT_TOPIC_PREFIX: &str = "pt:j1/mt:evt/";

/// An inbound device event.
///
/// Only `topic` and `type` are required; the remaining FIMP fields are kept
/// when the producer sends them so the state store can record the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// e.g. `pt:j1/mt:evt/rt:dev/rn:zw/ad:1/sv:sensor_temp/ad:15_0`
    pub topic: String,
    /// e.g. `evt.sensor.report`
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serv: Option<String>,
    #[serde(rename = "val_t", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(rename = "val", default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl Envelope {
    /// Envelope with just the two addressing fields set.
    pub fn new(topic: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            msg_type: msg_type.into(),
            serv: None,
            value_type: None,
            value: Value::Null,
            props: None,
            tags: None,
            ctime: None,
            uid: None,
        }
    }

    pub fn with_value(mut self, value_type: impl Into<String>, value: Value) -> Self {
        self.value_type = Some(value_type.into());
        self.value = value;
        self
    }

    /// Decode a text frame. Anything that isn't a JSON object with string
    /// `topic` and `type` fields is rejected.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Canonical identifier of one piece of device state: `<entity>@<topic>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    entity: String,
    topic: String,
}

impl StateKey {
    /// Entity name, taken from the second segment of the event type.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Topic with the event prefix stripped.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.topic)
    }
}

/// Remove [`EVENT_TOPIC_PREFIX`] from the start of `topic`, if present.
pub fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix(EVENT_TOPIC_PREFIX).unwrap_or(topic)
}

/// Derive the state key for an envelope.
///
/// `evt.meter_ext.report` on `pt:j1/mt:evt/rt:dev/rn:tibber/ad:1/sv:meter_elec/ad:x`
/// yields `meter_ext@rt:dev/rn:tibber/ad:1/sv:meter_elec/ad:x`.
///
/// A type with fewer than two segments is an error. So is an empty entity
/// segment (`evt..report`): it would produce `@<topic>`, a key shared by every
/// such envelope on the topic, so keys always carry a non-empty entity.
pub fn derive_key(envelope: &Envelope) -> Result<StateKey, EnvelopeError> {
    let entity = envelope
        .msg_type
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| EnvelopeError::Malformed {
            topic: envelope.topic.clone(),
            msg_type: envelope.msg_type.clone(),
        })?;

    Ok(StateKey {
        entity: entity.to_string(),
        topic: strip_topic_prefix(&envelope.topic).to_string(),
    })
}
