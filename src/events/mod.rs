//! Execution events and attribute lookup
//!
//! Higher-level flows submit messages and then pull ledger-assigned values
//! (usually an `id`) out of the events of the included transaction.

use crate::error::{TxError, TxResult};

use serde::{Deserialize, Deserializer, Serialize};

/// One event emitted while executing a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `transfer` or a proto message name
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,
    #[serde(default)]
    pub index: bool,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
            index: true,
        });
        self
    }

    /// Value of the first attribute named `key`
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// First event of type `kind`
pub fn event_by_type<'a>(events: &'a [Event], kind: &str) -> TxResult<&'a Event> {
    events
        .iter()
        .find(|e| e.kind == kind)
        .ok_or_else(|| TxError::EventParsing(format!("event {} not found", kind)))
}

/// Attribute `key` of the first event of type `kind`
pub fn attribute_value<'a>(events: &'a [Event], kind: &str, key: &str) -> TxResult<&'a str> {
    event_by_type(events, kind)?.attribute(key).ok_or_else(|| {
        TxError::EventParsing(format!("attribute {} not found in event {}", key, kind))
    })
}

/// Numeric `id` attribute of the first event of type `kind`.
///
/// Typed events JSON-encode their values, so surrounding quotes are stripped.
pub fn id_from_events(events: &[Event], kind: &str) -> TxResult<u64> {
    let value = attribute_value(events, kind, "id")?;
    let value = value.trim_matches('"');
    value.parse::<u64>().map_err(|e| {
        TxError::EventParsing(format!("invalid id {:?} in event {}: {}", value, kind, e))
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
