use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::time::parse_millis;

// --- Events ---

/// What produced an event. Serialized with the short tags the lab API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ui")]
    UiAction,
    #[serde(rename = "step")]
    PhysicsStep,
    #[serde(rename = "hit")]
    WallHit,
    #[serde(rename = "exit")]
    Exit,
    #[serde(rename = "btn")]
    ButtonAction,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UiAction => "ui",
            EventKind::PhysicsStep => "step",
            EventKind::WallHit => "hit",
            EventKind::Exit => "exit",
            EventKind::ButtonAction => "btn",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logged event. Immutable once created; `seq` is the join key
/// between the stream and bulk views of the same session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    /// RFC 3339 instant taken from the client clock.
    pub client_time: String,
    /// Empty when the sender relies on the `?user=` query instead.
    #[serde(default)]
    pub user: String,
}

impl Event {
    pub fn client_millis(&self) -> Option<i64> {
        parse_millis(&self.client_time)
    }
}

/// An event as the server recorded it on the stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(flatten)]
    pub event: Event,
    #[serde(
        rename = "serverTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_time: Option<String>,
}

impl StreamRecord {
    pub fn server_millis(&self) -> Option<i64> {
        self.server_time.as_deref().and_then(parse_millis)
    }
}

// --- Payloads ---

/// Body of `POST bulk`, and the server-side snapshot of everything uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

impl BulkPayload {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            saved_at: None,
        }
    }
}

/// Response of `GET list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub stream: Vec<StreamRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bulk: BulkPayload,
}

/// Response of `GET time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeResponse {
    pub server_time: String,
}

/// Acknowledgement returned by the write endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
}

/// Treats an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
