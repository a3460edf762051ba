//! NIP-01 message framing.
//!
//! Client to relay: `EVENT`, `REQ`, `CLOSE`.
//! Relay to client: `EVENT`, `OK`, `EOSE`, `CLOSED`, `NOTICE`.
//!
//! Every message is a JSON array whose first element names its type.

use provenance_core::WireEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{RelayError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// A NIP-01 subscription filter.
///
/// Every populated field must match; list fields match if any entry does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    #[serde(rename = "#e", default, skip_serializing_if = "Option::is_none")]
    pub event_refs: Option<Vec<String>>,
    #[serde(rename = "#p", default, skip_serializing_if = "Option::is_none")]
    pub pubkey_refs: Option<Vec<String>>,
    #[serde(rename = "#d", default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn event_refs(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.event_refs = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn pubkey_refs(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pubkey_refs = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn identifiers(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.identifiers = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` satisfies this filter. `limit` is not considered.
    pub fn matches(&self, event: &WireEvent) -> bool {
        fn any_of(list: &Option<Vec<String>>, value: &str) -> bool {
            list.as_ref().map_or(true, |l| l.iter().any(|v| v == value))
        }
        fn tag_matches(list: &Option<Vec<String>>, event: &WireEvent, name: &str) -> bool {
            list.as_ref().map_or(true, |wanted| {
                event.tags.iter().any(|tag| {
                    tag.first().map(String::as_str) == Some(name)
                        && tag.get(1).is_some_and(|v| wanted.contains(v))
                })
            })
        }

        any_of(&self.ids, &event.id)
            && any_of(&self.authors, &event.pubkey)
            && self.kinds.as_ref().map_or(true, |k| k.contains(&event.kind))
            && self.since.map_or(true, |s| event.created_at >= s)
            && self.until.map_or(true, |u| event.created_at <= u)
            && tag_matches(&self.event_refs, event, "e")
            && tag_matches(&self.pubkey_refs, event, "p")
            && tag_matches(&self.identifiers, event, "d")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(WireEvent),
    /// `["REQ", <subscription_id>, <filter>...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Serialize to the JSON array sent on the wire.
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut arr = vec![json!("REQ"), json!(subscription_id)];
                for filter in filters {
                    arr.push(serde_json::to_value(filter)?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close { subscription_id } => json!(["CLOSE", subscription_id]),
        };
        Ok(value.to_string())
    }

    /// Parse a client message, as a relay would.
    pub fn from_json(text: &str) -> Result<Self> {
        let arr = parse_array(text)?;
        match message_type(&arr)? {
            "EVENT" => Ok(ClientMessage::Event(event_at(&arr, 1)?)),
            "REQ" => {
                let subscription_id = string_at(&arr, 1, "subscription_id")?;
                let filters = arr[2..]
                    .iter()
                    .map(|f| serde_json::from_value(f.clone()))
                    .collect::<std::result::Result<Vec<Filter>, _>>()?;
                Ok(ClientMessage::Req {
                    subscription_id,
                    filters,
                })
            }
            "CLOSE" => Ok(ClientMessage::Close {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
            }),
            other => Err(RelayError::InvalidMessage(format!(
                "unknown client message type {other}"
            ))),
        }
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: WireEvent,
    },
    /// `["OK", <event_id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },
    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
}

impl RelayMessage {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event]),
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            RelayMessage::Eose { subscription_id } => json!(["EOSE", subscription_id]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            RelayMessage::Notice { message } => json!(["NOTICE", message]),
        };
        Ok(value.to_string())
    }

    /// Parse a message received from a relay.
    pub fn from_json(text: &str) -> Result<Self> {
        let arr = parse_array(text)?;
        match message_type(&arr)? {
            "EVENT" => Ok(RelayMessage::Event {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
                event: event_at(&arr, 2)?,
            }),
            "OK" => {
                let event_id = string_at(&arr, 1, "event_id")?;
                let accepted = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| RelayError::InvalidMessage("OK without boolean".into()))?;
                // The message element is optional in older relays.
                let message = arr.get(3).and_then(Value::as_str).unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: string_at(&arr, 1, "subscription_id")?,
                message: arr.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: string_at(&arr, 1, "message")?,
            }),
            other => Err(RelayError::InvalidMessage(format!(
                "unknown relay message type {other}"
            ))),
        }
    }
}

fn parse_array(text: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(arr) if !arr.is_empty() => Ok(arr),
        Value::Array(_) => Err(RelayError::InvalidMessage("empty array".into())),
        _ => Err(RelayError::InvalidMessage("not a JSON array".into())),
    }
}

fn message_type(arr: &[Value]) -> Result<&str> {
    arr[0]
        .as_str()
        .ok_or_else(|| RelayError::InvalidMessage("message type is not a string".into()))
}

fn string_at(arr: &[Value], index: usize, field: &str) -> Result<String> {
    arr.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::InvalidMessage(format!("missing {field}")))
}

fn event_at(arr: &[Value], index: usize) -> Result<WireEvent> {
    let value = arr
        .get(index)
        .ok_or_else(|| RelayError::InvalidMessage("missing event".into()))?;
    Ok(serde_json::from_value(value.clone())?)
}
