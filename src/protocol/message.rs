use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    errors::ProtocolError,
    protocol::event::{Event, GAME_STATE_KIND},
    room::RoomCode,
};

/// Subscription filter for one room's documents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub kinds: Vec<u16>,
    #[serde(rename = "#d")]
    pub d_tags: Vec<String>,
}

impl Filter {
    pub fn game_room(room: &RoomCode) -> Self {
        Self {
            kinds: vec![GAME_STATE_KIND],
            d_tags: vec![room.to_string()],
        }
    }
}

/// Frames sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Event(Event),
    Req {
        subscription_id: String,
        filter: Filter,
    },
    Close {
        subscription_id: String,
    },
}

impl ClientMessage {
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filter,
            } => json!(["REQ", subscription_id, filter]),
            ClientMessage::Close { subscription_id } => json!(["CLOSE", subscription_id]),
        }
        .to_string()
    }
}

/// Frames received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Box<Event>,
    },
    EndOfStoredEvents {
        subscription_id: String,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Notice {
        message: String,
    },
    Closed {
        subscription_id: String,
        message: String,
    },
}

impl RelayMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let frame: Vec<Value> = serde_json::from_str(text)?;
        let kind = frame
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::UnexpectedFrame(truncate(text)))?;

        let string_at = |index: usize| -> Result<String, ProtocolError> {
            frame
                .get(index)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ProtocolError::UnexpectedFrame(truncate(text)))
        };
        // message fields are optional in older relays
        let optional_string_at =
            |index: usize| frame.get(index).and_then(Value::as_str).unwrap_or_default().to_string();

        match kind {
            "EVENT" => {
                let subscription_id = string_at(1)?;
                let raw = frame
                    .get(2)
                    .cloned()
                    .ok_or_else(|| ProtocolError::UnexpectedFrame(truncate(text)))?;
                let event: Event = serde_json::from_value(raw)?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event: Box::new(event),
                })
            }
            "EOSE" => Ok(RelayMessage::EndOfStoredEvents {
                subscription_id: string_at(1)?,
            }),
            "OK" => {
                let event_id = string_at(1)?;
                let accepted = frame
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| ProtocolError::UnexpectedFrame(truncate(text)))?;
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message: optional_string_at(3),
                })
            }
            "NOTICE" => Ok(RelayMessage::Notice {
                message: optional_string_at(1),
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: string_at(1)?,
                message: optional_string_at(2),
            }),
            _ => Err(ProtocolError::UnexpectedFrame(truncate(text))),
        }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(120).collect()
}
