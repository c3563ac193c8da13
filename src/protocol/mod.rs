//! Nostr wire layer: signed events and relay frames.

pub mod event;
pub mod message;

pub use event::{Event, Tags, UnsignedEvent, GAME_STATE_KIND};
pub use message::{ClientMessage, Filter, RelayMessage};
