use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::RoomError;

pub const ROOM_CODE_LEN: usize = 8;

/// Eight uppercase letters or digits naming one room on a relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    pub fn parse(code: &str) -> Result<Self, RoomError> {
        let code = code.trim();
        if code.len() != ROOM_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RoomError::InvalidRoomCode(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn generate() -> Self {
        let bytes: [u8; 4] = rand::random();
        Self(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(value: RoomCode) -> Self {
        value.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a room lives: relay plus code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLink {
    pub relay: Url,
    pub room: RoomCode,
}

impl RoomLink {
    pub fn new(relay: &str, room: RoomCode) -> Result<Self, RoomError> {
        Ok(Self {
            relay: parse_relay_url(relay)?,
            room,
        })
    }

    /// `<base>?room=<CODE>&relay=<relay url>`; any query already on `base` is replaced.
    pub fn share_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("room", self.room.as_str())
            .append_pair("relay", self.relay.as_str());
        url
    }

    pub fn parse(link: &str) -> Result<Self, RoomError> {
        let url = Url::parse(link.trim())
            .map_err(|e| RoomError::InvalidRoomLink(format!("{}: {}", link, e)))?;

        let mut room = None;
        let mut relay = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "room" => room = Some(value.into_owned()),
                "relay" => relay = Some(value.into_owned()),
                _ => {}
            }
        }

        let room = room.ok_or_else(|| RoomError::InvalidRoomLink("missing `room`".to_string()))?;
        let relay = relay.ok_or_else(|| RoomError::InvalidRoomLink("missing `relay`".to_string()))?;
        Self::new(&relay, RoomCode::parse(&room)?)
    }
}

impl fmt::Display for RoomLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.room, self.relay)
    }
}

fn parse_relay_url(relay: &str) -> Result<Url, RoomError> {
    let url = Url::parse(relay.trim())
        .map_err(|e| RoomError::InvalidRoomLink(format!("relay `{}`: {}", relay, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(RoomError::InvalidRoomLink(format!(
            "relay must be ws:// or wss://, got {}://",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_is_normalized() {
        assert_eq!(RoomCode::parse(" ab12cd34 ").unwrap().as_str(), "AB12CD34");
        assert!(RoomCode::parse("ABC").is_err());
        assert!(RoomCode::parse("ABCD-123").is_err());
        assert!(RoomCode::parse("ABCDEFGHI").is_err());
    }

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..32 {
            let code = RoomCode::generate();
            assert_eq!(RoomCode::parse(code.as_str()).unwrap(), code);
            assert!(code.as_str().chars().all(|c| !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn share_url_round_trips() {
        let link = RoomLink::new("wss://relay.damus.io", RoomCode::parse("ROOM0001").unwrap())
            .unwrap();
        let base = Url::parse("https://play.example.com/tictactoe?stale=1").unwrap();
        let shared = link.share_url(&base);

        assert_eq!(
            shared.as_str(),
            "https://play.example.com/tictactoe?room=ROOM0001&relay=wss%3A%2F%2Frelay.damus.io%2F"
        );
        assert_eq!(RoomLink::parse(shared.as_str()).unwrap(), link);
    }

    #[test]
    fn bad_links_are_rejected() {
        assert!(RoomLink::parse("https://x.test/?room=ROOM0001").is_err());
        assert!(RoomLink::parse("https://x.test/?relay=wss%3A%2F%2Fr.test").is_err());
        assert!(RoomLink::parse("https://x.test/?room=ROOM0001&relay=https%3A%2F%2Fr.test").is_err());
        assert!(RoomLink::new("not a url", RoomCode::generate()).is_err());
    }
}
