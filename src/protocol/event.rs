use std::str::FromStr;

use secp256k1::{schnorr, Message};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
    errors::ProtocolError,
    game::GameState,
    identity::{PublicKey, SECP},
    room::RoomCode,
};

/// Parameterized replaceable kind carrying one room document.
pub const GAME_STATE_KIND: u16 = 31337;

pub type Tags = Vec<Vec<String>>;

/// Event before the id and signature are attached. This is also what a
/// delegated signer receives.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: PublicKey,
    pub created_at: i64,
    pub kind: u16,
    pub tags: Tags,
    pub content: String,
}

impl UnsignedEvent {
    pub fn game_state(
        pubkey: PublicKey,
        room: &RoomCode,
        state: &GameState,
        created_at: i64,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            pubkey,
            created_at,
            kind: GAME_STATE_KIND,
            tags: vec![vec!["d".to_string(), room.to_string()]],
            content: serde_json::to_string(state)?,
        })
    }

    pub fn compute_id(&self) -> [u8; 32] {
        event_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    pub fn into_signed(self, id: String, sig: String) -> Event {
        Event {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub pubkey: PublicKey,
    pub created_at: i64,
    pub kind: u16,
    pub tags: Tags,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Recomputes the id from the contents and checks the Schnorr signature
    /// against `pubkey`.
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let digest = event_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        if !self.id.eq_ignore_ascii_case(&hex::encode(digest)) {
            return Err(ProtocolError::EventIdMismatch);
        }

        let signature = schnorr::Signature::from_str(&self.sig)
            .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))?;
        let xonly = self.pubkey.to_xonly()?;
        SECP.verify_schnorr(&signature, &Message::from_digest(digest), &xonly)
            .map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
    }

    /// Value of the first `d` tag.
    pub fn room_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some("d"))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    pub fn decode_game_state(&self) -> Result<GameState, ProtocolError> {
        if self.kind != GAME_STATE_KIND {
            return Err(ProtocolError::InvalidState(format!(
                "unexpected event kind {}",
                self.kind
            )));
        }
        let state: GameState = serde_json::from_str(&self.content)?;
        state.validate()?;
        Ok(state)
    }
}

fn event_id(pubkey: &PublicKey, created_at: i64, kind: u16, tags: &Tags, content: &str) -> [u8; 32] {
    let canonical = json!([0, pubkey.as_str(), created_at, kind, tags, content]).to_string();
    Sha256::digest(canonical.as_bytes()).into()
}
