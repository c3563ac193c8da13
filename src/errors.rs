use std::time::Duration;

use thiserror::Error;

use crate::game::{Mark, StateUpdate};

/// Identity / authentication failures. Any of these blocks room entry.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Please provide a private key (nsec or hex)")]
    MissingSecretKey,

    #[error("Invalid nsec format: {0}")]
    InvalidNsec(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("No signer command configured for delegated login")]
    MissingSignerCommand,

    #[error("Signer `{program}` is unavailable: {reason}")]
    SignerUnavailable { program: String, reason: String },

    #[error("Signer returned an unusable response: {0}")]
    SignerProtocol(String),

    #[error("Signed event failed verification: {0}")]
    Verification(#[from] ProtocolError),
}

/// Wire-level decoding and verification failures.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected relay frame: {0}")]
    UnexpectedFrame(String),

    #[error("Event id does not match its contents")]
    EventIdMismatch,

    #[error("Invalid event signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid game state document: {0}")]
    InvalidState(String),
}

/// Relay connection failures.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid relay URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection to relay timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Relay session is not connected")]
    NotConnected,
}

/// Local replication failures. The room keeps running; nothing is published.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("version counter exhausted at v{0}")]
    VersionExhausted(u64),
}

/// Top-level failure of a room run.
#[derive(Error, Debug)]
pub enum RoomError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Invalid room code `{0}`: expected 8 letters or digits")]
    InvalidRoomCode(String),

    #[error("Invalid room link: {0}")]
    InvalidRoomLink(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Why a local move was refused. Refusals are silent no-ops for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    NotConnected,
    OutOfRange,
    RoundNotReady,
    RoundOver,
    CellOccupied,
    NotSeated,
    NotYourTurn,
}

/// Authority-gated transitions checked locally before publishing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("only the room creator can start a round")]
    NotRoomCreator,

    #[error("waiting for a second player")]
    WaitingForOpponent,
}

/// Result of trying to take a seat in the room. Only a fresh seat has
/// something to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Seated(Mark, StateUpdate),
    AlreadySeated(Mark),
    RoomFull,
}
