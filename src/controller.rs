//! Reactive core of a room. Every input is a typed `RoomEvent`; every output
//! is an `Effect` for the runtime to carry out. Nothing here touches the
//! network or the clock, so whole games can be played out in tests.

use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    errors::{JoinOutcome, MoveRejection, SyncError},
    game::{rules, GameState, Mark, StateUpdate},
    identity::PublicKey,
    room::RoomCode,
    sync::{Reconcile, Replica},
};

/// Something the local participant asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(usize),
    StartRound,
    ResetRound,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Connected,
    Lost,
    GaveUp { attempts: u32 },
}

/// A verified room document and who signed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundState {
    pub author: PublicKey,
    pub state: GameState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Local(Command),
    Inbound(InboundState),
    /// Relay finished replaying stored documents for our subscription.
    EndOfStoredEvents,
    Connection(ConnectionChange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Sign and broadcast this full document.
    Publish(GameState),
    /// Local view changed.
    StateChanged(GameState),
    Notify(Notification),
    /// Unsubscribe and close the relay connection.
    Close,
}

pub struct RoomController {
    me: PublicKey,
    room: RoomCode,
    replica: Replica,
    connected: bool,
    ever_connected: bool,
    room_full_reported: bool,
}

impl RoomController {
    pub fn new(me: PublicKey, room: RoomCode) -> Self {
        Self {
            me,
            room,
            replica: Replica::new(),
            connected: false,
            ever_connected: false,
            room_full_reported: false,
        }
    }

    pub fn me(&self) -> &PublicKey {
        &self.me
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    pub fn state(&self) -> &GameState {
        self.replica.state()
    }

    pub fn version(&self) -> u64 {
        self.replica.version()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn my_seat(&self) -> Option<Mark> {
        self.state().seat_of(&self.me)
    }

    pub fn handle(&mut self, event: RoomEvent) -> Vec<Effect> {
        match event {
            RoomEvent::Local(command) => self.on_command(command),
            RoomEvent::Inbound(inbound) => self.on_inbound(inbound),
            RoomEvent::EndOfStoredEvents => self.on_end_of_stored_events(),
            RoomEvent::Connection(change) => self.on_connection(change),
        }
    }

    fn on_command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Move(index) => {
                if !self.connected {
                    debug!("Move {} rejected: {:?}", index, MoveRejection::NotConnected);
                    return Vec::new();
                }
                match rules::make_move(self.state(), &self.me, index) {
                    Ok(update) => self.publish(update),
                    Err(rejection) => {
                        debug!("Move {} rejected: {:?}", index, rejection);
                        Vec::new()
                    }
                }
            }
            Command::StartRound => self.round_transition(rules::start_round, "Game started!"),
            Command::ResetRound => {
                self.round_transition(rules::reset_round, "New round started!")
            }
            Command::Leave => {
                info!("Leaving room {}", self.room);
                self.replica.reset();
                self.connected = false;
                self.room_full_reported = false;
                vec![Effect::StateChanged(self.state().clone()), Effect::Close]
            }
        }
    }

    fn round_transition<F, E>(&mut self, transition: F, success: &str) -> Vec<Effect>
    where
        F: FnOnce(&GameState, &PublicKey) -> Result<StateUpdate, E>,
        E: fmt::Display,
    {
        if !self.connected {
            return vec![Effect::Notify(Notification::error(
                "Not connected to the relay",
            ))];
        }
        match transition(self.state(), &self.me) {
            Ok(update) => self.publish_then(update, Notification::success(success)),
            Err(e) => {
                debug!("Round transition refused: {}", e);
                vec![Effect::Notify(Notification::error(e.to_string()))]
            }
        }
    }

    fn on_inbound(&mut self, inbound: InboundState) -> Vec<Effect> {
        let InboundState { author, state } = inbound;
        if self.replica.on_receive(state) == Reconcile::Stale {
            return Vec::new();
        }

        let state = self.state().clone();
        debug!("Applied v{} from {}", state.version, author.short());
        let mut effects = vec![Effect::StateChanged(state.clone())];

        let my_turn_after_opponent = state.game_ready
            && state.winner.is_none()
            && author != self.me
            && state.is_turn_of(&self.me);
        if my_turn_after_opponent {
            effects.push(Effect::Notify(Notification::info(
                "Opponent moved - your turn!",
            )));
        }
        effects
    }

    fn on_end_of_stored_events(&mut self) -> Vec<Effect> {
        if !self.connected {
            return Vec::new();
        }
        match rules::claim_slot(self.state(), &self.me) {
            JoinOutcome::Seated(mark, update) => {
                info!("Claimed seat {} in room {}", mark, self.room);
                self.publish_then(
                    update,
                    Notification::success(format!("You joined as Player {}!", mark)),
                )
            }
            JoinOutcome::AlreadySeated(mark) => {
                debug!("Already seated as {}", mark);
                Vec::new()
            }
            JoinOutcome::RoomFull => {
                if self.room_full_reported {
                    return Vec::new();
                }
                self.room_full_reported = true;
                vec![Effect::Notify(Notification::info(
                    "Room is full, watching as a spectator",
                ))]
            }
        }
    }

    fn on_connection(&mut self, change: ConnectionChange) -> Vec<Effect> {
        match change {
            ConnectionChange::Connected => {
                self.connected = true;
                let message = if self.ever_connected {
                    "Reconnected to game room!"
                } else {
                    "Connected to game room!"
                };
                self.ever_connected = true;
                vec![Effect::Notify(Notification::success(message))]
            }
            ConnectionChange::Lost => {
                if !self.connected {
                    return Vec::new();
                }
                self.connected = false;
                vec![Effect::Notify(Notification::error(
                    "Connection lost, attempting to reconnect...",
                ))]
            }
            ConnectionChange::GaveUp { attempts } => {
                self.connected = false;
                info!("Gave up on room {} after {} attempts", self.room, attempts);
                vec![Effect::Notify(Notification::error(
                    "Failed to reconnect. Please rejoin the room.",
                ))]
            }
        }
    }

    fn publish(&mut self, update: StateUpdate) -> Vec<Effect> {
        match self.replica.publish(update) {
            Ok(next) => vec![Effect::Publish(next.clone()), Effect::StateChanged(next)],
            Err(e) => sync_failed(e),
        }
    }

    /// Publishes and appends `notice` only if the publish went out.
    fn publish_then(&mut self, update: StateUpdate, notice: Notification) -> Vec<Effect> {
        match self.replica.publish(update) {
            Ok(next) => vec![
                Effect::Publish(next.clone()),
                Effect::StateChanged(next),
                Effect::Notify(notice),
            ],
            Err(e) => sync_failed(e),
        }
    }
}

fn sync_failed(e: SyncError) -> Vec<Effect> {
    warn!("Not publishing: {}", e);
    vec![Effect::Notify(Notification::error("Failed to sync game state"))]
}
